use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Byte counters for one tunnel (or the whole process)
#[derive(Debug, Default)]
pub struct TrafficCounters {
    /// Bytes read from the client and written upstream
    up_bytes: AtomicU64,
    /// Bytes read from upstream and written to the client
    down_bytes: AtomicU64,
}

impl TrafficCounters {
    pub fn add_up(&self, n: u64) { self.up_bytes.fetch_add(n, Ordering::Relaxed); }
    pub fn add_down(&self, n: u64) { self.down_bytes.fetch_add(n, Ordering::Relaxed); }
    pub fn up(&self) -> u64 { self.up_bytes.load(Ordering::Relaxed) }
    pub fn down(&self) -> u64 { self.down_bytes.load(Ordering::Relaxed) }
    pub fn get(&self) -> (u64, u64) { (self.up(), self.down()) }
}

/// Which way bytes are flowing through a tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// client -> upstream
    Up,
    /// upstream -> client
    Down,
}

/// Per-tunnel counters that also feed the process-wide totals
#[derive(Debug, Clone, Default)]
pub struct TunnelTraffic {
    local: Arc<TrafficCounters>,
}

impl TunnelTraffic {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, direction: Direction, n: u64) {
        match direction {
            Direction::Up => {
                self.local.add_up(n);
                totals().add_up(n);
            }
            Direction::Down => {
                self.local.add_down(n);
                totals().add_down(n);
            }
        }
    }

    pub fn get(&self) -> (u64, u64) {
        self.local.get()
    }
}

/// Process-wide tunnel totals since startup
static TOTALS: std::sync::OnceLock<TrafficCounters> = std::sync::OnceLock::new();

pub fn totals() -> &'static TrafficCounters {
    TOTALS.get_or_init(TrafficCounters::default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tunnel_traffic_counts_each_direction() {
        let traffic = TunnelTraffic::new();
        let clone = traffic.clone();

        traffic.record(Direction::Up, 10);
        clone.record(Direction::Down, 4);
        clone.record(Direction::Down, 6);

        assert_eq!(traffic.get(), (10, 10));
        assert_eq!(clone.get(), (10, 10));
    }

    #[test]
    fn tunnel_traffic_feeds_totals() {
        let (up_before, down_before) = totals().get();
        let traffic = TunnelTraffic::new();
        traffic.record(Direction::Up, 3);
        traffic.record(Direction::Down, 5);

        // Other tests may add concurrently, so only a lower bound holds
        let (up_after, down_after) = totals().get();
        assert!(up_after >= up_before + 3);
        assert!(down_after >= down_before + 5);
    }
}
