mod auth;
mod config;
mod forward;
mod request;
mod response;
mod session;
mod traffic;
mod tunnel;

use crate::config::{Cli, ProxyConfig};
use crate::session::{run_session, SessionGuard};
use clap::Parser;
use color_eyre::eyre::Result;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;

const SESSION_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("preauth_proxy=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    color_eyre::install()?;

    let args = Cli::parse();
    let config = Arc::new(ProxyConfig::from_cli(args)?);

    let listener = TcpListener::bind(config.listen_addr).await?;
    info!("Pre-auth proxy listening on {}", listener.local_addr()?);
    let mut users: Vec<&str> = config.credentials.usernames().collect();
    users.sort_unstable();
    info!(
        "{} credential(s) configured: {}",
        config.credentials.len(),
        users.join(", ")
    );

    if config.status_interval > 0 {
        tokio::task::spawn(status_monitor(Duration::from_secs(config.status_interval)));
    }

    let shutdown = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => warn!("Failed to listen for CTRL+C: {}", e),
        }
    };

    run(listener, config, shutdown).await;
    info!("Shutting down proxy");

    Ok(())
}

/// Serve until `shutdown` resolves, then let in-flight sessions finish.
///
/// The listener is dropped as soon as `shutdown` fires, so new connections
/// are refused. Open sessions are never cancelled; this returns once the
/// last one has ended on its own.
async fn run<F>(listener: TcpListener, config: Arc<ProxyConfig>, shutdown: F)
where
    F: Future<Output = ()>,
{
    tokio::select! {
        _ = serve(listener, config) => {
            warn!("Server loop terminated");
        }
        _ = shutdown => {
            info!("No longer accepting connections");
        }
    }

    wait_for_sessions(SESSION_POLL_INTERVAL).await;
}

/// Sleep until no session is active.
async fn wait_for_sessions(poll: Duration) {
    let mut reported = 0;
    loop {
        let active = SessionGuard::active_count();
        if active == 0 {
            break;
        }
        if active != reported {
            info!("Waiting for {} in-flight session(s) to close...", active);
            reported = active;
        }
        tokio::time::sleep(poll).await;
    }
}

/// Accept connections forever, one task per connection.
async fn serve(listener: TcpListener, config: Arc<ProxyConfig>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                tokio::task::spawn(run_session(stream, peer_addr, Arc::clone(&config)));
            }
            Err(e) => {
                warn!("Accept error: {} (continuing)", e);
                continue;
            }
        }
    }
}

/// Periodically log session and tunnel activity.
async fn status_monitor(period: Duration) {
    let mut interval = tokio::time::interval(period);
    // First tick completes immediately
    interval.tick().await;
    let mut last = (0usize, 0u64, 0u64);

    loop {
        interval.tick().await;

        let active = SessionGuard::active_count();
        let (up, down) = traffic::totals().get();
        let current = (active, up, down);
        if current != last {
            info!(
                "Status - active sessions: {}, tunneled {}↑ {}↓ bytes total",
                active, up, down
            );
        }
        last = current;
    }
}
