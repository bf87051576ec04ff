use crate::auth::{authenticate, AuthOutcome};
use crate::config::ProxyConfig;
use crate::forward::{forward, ForwardLimits, ForwardOutcome, Target};
use crate::request::{ParseError, ProxyRequest, RequestLine};
use crate::response::Challenge;
use bytes::Bytes;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Global session counter for generating unique session IDs
static SESSION_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Number of sessions currently being handled
static ACTIVE_SESSIONS: AtomicUsize = AtomicUsize::new(0);

/// Short hex id that tags every log line of one connection.
///
/// Low 48 bits of the wall clock in nanoseconds followed by a process-wide
/// sequence number, so ids stay distinct even when two connections are
/// accepted in the same instant.
pub fn new_session_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let seq = SESSION_COUNTER.fetch_add(1, Ordering::Relaxed);

    format!("{:012x}{:08x}", nanos & 0xffff_ffff_ffff, seq & 0xffff_ffff)
}

/// RAII guard keeping [`ACTIVE_SESSIONS`] accurate
pub struct SessionGuard {
    released: bool,
}

impl SessionGuard {
    pub fn new() -> Self {
        ACTIVE_SESSIONS.fetch_add(1, Ordering::Relaxed);
        Self { released: false }
    }

    pub fn release(&mut self) {
        if !self.released {
            ACTIVE_SESSIONS.fetch_sub(1, Ordering::Relaxed);
            self.released = true;
        }
    }

    /// Get the current active session count
    pub fn active_count() -> usize {
        ACTIVE_SESSIONS.load(Ordering::Relaxed)
    }
}

impl Default for SessionGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Faults that end a session without a response of their own
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("malformed request: {0}")]
    Malformed(#[from] ParseError),

    #[error("upstream connection to {addr} failed: {source}")]
    Dial {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("socket error: {0}")]
    Io(#[from] io::Error),
}

/// Terminal state of a session
#[derive(Debug)]
pub enum SessionOutcome {
    /// Client closed before sending anything
    Closed,
    /// 407 sent, connection closed
    Rejected(Challenge),
    /// Handed to the forwarder, which ran to completion
    Forwarded(ForwardOutcome),
}

/// Drive one accepted connection from first read to close.
///
/// The request is read exactly once; anything past the first read is not
/// looked at. Authentication happens before the request line is
/// interpreted, so garbage without credentials still gets a 407.
pub async fn handle_client(
    mut client: TcpStream,
    config: &ProxyConfig,
) -> Result<SessionOutcome, SessionError> {
    let mut buf = vec![0u8; config.request_buffer];
    let n = client.read(&mut buf).await?;
    if n == 0 {
        return Ok(SessionOutcome::Closed);
    }
    buf.truncate(n);

    let request = ProxyRequest::parse(Bytes::from(buf))?;

    let challenge = match authenticate(request.proxy_authorization(), &config.credentials) {
        AuthOutcome::Accepted(username) => {
            debug!(
                "Authenticated {} for {:?} ({} header lines)",
                username,
                request.request_line(),
                request.headers().count()
            );
            None
        }
        AuthOutcome::Missing => Some(Challenge::Required),
        AuthOutcome::Invalid => Some(Challenge::InvalidCredentials),
    };
    if let Some(challenge) = challenge {
        client.write_all(&challenge.to_bytes()).await?;
        let _ = client.shutdown().await;
        return Ok(SessionOutcome::Rejected(challenge));
    }

    let line = RequestLine::parse(request.request_line())?;
    let target = Target::resolve(&line)?;
    debug!(
        "Forwarding {} ({})",
        target,
        line.version.as_deref().unwrap_or("no version")
    );
    let limits = ForwardLimits {
        reply_buffer: config.reply_buffer,
        tunnel_buffer: config.tunnel_buffer,
    };
    let outcome = forward(client, &request, target, limits).await?;
    Ok(SessionOutcome::Forwarded(outcome))
}

/// Per-connection task body: every error stops here.
pub async fn run_session(client: TcpStream, peer: SocketAddr, config: Arc<ProxyConfig>) {
    let mut guard = SessionGuard::new();
    let id = new_session_id();
    info!("Connection from {} (session {})", peer, id);

    match handle_client(client, &config).await {
        Ok(SessionOutcome::Closed) => debug!("Session {} closed before sending a request", id),
        Ok(SessionOutcome::Rejected(challenge)) => {
            warn!("Session {} from {} rejected: {:?}", id, peer, challenge)
        }
        Ok(SessionOutcome::Forwarded(ForwardOutcome::BadRequest)) => {
            warn!("Session {} from {} sent an unsupported target", id, peer)
        }
        Ok(SessionOutcome::Forwarded(ForwardOutcome::Relayed(n))) => {
            debug!("Session {} relayed {} bytes", id, n)
        }
        Ok(SessionOutcome::Forwarded(ForwardOutcome::Tunneled(summary))) => {
            if let Some(e) = summary.error {
                debug!("Session {} tunnel ended with error: {}", id, e);
            }
        }
        Err(e) => warn!("Error handling client {} (session {}): {}", peer, id, e),
    }

    guard.release();
}
