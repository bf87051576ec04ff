use crate::request::{ParseError, ProxyRequest, RequestLine};
use crate::response::{BAD_REQUEST, CONNECTION_ESTABLISHED};
use crate::session::SessionError;
use crate::traffic::TunnelTraffic;
use crate::tunnel::{tunnel, TunnelSummary};
use std::fmt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

const HTTP_SCHEME: &str = "http://";
const DEFAULT_HTTP_PORT: u16 = 80;

/// Where an authenticated request wants to go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// `CONNECT host:port`
    Tunnel { host: String, port: u16 },
    /// `METHOD http://host[:port]/...`
    Http { host: String, port: u16 },
    /// Anything else, answered with 400
    Unsupported,
}

impl Target {
    pub fn resolve(line: &RequestLine) -> Result<Self, ParseError> {
        if line.is_connect() {
            let (host, port) = split_host_port(&line.target)
                .ok_or_else(|| ParseError::Target(line.target.clone()))?;
            return Ok(Target::Tunnel { host, port });
        }

        let Some(rest) = line.target.strip_prefix(HTTP_SCHEME) else {
            return Ok(Target::Unsupported);
        };
        let authority = rest.split('/').next().unwrap_or_default();
        if authority.is_empty() {
            return Err(ParseError::Target(line.target.clone()));
        }

        let (host, port) = split_host_port(authority)
            .unwrap_or_else(|| (authority.to_string(), DEFAULT_HTTP_PORT));
        Ok(Target::Http { host, port })
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Tunnel { host, port } => write!(f, "CONNECT {}:{}", host, port),
            Target::Http { host, port } => write!(f, "http {}:{}", host, port),
            Target::Unsupported => f.write_str("unsupported"),
        }
    }
}

/// Split `host:port` on the last colon; `[v6]:port` loses its brackets.
fn split_host_port(authority: &str) -> Option<(String, u16)> {
    let (host, port) = authority.rsplit_once(':')?;
    let port = port.parse::<u16>().ok()?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    if host.is_empty() {
        return None;
    }
    Some((host.to_string(), port))
}

/// Open the upstream connection.
pub async fn dial(host: &str, port: u16) -> Result<TcpStream, SessionError> {
    TcpStream::connect((host, port))
        .await
        .map_err(|source| SessionError::Dial {
            addr: format!("{}:{}", host, port),
            source,
        })
}

/// Buffer sizes used while forwarding
#[derive(Debug, Clone, Copy)]
pub struct ForwardLimits {
    pub reply_buffer: usize,
    pub tunnel_buffer: usize,
}

/// What the forwarder did with a session
#[derive(Debug)]
pub enum ForwardOutcome {
    Tunneled(TunnelSummary),
    /// Bytes relayed back from the single upstream read
    Relayed(usize),
    BadRequest,
}

/// Carry an authenticated request to its target.
///
/// Dial failures return an error without writing anything to the client.
pub async fn forward(
    mut client: TcpStream,
    request: &ProxyRequest,
    target: Target,
    limits: ForwardLimits,
) -> Result<ForwardOutcome, SessionError> {
    match target {
        Target::Unsupported => {
            client.write_all(BAD_REQUEST).await?;
            let _ = client.shutdown().await;
            Ok(ForwardOutcome::BadRequest)
        }
        Target::Tunnel { host, port } => {
            let upstream = dial(&host, port).await?;
            client.write_all(CONNECTION_ESTABLISHED).await?;
            info!("Tunnel established to {}:{}", host, port);

            let summary = tunnel(client, upstream, TunnelTraffic::new(), limits.tunnel_buffer).await;
            debug!(
                "Tunnel to {}:{} closed by {:?}: {}↑ {}↓ bytes",
                host, port, summary.closed_by, summary.up, summary.down
            );
            Ok(ForwardOutcome::Tunneled(summary))
        }
        Target::Http { host, port } => {
            let mut upstream = dial(&host, port).await?;
            let n = relay_once(&mut client, &mut upstream, request, limits.reply_buffer).await?;
            debug!("Relayed {} bytes from {}:{}", n, host, port);
            let _ = upstream.shutdown().await;
            let _ = client.shutdown().await;
            Ok(ForwardOutcome::Relayed(n))
        }
    }
}

/// Send the captured request upstream as-is and pass back exactly one read
/// of the reply. Anything the upstream sends after that first read is dropped.
async fn relay_once(
    client: &mut TcpStream,
    upstream: &mut TcpStream,
    request: &ProxyRequest,
    reply_buffer: usize,
) -> Result<usize, SessionError> {
    upstream.write_all(request.raw()).await?;

    let mut buf = vec![0u8; reply_buffer];
    let n = upstream.read(&mut buf).await?;
    client.write_all(&buf[..n]).await?;
    Ok(n)
}
