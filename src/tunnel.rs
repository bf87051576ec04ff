use crate::traffic::{Direction, TunnelTraffic};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// How a tunnel ended
#[derive(Debug)]
pub struct TunnelSummary {
    /// Bytes relayed client -> upstream
    pub up: u64,
    /// Bytes relayed upstream -> client
    pub down: u64,
    /// The direction whose copy loop finished first
    pub closed_by: Direction,
    /// Error that ended the first loop, if it was not a clean EOF
    pub error: Option<io::Error>,
}

/// Copy from `reader` to `writer` until EOF or an I/O error, then shut the
/// writer down.
async fn pump<R, W>(
    mut reader: R,
    mut writer: W,
    direction: Direction,
    traffic: TunnelTraffic,
    buf_size: usize,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; buf_size];
    let result = loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break Ok(()),
            Ok(n) => n,
            Err(e) => break Err(e),
        };
        if let Err(e) = writer.write_all(&buf[..n]).await {
            break Err(e);
        }
        traffic.record(direction, n as u64);
    };

    if let Err(e) = writer.shutdown().await {
        debug!("{:?} shutdown error: {}", direction, e);
    }
    result
}

/// Relay bytes between `client` and `upstream` until either side is done.
///
/// Each direction runs in its own task. Whichever finishes first aborts the
/// other, and once both tasks have dropped their halves both sockets are
/// closed.
pub async fn tunnel(
    client: TcpStream,
    upstream: TcpStream,
    traffic: TunnelTraffic,
    buf_size: usize,
) -> TunnelSummary {
    let (client_read, client_write) = client.into_split();
    let (upstream_read, upstream_write) = upstream.into_split();

    let mut up = tokio::spawn(pump(
        client_read,
        upstream_write,
        Direction::Up,
        traffic.clone(),
        buf_size,
    ));
    let mut down = tokio::spawn(pump(
        upstream_read,
        client_write,
        Direction::Down,
        traffic.clone(),
        buf_size,
    ));

    let (closed_by, finished) = tokio::select! {
        res = &mut up => {
            down.abort();
            let _ = down.await;
            (Direction::Up, res)
        }
        res = &mut down => {
            up.abort();
            let _ = up.await;
            (Direction::Down, res)
        }
    };

    let error = match finished {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e),
        Err(join) => Some(io::Error::other(join)),
    };

    let (up, down) = traffic.get();
    TunnelSummary {
        up,
        down,
        closed_by,
        error,
    }
}
