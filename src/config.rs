use crate::auth::{Auth, CredentialStore};
use clap::Parser;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

pub const DEFAULT_PORT: u16 = 8091;
pub const DEFAULT_CREDENTIALS: &str = "enterpriseuser:enterprise123";
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Configuration errors raised while building [`ProxyConfig`]
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid credential {0:?}, expected user:pass")]
    InvalidCredential(String),

    #[error("at least one credential is required")]
    NoCredentials,

    #[error("{0} must be greater than zero")]
    ZeroBuffer(&'static str),
}

/// Command line interface configuration
#[derive(Parser, Debug)]
#[command(
    author, version,
    about = "Forward HTTP proxy gated by HTTP Basic credentials",
    long_about = "preauth-proxy answers every request without valid Proxy-Authorization with a 407.\n\nAuthenticated CONNECT requests are tunneled; authenticated http:// requests are\nforwarded once and the first reply buffer is relayed back.\n\nWith no flags it listens on 0.0.0.0:8091 and accepts enterpriseuser:enterprise123.\n"
)]
pub struct Cli {
    /// IP address to listen on
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub listen_ip: IpAddr,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Accepted credentials, comma-separated "user:pass" pairs
    #[arg(long, value_delimiter = ',', value_name = "USER:PASS")]
    pub credentials: Option<Vec<String>>,

    /// Bytes taken from the client in the single request read
    #[arg(long = "request-buffer", default_value_t = DEFAULT_BUFFER_SIZE)]
    pub request_buffer: usize,

    /// Bytes taken from the upstream in the single reply read (plain HTTP)
    #[arg(long = "reply-buffer", default_value_t = DEFAULT_BUFFER_SIZE)]
    pub reply_buffer: usize,

    /// Per-direction copy buffer for CONNECT tunnels
    #[arg(long = "tunnel-buffer", default_value_t = DEFAULT_BUFFER_SIZE)]
    pub tunnel_buffer: usize,

    /// Interval seconds between status log lines (0 disables)
    #[arg(long = "status-interval", default_value_t = 300)]
    pub status_interval: u64,
}

/// Proxy server configuration derived from CLI arguments
#[derive(Clone, Debug)]
pub struct ProxyConfig {
    pub listen_addr: SocketAddr,
    pub credentials: CredentialStore,
    pub request_buffer: usize,
    pub reply_buffer: usize,
    pub tunnel_buffer: usize,
    pub status_interval: u64,
}

impl ProxyConfig {
    /// Create ProxyConfig from CLI arguments
    pub fn from_cli(args: Cli) -> Result<Self, ConfigError> {
        let listen_addr = SocketAddr::from((args.listen_ip, args.port));

        let pairs = args
            .credentials
            .unwrap_or_else(|| vec![DEFAULT_CREDENTIALS.to_string()]);
        let credentials = pairs
            .iter()
            .map(|pair| match Auth::from_pair(pair) {
                Some(auth) if !auth.username.is_empty() => Ok(auth),
                _ => Err(ConfigError::InvalidCredential(pair.clone())),
            })
            .collect::<Result<Vec<_>, _>>()?;
        let credentials = CredentialStore::new(credentials);
        if credentials.is_empty() {
            return Err(ConfigError::NoCredentials);
        }

        for (name, size) in [
            ("--request-buffer", args.request_buffer),
            ("--reply-buffer", args.reply_buffer),
            ("--tunnel-buffer", args.tunnel_buffer),
        ] {
            if size == 0 {
                return Err(ConfigError::ZeroBuffer(name));
            }
        }

        Ok(Self {
            listen_addr,
            credentials,
            request_buffer: args.request_buffer,
            reply_buffer: args.reply_buffer,
            tunnel_buffer: args.tunnel_buffer,
            status_interval: args.status_interval,
        })
    }
}
