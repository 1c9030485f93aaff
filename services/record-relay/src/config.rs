//! Relay configuration.
//!
//! Every flag can also be given through the environment; flags win.

use std::net::SocketAddr;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio::net::lookup_host;

use crate::error::RelayError;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Command-line surface.
#[derive(Debug, Parser)]
#[command(
    name = "record-relay",
    version,
    about = "Transparent TCP relay that logs TLS record-layer framing"
)]
pub struct Cli {
    /// Local address to listen on (host:port).
    #[arg(short, long, env = "RECORD_RELAY_LISTEN")]
    pub listen: Option<String>,

    /// Remote address to relay to (host:port).
    #[arg(short, long, env = "RECORD_RELAY_REMOTE")]
    pub remote: Option<String>,

    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(long, env = "RECORD_RELAY_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format.
    #[arg(long, env = "RECORD_RELAY_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Close a direction after this many seconds without data.
    #[arg(long, env = "RECORD_RELAY_IDLE_TIMEOUT_SECS")]
    pub idle_timeout_secs: Option<u64>,

    /// Give up on an upstream dial after this many seconds.
    #[arg(long, env = "RECORD_RELAY_CONNECT_TIMEOUT_SECS")]
    pub connect_timeout_secs: Option<u64>,
}

/// Resolved relay configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the listener binds to.
    pub listen_addr: SocketAddr,

    /// Upstream every connection is relayed to.
    pub remote_addr: SocketAddr,

    /// Per-direction idle timeout.
    pub idle_timeout: Option<Duration>,

    /// Upstream connect timeout.
    pub connect_timeout: Option<Duration>,
}

impl Config {
    /// Validate the command line and resolve both addresses.
    pub async fn from_cli(cli: &Cli) -> Result<Self, RelayError> {
        let listen = required(cli.listen.as_deref(), "--listen")?;
        let remote = required(cli.remote.as_deref(), "--remote")?;

        let listen_addr = resolve(listen).await?;
        let remote_addr = resolve(remote).await?;

        Ok(Self {
            listen_addr,
            remote_addr,
            idle_timeout: cli
                .idle_timeout_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            connect_timeout: cli
                .connect_timeout_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        })
    }
}

fn required<'a>(value: Option<&'a str>, flag: &'static str) -> Result<&'a str, RelayError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(RelayError::MissingAddress(flag))
}

/// Resolve `host:port`, preferring an IPv4 result.
pub async fn resolve(addr: &str) -> Result<SocketAddr, RelayError> {
    let candidates: Vec<SocketAddr> = lookup_host(addr)
        .await
        .map_err(|source| RelayError::Resolve {
            addr: addr.to_string(),
            source,
        })?
        .collect();

    candidates
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| candidates.first())
        .copied()
        .ok_or_else(|| RelayError::NoAddress(addr.to_string()))
}
