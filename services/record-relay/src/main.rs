//! record-relay
//!
//! Transparent TCP relay that logs TLS record-layer framing.
//!
//! This service:
//! - Accepts TCP connections on the listen address
//! - Dials the remote address once per accepted connection
//! - Forwards TLS records unmodified in both directions
//! - Logs content type, version, length and clear-text handshake/alert fields

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use record_relay::config::{Cli, Config, LogFormat};
use record_relay::{Listener, ListenerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Prefer RUST_LOG, fallback to --log-level
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let registry = tracing_subscriber::registry().with(filter);
    match cli.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }

    let config = Config::from_cli(&cli)
        .await
        .context("Invalid relay configuration")?;

    info!(
        listen_addr = %config.listen_addr,
        remote_addr = %config.remote_addr,
        idle_timeout_secs = config.idle_timeout.map(|d| d.as_secs()),
        connect_timeout_secs = config.connect_timeout.map(|d| d.as_secs()),
        "Starting record relay"
    );

    let mut listener_config = ListenerConfig::new(config.listen_addr, config.remote_addr);
    listener_config.idle_timeout = config.idle_timeout;
    listener_config.connect_timeout = config.connect_timeout;

    let listener = Arc::new(
        Listener::bind(listener_config)
            .await
            .context("Failed to start listener")?,
    );

    tokio::select! {
        result = Arc::clone(&listener).run() => {
            if let Err(e) = &result {
                error!(error = %e, reason = e.reason_code(), "Listener failed");
            }
            result.context("Listener stopped")
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            Ok(())
        }
    }
}
