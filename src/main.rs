//! avatar-relay server entry point.
//!
//! Starts the Axum HTTP server with the relay WebSocket and REST endpoints.

use tracing_subscriber::EnvFilter;

use avatar_relay::config::{LogFormat, RelayConfig};
use avatar_relay::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config =
        RelayConfig::from_env().map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    tracing::info!(addr = %config.listen_addr, "starting avatar-relay");
    server::serve(&config).await
}
