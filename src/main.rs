//! `room-relay` server binary.
//!
//! ```sh
//! PORT=8080 RUST_LOG=debug cargo run
//! ```

use room_relay::{RelayConfig, RelayServer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set `RUST_LOG=debug` for per-connection output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = RelayConfig::from_env();
    let mut server = RelayServer::start(config).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Ctrl+C received, shutting down");
    server.shutdown().await;

    Ok(())
}
