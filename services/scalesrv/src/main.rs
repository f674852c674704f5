//! Scale Protocol Discovery & Ingestion service entry point.
//!
//! Builds the component graph (transport, discovery supervisor, storage
//! router), starts one discovery session against the configured transport,
//! and runs until a shutdown signal arrives.

use clap::Parser;
use scalesrv::{ScaleService, ScaleServiceConfig};
use tracing::{error, info, warn};

/// Command line arguments for the scale ingestion service.
#[derive(Parser)]
#[command(
    name = "scalesrv",
    version = env!("CARGO_PKG_VERSION"),
    about = "Scale protocol discovery and ingestion service"
)]
struct Args {
    /// Configuration file path.
    #[arg(short, long)]
    config: Option<String>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = ScaleServiceConfig::load(args.config.as_deref())
        .map_err(|e| anyhow::anyhow!("failed to load configuration: {e}"))?;

    let log_level = args.log_level.unwrap_or_else(|| config.service.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(log_level.parse().unwrap_or(tracing::Level::INFO.into())),
        )
        .json()
        .init();

    info!(service = %config.service.name, "starting scale ingestion service");

    let service = ScaleService::build(&config);

    match service.start_discovery(&config).await {
        Ok(session_id) => info!(%session_id, "discovery session started"),
        Err(e) => warn!(error = %e, "failed to start initial discovery session"),
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received shutdown signal"),
        Err(e) => error!(error = %e, "failed to listen for shutdown signal"),
    }

    service.shutdown().await;
    info!("scale ingestion service shutdown complete");

    Ok(())
}
