//! Watchtower CLI
//!
//! Command-line interface for the endpoint uptime monitoring service.

use std::path::PathBuf;

use clap::Parser;
use tracing::Level;
use watchtower::{load_config, Config, WatchtowerBuilder};

#[derive(Parser)]
#[command(name = "watchtower")]
#[command(about = "Endpoint uptime monitoring and notification service")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Maximum number of simultaneous probes (overrides config file)
    #[arg(long)]
    max_concurrent_probes: Option<usize>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: Level,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .init();

    tracing::debug!(
        "Parsed command line arguments: config={:?}, max_concurrent_probes={:?}, log_level={:?}",
        args.config,
        args.max_concurrent_probes,
        args.log_level
    );

    let mut config = if let Some(config_path) = &args.config {
        tracing::debug!("Loading configuration from {:?}", config_path);
        load_config(config_path)?
    } else {
        tracing::debug!("Using default configuration");
        Config::default()
    };

    if let Some(max) = args.max_concurrent_probes {
        config.scheduler.max_concurrent_probes = Some(max);
    }

    tracing::info!("Starting watchtower service");
    tracing::debug!(
        "Seed endpoints: {}, poll resolution: {:?}",
        config.endpoints.len(),
        config.scheduler.poll_resolution
    );

    let watchtower = WatchtowerBuilder::new(config).build().await?;

    let cancel = watchtower.cancellation_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown signal received"),
            Err(e) => tracing::error!("Failed to listen for ctrl-c: {}", e),
        }
        cancel.cancel();
    });

    watchtower.start().await?;

    Ok(())
}
