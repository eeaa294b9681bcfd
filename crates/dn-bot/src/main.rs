//! Delta-neutral pair cycle engine - entry point.
//!
//! Alternates BUILD and UNWIND cycles over a two-leg pair, with
//! periodic position reconciliation and a hard halt latch.

use std::path::Path;

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Delta-neutral pair cycle engine
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via DN_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    dn_telemetry::init_logging()?;

    info!("Starting dn-bot v{}", env!("CARGO_PKG_VERSION"));

    // Determine config path: CLI arg > DN_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("DN_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    let config = if Path::new(&config_path).exists() {
        info!(config_path = %config_path, "Loading configuration");
        dn_bot::AppConfig::from_file(&config_path)?
    } else {
        info!(config_path = %config_path, "Config file not found, using defaults");
        dn_bot::AppConfig::default()
    };
    info!(?config.mode, pair = %format!("{}/{}", config.pair.long.symbol, config.pair.short.symbol), "Configuration loaded");

    let mut app = dn_bot::Application::new(config)?;
    app.run().await?;

    Ok(())
}
