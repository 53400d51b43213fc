use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};

use uppe_synthetics::config::Config;
use uppe_synthetics::orchestrator::Orchestrator;
use uppe_synthetics::pool::create_pool;

/// Uppe synthetics service: scheduled HTTP checks with assertions.
#[derive(Parser, Debug)]
#[command(name = "uppe-synthetics", version, about)]
struct Cli {
    /// Path to the service config (created with defaults when missing)
    #[arg(long, env = "UPPE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::from_config(cli.config.as_ref()).context("failed to load config")?;
    logger::init_with_level(&config.logging.level);
    println!("{config}");

    let pool = create_pool(&config.database.path, config.database.max_connections)
        .await
        .with_context(|| format!("failed to open database {}", config.database.path.display()))?;

    let (stop, shutdown) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received interrupt, stopping"),
            Err(e) => error!(error = %e, "Failed to listen for interrupt"),
        }
        let _ = stop.send(true);
    });

    Orchestrator::start(config, pool, shutdown).await
}
