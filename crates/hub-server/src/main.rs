//! homehub server
//!
//! Loads `configuration.yaml` from the directory given as the first argument
//! (or `HOMEHUB_CONFIG_DIR`, or the working directory) and runs every
//! configured component until Ctrl-C.

mod hub;

use anyhow::{Context, Result};
use hub::HomeHub;
use hub_config::{load_yaml, CONFIG_FILE};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let config_dir = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("HOMEHUB_CONFIG_DIR").ok())
        .unwrap_or_else(|| ".".to_string());

    info!(%config_dir, "Starting homehub");

    let config = load_yaml(config_dir.clone(), CONFIG_FILE)
        .with_context(|| format!("loading {} from {}", CONFIG_FILE, config_dir))?;
    let hub = HomeHub::load(&config)?;
    let flags = hub.flags.clone();
    let handles = hub.start();

    info!("homehub is running");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    flags.shutdown();

    for handle in handles {
        if let Err(e) = handle.await {
            error!(error = %e, "Task failed during shutdown");
        }
    }

    info!("Shutdown complete");
    Ok(())
}
