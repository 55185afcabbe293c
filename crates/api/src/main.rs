//! Potato Leaf Classifier - Server Entry Point
//!
//! Usage: `leafscan-server [config.toml]`

use anyhow::Context;
use api::{init_logging, run_server, AppConfig};
use std::path::PathBuf;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref()).context("Failed to load configuration")?;

    init_logging(&config.logging)?;

    info!("=== LeafScan v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        "Artifacts: {:?}, threshold {:.2}, {} predictors",
        config.artifacts.dir, config.inference.threshold, config.inference.pool_size
    );

    run_server(config).await?;
    Ok(())
}
