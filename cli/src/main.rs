use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use strata_cli::{Node, NodeConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stratad")]
#[command(about = "Strata blockchain node", version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => NodeConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => NodeConfig::default(),
    };
    init_logging(&config.logging.level);

    match &cli.config {
        Some(path) => info!(config = %path.display(), "starting strata node"),
        None => warn!("no config file given, using defaults"),
    }

    let node = Node::start(&config).await?;
    info!(address = %node.local_addr, "node running, press ctrl-c to stop");

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!("shutdown requested");
    node.shutdown().await;
    Ok(())
}
