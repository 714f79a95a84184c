//! Service binary: loads configuration, wires the per-chain relay stacks and
//! runs the funding monitors. The request-handling surface that feeds
//! `RelayOrchestrator::relay` is mounted by the embedding application.

use std::time::Duration;

use color_eyre::Result;
use log::info;

use evm_tx_relay::{
    bootstrap::initialize_relays,
    config::{Config, ServerConfig},
    logging::setup_logging,
};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();
    setup_logging()?;

    let server_config = ServerConfig::from_env();
    let config = Config::load(&server_config.config_file_path)?;
    let relays = initialize_relays(&config, &server_config).await?;

    let interval = Duration::from_secs(server_config.funding_check_interval_secs);
    for relay in &relays {
        info!("relay orchestrator ready for chain {}", relay.id);
        tokio::spawn(relay.funding.clone().run(interval));
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    Ok(())
}
