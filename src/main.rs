//! RangeKeeper entry point: wiring, startup checks and shutdown handling

use anyhow::{Context, Result};
use ethers::providers::{Http, Provider};
use ethers::types::Address;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use rangekeeper::config::AppConfig;
use rangekeeper::keeper::KeeperLoop;
use rangekeeper::oracle::sources::{ChainlinkFeed, PythFeed};
use rangekeeper::oracle::ConsensusValidator;
use rangekeeper::rebalance::RebalanceOrchestrator;
use rangekeeper::telemetry::TracingTelemetry;
use rangekeeper::vault::{EthersVault, RangeMonitor};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::load()?;
    config.validate_env()?;
    tracing::info!(config = %config.digest(), "Starting rangekeeper");

    let private_key = std::env::var("PRIVATE_KEY").context("PRIVATE_KEY not set")?;
    let rpc_url = std::env::var("RPC_URL").context("RPC_URL not set")?;
    let vault_address: Address = std::env::var("VAULT_ADDRESS")
        .context("VAULT_ADDRESS not set")?
        .parse()
        .context("VAULT_ADDRESS is not a valid address")?;
    let feed_address: Address = std::env::var("CHAINLINK_FEED_ADDRESS")
        .context("CHAINLINK_FEED_ADDRESS not set")?
        .parse()
        .context("CHAINLINK_FEED_ADDRESS is not a valid address")?;
    let pyth_price_id = std::env::var("PYTH_PRICE_ID").context("PYTH_PRICE_ID not set")?;

    let vault = Arc::new(EthersVault::with_chain_id(
        &rpc_url,
        &private_key,
        vault_address,
        config.chain.chain_id,
    )?);
    let wallet = vault.wallet_address();

    match vault.wallet_balance().await {
        Ok(balance) if EthersVault::balance_is_low(balance) => {
            let eth = ethers::utils::format_units(balance, "ether").unwrap_or_default();
            tracing::warn!(balance_eth = %eth, "Wallet balance is low; live actions may fail");
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "Could not read wallet balance at startup"),
    }

    let provider = Arc::new(
        Provider::<Http>::try_from(rpc_url.as_str())
            .with_context(|| format!("Invalid RPC URL '{}'", rpc_url))?,
    );

    let pyth = Arc::new(PythFeed::new(&config.oracle.hermes_url, &pyth_price_id)?);
    let chainlink = Arc::new(ChainlinkFeed::new(provider, feed_address));

    let telemetry = TracingTelemetry::shared();
    let validator = ConsensusValidator::new(config.oracle.max_deviation_bps);
    let monitor = RangeMonitor::new(vault.clone(), config.oracle.tick_scale_factor);
    let orchestrator = RebalanceOrchestrator::new(
        vault.clone(),
        telemetry.clone(),
        config.keeper.dry_run,
        config.keeper.max_fee_gwei,
    );

    let mut keeper = KeeperLoop::new(
        pyth,
        chainlink,
        validator,
        monitor,
        orchestrator,
        vault,
        telemetry,
        wallet,
        Duration::from_millis(config.keeper.check_interval_ms),
    );

    tokio::select! {
        _ = keeper.run() => {}
        _ = shutdown_signal() => {
            tracing::info!("Shutdown signal received, stopping");
        }
    }

    keeper.stats().report();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
