//! Configuration management for the keeper
//!
//! Loads from optional config files + environment variables via .env.
//! Secrets (PRIVATE_KEY, RPC URL, addresses) live in the environment only
//! and never in config files.

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub keeper: KeeperConfig,
    pub oracle: OracleConfig,
    pub chain: ChainConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeeperConfig {
    /// Dry run mode (no transactions dispatched)
    pub dry_run: bool,
    /// Check interval in milliseconds
    pub check_interval_ms: u64,
    /// Fee ceiling in gwei; rebalances above this are skipped
    pub max_fee_gwei: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    /// Maximum pairwise oracle deviation in basis points
    pub max_deviation_bps: u32,
    /// Pyth Hermes API base URL
    pub hermes_url: String,
    /// Normalizes the quote price for the pool's decimal difference
    pub tick_scale_factor: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// Chain id applied to the signing wallet (421614 = Arbitrum Sepolia)
    pub chain_id: u64,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Config::builder()
            // Keeper defaults
            .set_default("keeper.dry_run", true)?
            .set_default("keeper.check_interval_ms", 60_000)?
            .set_default("keeper.max_fee_gwei", 50.0)?
            // Oracle defaults
            .set_default("oracle.max_deviation_bps", 500)?
            .set_default("oracle.hermes_url", "https://hermes.pyth.network")?
            .set_default("oracle.tick_scale_factor", 1e12)?
            // Chain defaults
            .set_default("chain.chain_id", 421_614)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (KEEPER_*)
            .add_source(Environment::with_prefix("KEEPER").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(app_config)
    }

    /// Generate a digest of the config (without secrets) for logging
    pub fn digest(&self) -> String {
        format!(
            "dry_run={} interval_ms={} max_fee_gwei={} max_deviation_bps={} chain_id={}",
            self.keeper.dry_run,
            self.keeper.check_interval_ms,
            self.keeper.max_fee_gwei,
            self.oracle.max_deviation_bps,
            self.chain.chain_id
        )
    }

    /// Validate required environment variables
    pub fn validate_env(&self) -> Result<()> {
        let required = vec![
            "PRIVATE_KEY",
            "RPC_URL",
            "VAULT_ADDRESS",
            "CHAINLINK_FEED_ADDRESS",
            "PYTH_PRICE_ID",
        ];

        for var in required {
            if std::env::var(var).is_err() {
                bail!("Required environment variable {} is not set", var);
            }
        }

        // Validate private key format
        let pk = std::env::var("PRIVATE_KEY")?;
        if !pk.starts_with("0x") || pk.len() != 66 {
            bail!("PRIVATE_KEY must be a hex string with 0x prefix (66 chars total)");
        }

        Ok(())
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
