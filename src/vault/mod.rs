//! Vault collaborators: position reads and corrective-action execution
//!
//! The vault contract owns all position accounting and fee logic; this module
//! only reads its state and dispatches keeper-authorized actions. State is
//! read fresh every cycle - caching a range snapshot across cycles would risk
//! rebalancing against stale data.

pub mod monitor;

pub use monitor::{RangeAssessment, RangeMonitor};

use anyhow::{Context, Result};
use async_trait::async_trait;
use ethers::contract::abigen;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, PendingTransaction, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, TxHash, U256};
use std::sync::Arc;

use crate::error::KeeperError;
use crate::types::PositionRange;

abigen!(
    RangeVault,
    r#"[
        function autoExit(uint256 price, uint8 reason) external
        function autoReenter(uint256 price, int24 tickLower, int24 tickUpper) external
        function tokenId() external view returns (uint256)
        function tickLower() external view returns (int24)
        function tickUpper() external view returns (int24)
        function totalAssets() external view returns (uint256)
        function uniswapPool() external view returns (address)
        function keeper() external view returns (address)
    ]"#
);

abigen!(
    UniswapV3Pool,
    r#"[
        function slot0() external view returns (uint160 sqrtPriceX96, int24 tick, uint16 observationIndex, uint16 observationCardinality, uint16 observationCardinalityNext, uint8 feeProtocol, bool unlocked)
    ]"#
);

/// Read-only view of the vault's position state
#[async_trait]
pub trait VaultReader: Send + Sync {
    /// Active position identifier; 0 means no open position
    async fn active_position_id(&self) -> Result<u64, KeeperError>;

    /// Current tick range of the position
    async fn range(&self) -> Result<PositionRange, KeeperError>;

    /// Pool address the vault is bound to; zero means unconfigured
    async fn pool_ref(&self) -> Result<Address, KeeperError>;

    /// Identity authorized to trigger corrective actions
    async fn keeper_authority(&self) -> Result<Address, KeeperError>;

    /// Best-effort read of the pool's current tick, used only as the spot
    /// reference for advisory attack detection. `None` when the pool is
    /// unconfigured or unreadable.
    async fn pool_tick(&self) -> Result<Option<i32>, KeeperError>;
}

/// Handle to a dispatched but unconfirmed action
#[derive(Debug, Clone)]
pub struct PendingAction {
    pub tx_hash: String,
}

/// Confirmation receipt for a dispatched action
#[derive(Debug, Clone)]
pub struct ActionReceipt {
    pub tx_hash: String,
    pub gas_used: u64,
}

/// Dispatches corrective actions against the vault
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Current network fee rate in gwei
    async fn current_fee_rate_gwei(&self) -> Result<f64, KeeperError>;

    /// Dispatch the exit step with the consensus price (vault fixed-point
    /// convention) and a reason code
    async fn submit_exit(
        &self,
        price_fixed_point: U256,
        reason: u8,
    ) -> Result<PendingAction, KeeperError>;

    /// Wait for the dispatched action to confirm
    async fn await_confirmation(&self, pending: PendingAction)
        -> Result<ActionReceipt, KeeperError>;
}

type VaultClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Balances below this (0.01 ETH in wei) trigger a startup low-gas warning
const MIN_WALLET_BALANCE_WEI: U256 = U256([10_000_000_000_000_000, 0, 0, 0]);

/// Ethers-backed vault client implementing both collaborator contracts
pub struct EthersVault {
    vault: RangeVault<VaultClient>,
    provider: Arc<Provider<Http>>,
}

impl EthersVault {
    pub fn new(rpc_url: &str, private_key: &str, vault_address: Address) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .with_context(|| format!("Invalid RPC URL '{}'", rpc_url))?;
        let provider = Arc::new(provider);

        let wallet: LocalWallet = private_key.parse().context("Invalid PRIVATE_KEY")?;
        let client = Arc::new(SignerMiddleware::new((*provider).clone(), wallet));

        Ok(Self {
            vault: RangeVault::new(vault_address, client),
            provider,
        })
    }

    /// Create with an explicit chain id applied to the signer
    pub fn with_chain_id(
        rpc_url: &str,
        private_key: &str,
        vault_address: Address,
        chain_id: u64,
    ) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .with_context(|| format!("Invalid RPC URL '{}'", rpc_url))?;
        let provider = Arc::new(provider);

        let wallet: LocalWallet = private_key.parse().context("Invalid PRIVATE_KEY")?;
        let wallet = wallet.with_chain_id(chain_id);
        let client = Arc::new(SignerMiddleware::new((*provider).clone(), wallet));

        Ok(Self {
            vault: RangeVault::new(vault_address, client),
            provider,
        })
    }

    /// Wallet address used to sign keeper actions
    pub fn wallet_address(&self) -> Address {
        self.vault.client().signer().address()
    }

    /// Current wallet balance in wei
    pub async fn wallet_balance(&self) -> Result<U256, KeeperError> {
        self.provider
            .get_balance(self.wallet_address(), None)
            .await
            .map_err(Self::read_err)
    }

    /// Whether a balance is too low to reliably cover gas for live actions
    pub fn balance_is_low(balance: U256) -> bool {
        balance < MIN_WALLET_BALANCE_WEI
    }

    fn read_err(e: impl std::fmt::Display) -> KeeperError {
        KeeperError::DataUnavailable(format!("vault read failed: {}", e))
    }
}

#[async_trait]
impl VaultReader for EthersVault {
    async fn active_position_id(&self) -> Result<u64, KeeperError> {
        let token_id = self
            .vault
            .token_id()
            .call()
            .await
            .map_err(Self::read_err)?;
        Ok(token_id.as_u64())
    }

    async fn range(&self) -> Result<PositionRange, KeeperError> {
        let (lower, upper) = tokio::try_join!(
            async { self.vault.tick_lower().call().await.map_err(Self::read_err) },
            async { self.vault.tick_upper().call().await.map_err(Self::read_err) },
        )?;
        Ok(PositionRange::new(lower, upper))
    }

    async fn pool_ref(&self) -> Result<Address, KeeperError> {
        self.vault
            .uniswap_pool()
            .call()
            .await
            .map_err(Self::read_err)
    }

    async fn keeper_authority(&self) -> Result<Address, KeeperError> {
        self.vault.keeper().call().await.map_err(Self::read_err)
    }

    async fn pool_tick(&self) -> Result<Option<i32>, KeeperError> {
        let pool = self.pool_ref().await?;
        if pool == Address::zero() {
            return Ok(None);
        }

        let pool_contract = UniswapV3Pool::new(pool, self.provider.clone());
        match pool_contract.slot_0().call().await {
            Ok((_sqrt_price, tick, ..)) => Ok(Some(tick)),
            Err(e) => {
                tracing::debug!(error = %e, pool = %format!("{:#x}", pool), "Pool slot0 read failed");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl ActionExecutor for EthersVault {
    async fn current_fee_rate_gwei(&self) -> Result<f64, KeeperError> {
        let gas_price = self
            .provider
            .get_gas_price()
            .await
            .map_err(|e| KeeperError::action(format!("fee rate read failed: {}", e)))?;

        let gwei = ethers::utils::format_units(gas_price, "gwei")
            .map_err(|e| KeeperError::action(format!("fee rate conversion failed: {}", e)))?;
        gwei.parse::<f64>()
            .map_err(|e| KeeperError::action(format!("fee rate parse failed: {}", e)))
    }

    async fn submit_exit(
        &self,
        price_fixed_point: U256,
        reason: u8,
    ) -> Result<PendingAction, KeeperError> {
        let call = self.vault.auto_exit(price_fixed_point, reason);
        let pending = call
            .send()
            .await
            .map_err(|e| KeeperError::action(e.to_string()))?;

        Ok(PendingAction {
            tx_hash: format!("{:#x}", pending.tx_hash()),
        })
    }

    async fn await_confirmation(
        &self,
        pending: PendingAction,
    ) -> Result<ActionReceipt, KeeperError> {
        let tx_hash: TxHash = pending
            .tx_hash
            .parse()
            .map_err(|e| KeeperError::action(format!("bad tx hash '{}': {}", pending.tx_hash, e)))?;

        let receipt = PendingTransaction::new(tx_hash, self.provider.as_ref())
            .await
            .map_err(|e| KeeperError::action(e.to_string()))?
            .ok_or_else(|| {
                KeeperError::action(format!(
                    "transaction {} dropped before confirmation",
                    pending.tx_hash
                ))
            })?;

        Ok(ActionReceipt {
            tx_hash: pending.tx_hash,
            gas_used: receipt.gas_used.map(|g| g.as_u64()).unwrap_or_default(),
        })
    }
}
