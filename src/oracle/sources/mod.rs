//! Price feed implementations (Pyth off-chain, Chainlink on-chain)

mod chainlink;
mod pyth;

pub use chainlink::ChainlinkFeed;
pub use pyth::PythFeed;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{PriceObservation, PriceSource};

/// Errors from a single price fetch
///
/// Each fetch is one fallible operation; retry happens naturally on the next
/// cycle, never inside the feed.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("{feed}: request timed out")]
    Timeout { feed: &'static str },

    #[error("{feed}: bad response: {detail}")]
    BadResponse {
        feed: &'static str,
        detail: String,
    },

    #[error("{feed}: unavailable: {detail}")]
    Unavailable {
        feed: &'static str,
        detail: String,
    },

    #[error("Chainlink: stale round (answered_in_round {answered_in_round} < round_id {round_id})")]
    StaleRound {
        round_id: u128,
        answered_in_round: u128,
    },

    #[error("Chainlink: contract call failed: {0}")]
    CallFailure(String),
}

/// Result of a best-effort feed health probe
#[derive(Debug, Clone)]
pub struct FeedHealth {
    pub healthy: bool,
    pub issues: Vec<String>,
}

impl FeedHealth {
    pub fn healthy() -> Self {
        Self {
            healthy: true,
            issues: Vec::new(),
        }
    }

    pub fn unhealthy(issues: Vec<String>) -> Self {
        Self {
            healthy: false,
            issues,
        }
    }
}

/// Trait for independent price feeds
#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Get the feed name
    fn name(&self) -> &'static str;

    /// Which source label this feed reports under
    fn source(&self) -> PriceSource;

    /// Fetch the latest price observation
    async fn fetch_latest(&self) -> Result<PriceObservation, FeedError>;

    /// Probe feed health (freshness, reported confidence)
    async fn health_check(&self) -> FeedHealth;
}
