//! Chainlink price feed via an on-chain aggregator (reads are free)
//!
//! Docs: https://docs.chain.link/data-feeds

use async_trait::async_trait;
use chrono::Utc;
use ethers::contract::abigen;
use ethers::providers::{Http, Provider};
use ethers::types::{Address, I256};
use std::sync::Arc;

use crate::oracle::sources::{FeedError, FeedHealth, PriceFeed};
use crate::types::{PriceObservation, PriceSource};

/// Rounds older than this are flagged in health checks
const MAX_ROUND_AGE_SECS: i64 = 3600;

abigen!(
    AggregatorV3,
    r#"[
        function latestRoundData() external view returns (uint80 roundId, int256 answer, uint256 startedAt, uint256 updatedAt, uint80 answeredInRound)
        function decimals() external view returns (uint8)
    ]"#
);

/// On-chain Chainlink aggregator client
#[derive(Debug, Clone)]
pub struct ChainlinkFeed {
    feed: AggregatorV3<Provider<Http>>,
}

impl ChainlinkFeed {
    pub fn new(provider: Arc<Provider<Http>>, feed_address: Address) -> Self {
        Self {
            feed: AggregatorV3::new(feed_address, provider),
        }
    }

    /// Round sanity checks mirrored from the aggregator consumer guidelines.
    fn validate_round(
        round_id: u128,
        answer: I256,
        answered_in_round: u128,
    ) -> Result<(), FeedError> {
        if answer <= I256::zero() {
            return Err(FeedError::BadResponse {
                feed: "Chainlink",
                detail: format!("non-positive answer {}", answer),
            });
        }

        if answered_in_round < round_id {
            return Err(FeedError::StaleRound {
                round_id,
                answered_in_round,
            });
        }

        Ok(())
    }

    fn scale_answer(answer: I256, decimals: u8) -> Result<f64, FeedError> {
        let formatted =
            ethers::utils::format_units(answer, u32::from(decimals)).map_err(|e| {
                FeedError::BadResponse {
                    feed: "Chainlink",
                    detail: format!("unscalable answer: {}", e),
                }
            })?;
        formatted.parse::<f64>().map_err(|e| FeedError::BadResponse {
            feed: "Chainlink",
            detail: format!("unparseable answer: {}", e),
        })
    }
}

#[async_trait]
impl PriceFeed for ChainlinkFeed {
    fn name(&self) -> &'static str {
        "Chainlink"
    }

    fn source(&self) -> PriceSource {
        PriceSource::Chainlink
    }

    async fn fetch_latest(&self) -> Result<PriceObservation, FeedError> {
        let (round_id, answer, _started_at, updated_at, answered_in_round) = self
            .feed
            .latest_round_data()
            .call()
            .await
            .map_err(|e| FeedError::CallFailure(e.to_string()))?;

        Self::validate_round(round_id, answer, answered_in_round)?;

        let decimals = self
            .feed
            .decimals()
            .call()
            .await
            .map_err(|e| FeedError::CallFailure(e.to_string()))?;

        let price = Self::scale_answer(answer, decimals)?;
        let updated_at = updated_at.as_u64() as i64;

        let age = Utc::now().timestamp() - updated_at;
        if age > MAX_ROUND_AGE_SECS {
            tracing::warn!(age_secs = age, "Chainlink round data is old");
        }

        Ok(PriceObservation::new(
            price,
            PriceSource::Chainlink,
            updated_at,
        ))
    }

    async fn health_check(&self) -> FeedHealth {
        let observation = match self.fetch_latest().await {
            Ok(o) => o,
            Err(e) => return FeedHealth::unhealthy(vec![e.to_string()]),
        };

        let mut issues = Vec::new();

        let age = observation.age_secs(Utc::now().timestamp());
        if age > MAX_ROUND_AGE_SECS {
            issues.push(format!("stale round ({}s old)", age));
        }

        if issues.is_empty() {
            FeedHealth::healthy()
        } else {
            FeedHealth::unhealthy(issues)
        }
    }
}
