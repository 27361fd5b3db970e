//! Pyth price feed via the Hermes HTTP API (off-chain, no gas cost)
//!
//! Docs: https://docs.pyth.network/price-feeds

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::time::Duration;

use crate::oracle::sources::{FeedError, FeedHealth, PriceFeed};
use crate::types::{PriceObservation, PriceSource};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
/// Observations older than this are flagged in health checks
const MAX_PRICE_AGE_SECS: i64 = 60;
/// Confidence intervals above this fraction of price are suspicious
const MAX_CONFIDENCE_FRACTION: f64 = 0.05;

#[derive(Debug, Deserialize)]
struct HermesPriceFeed {
    price: HermesPrice,
}

#[derive(Debug, Deserialize)]
struct HermesPrice {
    price: String,
    conf: String,
    expo: i32,
    publish_time: i64,
}

/// Off-chain Pyth client
#[derive(Debug, Clone)]
pub struct PythFeed {
    client: reqwest::Client,
    hermes_url: String,
    price_id: String,
}

impl PythFeed {
    pub fn new(hermes_url: &str, price_id: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client for Pyth")?;

        Ok(Self {
            client,
            hermes_url: hermes_url.trim_end_matches('/').to_string(),
            price_id: price_id.to_string(),
        })
    }

    fn bad_response(detail: impl Into<String>) -> FeedError {
        FeedError::BadResponse {
            feed: "Pyth",
            detail: detail.into(),
        }
    }

    fn parse_feed(feed: &HermesPriceFeed) -> Result<PriceObservation, FeedError> {
        let scale = 10f64.powi(feed.price.expo);
        let price: f64 = feed
            .price
            .price
            .parse::<f64>()
            .map_err(|e| Self::bad_response(format!("unparseable price: {}", e)))?
            * scale;
        let confidence: f64 = feed
            .price
            .conf
            .parse::<f64>()
            .map_err(|e| Self::bad_response(format!("unparseable confidence: {}", e)))?
            * scale;

        if price <= 0.0 {
            return Err(Self::bad_response(format!("non-positive price {}", price)));
        }

        if confidence > price * MAX_CONFIDENCE_FRACTION {
            tracing::warn!(
                price,
                confidence,
                "Pyth confidence interval above 5% of price"
            );
        }

        Ok(
            PriceObservation::new(price, PriceSource::Pyth, feed.price.publish_time)
                .with_confidence(confidence),
        )
    }
}

#[async_trait]
impl PriceFeed for PythFeed {
    fn name(&self) -> &'static str {
        "Pyth"
    }

    fn source(&self) -> PriceSource {
        PriceSource::Pyth
    }

    async fn fetch_latest(&self) -> Result<PriceObservation, FeedError> {
        let url = format!(
            "{}/api/latest_price_feeds?ids[]={}",
            self.hermes_url, self.price_id
        );

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                FeedError::Timeout { feed: "Pyth" }
            } else {
                FeedError::Unavailable {
                    feed: "Pyth",
                    detail: e.to_string(),
                }
            }
        })?;

        if !response.status().is_success() {
            return Err(Self::bad_response(format!("HTTP {}", response.status())));
        }

        let feeds: Vec<HermesPriceFeed> = response
            .json()
            .await
            .map_err(|e| Self::bad_response(e.to_string()))?;

        let feed = feeds
            .first()
            .ok_or_else(|| Self::bad_response("empty price feed array"))?;

        Self::parse_feed(feed)
    }

    async fn health_check(&self) -> FeedHealth {
        let observation = match self.fetch_latest().await {
            Ok(o) => o,
            Err(e) => return FeedHealth::unhealthy(vec![e.to_string()]),
        };

        let mut issues = Vec::new();

        let age = observation.age_secs(Utc::now().timestamp());
        if age > MAX_PRICE_AGE_SECS {
            issues.push(format!("stale data ({}s old)", age));
        }

        if let Some(confidence) = observation.confidence_interval {
            let fraction = confidence / observation.price;
            if fraction > MAX_CONFIDENCE_FRACTION {
                issues.push(format!("high confidence interval ({:.2}%)", fraction * 100.0));
            }
        }

        if issues.is_empty() {
            FeedHealth::healthy()
        } else {
            FeedHealth::unhealthy(issues)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(price: &str, conf: &str, expo: i32, publish_time: i64) -> HermesPriceFeed {
        HermesPriceFeed {
            price: HermesPrice {
                price: price.to_string(),
                conf: conf.to_string(),
                expo,
                publish_time,
            },
        }
    }

    #[test]
    fn test_parse_feed_applies_exponent() {
        // 4234550000000 * 10^-8 = 42345.50
        let observation =
            PythFeed::parse_feed(&feed("4234550000000", "100000000", -8, 1_700_000_000)).unwrap();
        assert!((observation.price - 42_345.5).abs() < 1e-6);
        assert_eq!(observation.confidence_interval, Some(1.0));
        assert_eq!(observation.source, PriceSource::Pyth);
        assert_eq!(observation.timestamp, 1_700_000_000);
    }

    #[test]
    fn test_parse_feed_rejects_non_positive_price() {
        let err = PythFeed::parse_feed(&feed("0", "1", -8, 1_700_000_000)).unwrap_err();
        assert!(matches!(err, FeedError::BadResponse { .. }));
    }

    #[test]
    fn test_parse_feed_rejects_garbage() {
        let err = PythFeed::parse_feed(&feed("not-a-number", "1", -8, 0)).unwrap_err();
        assert!(matches!(err, FeedError::BadResponse { .. }));
    }
}
