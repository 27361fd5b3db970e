//! Dual-oracle consensus validator
//!
//! Pure functions over price observations: pairwise deviation checks,
//! multi-source consensus, weighted averaging, confidence scoring and
//! manipulation-pattern detection. No I/O, no state beyond the configured
//! deviation threshold.

use crate::error::KeeperError;
use crate::types::{
    AttackSignal, ConsensusOutcome, PriceObservation, ValidationResult, WeightedPrice,
};

/// Spot divergence (bps) above which agreeing oracles implicate the spot venue
const FLASH_LOAN_SPOT_DEVIATION_BPS: f64 = 1000.0;

/// Ordered confidence buckets: (max std-dev as % of mean, score).
///
/// A coarse, discrete classifier by policy - callers must not treat the
/// score as a continuous probability.
const CONFIDENCE_BUCKETS: [(f64, u8); 4] = [(1.0, 100), (2.0, 90), (5.0, 75), (10.0, 50)];

/// Score assigned when dispersion exceeds every bucket
const CONFIDENCE_FLOOR: u8 = 25;

/// Validates consistency between independently sourced prices
#[derive(Debug, Clone)]
pub struct ConsensusValidator {
    max_deviation_bps: u32,
}

impl ConsensusValidator {
    pub fn new(max_deviation_bps: u32) -> Self {
        Self { max_deviation_bps }
    }

    pub fn max_deviation_bps(&self) -> u32 {
        self.max_deviation_bps
    }

    /// Validate consistency between two prices.
    ///
    /// Deviation is measured in basis points relative to the *smaller* of the
    /// two prices, which flags divergence more readily than an average-based
    /// denominator would. Non-positive or non-finite inputs yield a safety
    /// rejection (insufficient data), not an error.
    pub fn validate_pair(
        &self,
        price_a: f64,
        price_b: f64,
        label_a: &str,
        label_b: &str,
    ) -> ValidationResult {
        if !price_a.is_finite() || !price_b.is_finite() || price_a <= 0.0 || price_b <= 0.0 {
            return ValidationResult {
                is_valid: false,
                deviation_bps: 0.0,
                message: format!("{} vs {}: invalid price input", label_a, label_b),
            };
        }

        let deviation_bps = (price_a - price_b).abs() * 10_000.0 / price_a.min(price_b);
        let is_valid = deviation_bps < self.max_deviation_bps as f64;

        let message = if is_valid {
            format!("{} vs {}: consistent", label_a, label_b)
        } else {
            format!(
                "{} vs {}: diverging {:.2}%",
                label_a,
                label_b,
                deviation_bps / 100.0
            )
        };

        ValidationResult {
            is_valid,
            deviation_bps,
            message,
        }
    }

    /// Validate every unordered pair among two or more observations.
    ///
    /// A single outlier invalidates the whole set: `all_pairs_valid` is the
    /// AND across all pairs. The consensus price is the median of the sorted
    /// prices at index `len / 2`; for even counts that is the upper-middle
    /// element (no averaging, so the value is always one of the inputs).
    pub fn validate_all(
        &self,
        observations: &[PriceObservation],
    ) -> Result<ConsensusOutcome, KeeperError> {
        if observations.len() < 2 {
            return Err(KeeperError::Input(format!(
                "validate_all requires at least 2 observations, got {}",
                observations.len()
            )));
        }

        let mut pair_results = Vec::new();
        let mut all_pairs_valid = true;

        for i in 0..observations.len() - 1 {
            for j in i + 1..observations.len() {
                let result = self.validate_pair(
                    observations[i].price,
                    observations[j].price,
                    observations[i].source.label(),
                    observations[j].source.label(),
                );
                if !result.is_valid {
                    all_pairs_valid = false;
                }
                pair_results.push(result);
            }
        }

        let mut sorted: Vec<f64> = observations.iter().map(|o| o.price).collect();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let consensus_price = sorted[sorted.len() / 2];

        let entries: Vec<WeightedPrice> = observations
            .iter()
            .map(|o| WeightedPrice::new(o.price))
            .collect();
        let weighted_average_price = self.weighted_average(&entries)?;
        let confidence_score = self.confidence_score(observations)?;

        Ok(ConsensusOutcome {
            all_pairs_valid,
            pair_results,
            consensus_price,
            weighted_average_price,
            confidence_score,
        })
    }

    /// Weight-normalized mean: `sum(price * weight) / sum(weight)`.
    ///
    /// Weights default to 1.0 and are not required to sum to anything.
    pub fn weighted_average(&self, entries: &[WeightedPrice]) -> Result<f64, KeeperError> {
        if entries.is_empty() {
            return Err(KeeperError::Input(
                "weighted_average requires at least one entry".to_string(),
            ));
        }

        let total_weight: f64 = entries.iter().map(|e| e.weight.unwrap_or(1.0)).sum();
        let weighted_sum: f64 = entries
            .iter()
            .map(|e| e.price * e.weight.unwrap_or(1.0))
            .sum();

        Ok(weighted_sum / total_weight)
    }

    /// Discrete confidence score from the dispersion of the input prices.
    ///
    /// Population standard deviation as a percentage of the mean, mapped
    /// through [`CONFIDENCE_BUCKETS`].
    pub fn confidence_score(&self, observations: &[PriceObservation]) -> Result<u8, KeeperError> {
        if observations.len() < 2 {
            return Err(KeeperError::Input(format!(
                "confidence_score requires at least 2 observations, got {}",
                observations.len()
            )));
        }

        let n = observations.len() as f64;
        let mean = observations.iter().map(|o| o.price).sum::<f64>() / n;
        let variance = observations
            .iter()
            .map(|o| (o.price - mean).powi(2))
            .sum::<f64>()
            / n;
        let dispersion_pct = variance.sqrt() / mean * 100.0;

        for (max_pct, score) in CONFIDENCE_BUCKETS {
            if dispersion_pct < max_pct {
                return Ok(score);
            }
        }
        Ok(CONFIDENCE_FLOOR)
    }

    /// Detect patterns consistent with price manipulation.
    ///
    /// The two oracle prices are compared to each other first; flash loan
    /// detection only applies when they are mutually consistent. Agreement
    /// between independent oracles plus a large spot divergence implicates
    /// the spot venue, since two independent oracle networks cannot be
    /// manipulated simultaneously on the cheap.
    pub fn detect_attack(&self, oracle_a: f64, oracle_b: f64, reference: f64) -> AttackSignal {
        let pair = self.validate_pair(oracle_a, oracle_b, "OracleA", "OracleB");

        let ref_vs_a = (reference - oracle_a).abs() * 10_000.0 / oracle_a;
        let ref_vs_b = (reference - oracle_b).abs() * 10_000.0 / oracle_b;

        if pair.is_valid
            && ref_vs_a >= FLASH_LOAN_SPOT_DEVIATION_BPS
            && ref_vs_b >= FLASH_LOAN_SPOT_DEVIATION_BPS
        {
            return AttackSignal::FlashLoanAttack {
                oracle_a,
                oracle_b,
                spot: reference,
                spot_deviation_bps: ref_vs_a,
            };
        }

        if !pair.is_valid {
            return AttackSignal::OracleManipulation {
                oracle_a,
                oracle_b,
                deviation_bps: pair.deviation_bps,
            };
        }

        AttackSignal::None
    }
}
