//! Core types used throughout RangeKeeper
//!
//! Defines the value objects shared by the oracle, vault and rebalance layers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifying label for a price source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PriceSource {
    /// Pyth Hermes API (off-chain)
    Pyth,
    /// Chainlink aggregator (on-chain)
    Chainlink,
}

impl PriceSource {
    pub fn label(&self) -> &'static str {
        match self {
            PriceSource::Pyth => "Pyth",
            PriceSource::Chainlink => "Chainlink",
        }
    }
}

impl fmt::Display for PriceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A single price reading from one source
///
/// Produced fresh on every fetch and discarded at the end of the cycle;
/// never mutated after construction.
#[derive(Debug, Clone)]
pub struct PriceObservation {
    /// Price in quote-currency units (strictly positive)
    pub price: f64,
    /// Which oracle produced this value
    pub source: PriceSource,
    /// Seconds since epoch at which the source considers the value authoritative
    pub timestamp: i64,
    /// Source-reported uncertainty, when available
    pub confidence_interval: Option<f64>,
}

impl PriceObservation {
    pub fn new(price: f64, source: PriceSource, timestamp: i64) -> Self {
        Self {
            price,
            source,
            timestamp,
            confidence_interval: None,
        }
    }

    pub fn with_confidence(mut self, interval: f64) -> Self {
        self.confidence_interval = Some(interval);
        self
    }

    /// Age of this observation relative to `now` (seconds since epoch)
    pub fn age_secs(&self, now: i64) -> i64 {
        now - self.timestamp
    }
}

/// Outcome of a pairwise price comparison
///
/// Invariant: `is_valid == deviation_bps < max_deviation_bps` for the
/// threshold the validator was built with. An invalid-input rejection
/// carries zero deviation and `is_valid = false`.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub is_valid: bool,
    /// Deviation in basis points, relative to the smaller of the two prices
    pub deviation_bps: f64,
    pub message: String,
}

impl ValidationResult {
    pub fn deviation_percent(&self) -> f64 {
        self.deviation_bps / 100.0
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (dev: {:.2}%)", self.message, self.deviation_percent())
    }
}

/// A price with an optional averaging weight (defaults to 1.0)
#[derive(Debug, Clone, Copy)]
pub struct WeightedPrice {
    pub price: f64,
    pub weight: Option<f64>,
}

impl WeightedPrice {
    pub fn new(price: f64) -> Self {
        Self {
            price,
            weight: None,
        }
    }

    pub fn with_weight(price: f64, weight: f64) -> Self {
        Self {
            price,
            weight: Some(weight),
        }
    }
}

/// Aggregate verdict over N observations for one cycle
///
/// Built fresh each cycle, never persisted.
#[derive(Debug, Clone)]
pub struct ConsensusOutcome {
    /// Logical AND over every unordered pair's validation
    pub all_pairs_valid: bool,
    /// Individual pair results, in enumeration order
    pub pair_results: Vec<ValidationResult>,
    /// Median of the input prices
    pub consensus_price: f64,
    /// Weight-normalized mean of the input prices
    pub weighted_average_price: f64,
    /// Discrete confidence bucket (25, 50, 75, 90 or 100)
    pub confidence_score: u8,
}

/// Advisory manipulation-pattern signal
///
/// Produced each cycle when a spot reference is available, but deliberately
/// not wired into the rebalance gate: visibility first, enforcement later.
#[derive(Debug, Clone, PartialEq)]
pub enum AttackSignal {
    None,
    /// Oracles agree with each other but both diverge hard from the spot
    /// venue, implicating the venue rather than the oracles.
    FlashLoanAttack {
        oracle_a: f64,
        oracle_b: f64,
        spot: f64,
        spot_deviation_bps: f64,
    },
    /// The two independent oracle sources disagree with each other.
    OracleManipulation {
        oracle_a: f64,
        oracle_b: f64,
        deviation_bps: f64,
    },
}

impl AttackSignal {
    pub fn detected(&self) -> bool {
        !matches!(self, AttackSignal::None)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AttackSignal::None => "NONE",
            AttackSignal::FlashLoanAttack { .. } => "FLASH_LOAN_ATTACK",
            AttackSignal::OracleManipulation { .. } => "ORACLE_MANIPULATION",
        }
    }
}

impl fmt::Display for AttackSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind())
    }
}

/// Tick range of the managed position, read fresh from the vault each cycle
///
/// Staleness here would directly risk a wrong rebalance decision, so this is
/// never cached across cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionRange {
    pub lower_tick: i32,
    pub upper_tick: i32,
}

impl PositionRange {
    pub fn new(lower_tick: i32, upper_tick: i32) -> Self {
        debug_assert!(lower_tick < upper_tick);
        Self {
            lower_tick,
            upper_tick,
        }
    }

    pub fn width(&self) -> i32 {
        self.upper_tick - self.lower_tick
    }
}

impl fmt::Display for PositionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.lower_tick, self.upper_tick)
    }
}
