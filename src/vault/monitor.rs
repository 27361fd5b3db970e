//! Position range monitor - price-to-tick conversion and containment
//!
//! Converts a validated consensus price into the pool's tick coordinate and
//! decides whether the managed position is still inside its range. The tick
//! conversion is an approximation of the pool's own pricing math; it is good
//! enough for the in/out-of-range decision and nothing else.

use ethers::types::Address;
use std::fmt;
use std::sync::Arc;

use crate::error::KeeperError;
use crate::types::PositionRange;
use crate::vault::VaultReader;

/// Tick base of the pool coordinate system (each tick is a 0.01% price step)
const TICK_BASE: f64 = 1.0001;

/// Per-cycle verdict on the managed position
///
/// "No active position" and "pool not configured" are distinct from
/// "in range" and must stay distinguishable in telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeAssessment {
    /// Vault reports no open position; nothing to rebalance
    NoActivePosition,
    /// Vault has no pool bound; nothing to evaluate against
    PoolNotConfigured,
    InRange {
        current_tick: i32,
        range: PositionRange,
    },
    OutOfRange {
        current_tick: i32,
        range: PositionRange,
        distance_ticks: i32,
    },
}

impl RangeAssessment {
    pub fn needs_rebalance(&self) -> bool {
        matches!(self, RangeAssessment::OutOfRange { .. })
    }
}

impl fmt::Display for RangeAssessment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeAssessment::NoActivePosition => write!(f, "NO_ACTIVE_POSITION"),
            RangeAssessment::PoolNotConfigured => write!(f, "POOL_NOT_CONFIGURED"),
            RangeAssessment::InRange { current_tick, range } => {
                write!(f, "IN_RANGE (tick {} in {})", current_tick, range)
            }
            RangeAssessment::OutOfRange {
                current_tick,
                range,
                distance_ticks,
            } => write!(
                f,
                "OUT_OF_RANGE (tick {} vs {}, distance {} ticks)",
                current_tick, range, distance_ticks
            ),
        }
    }
}

/// Monitors the position range against the consensus price
pub struct RangeMonitor {
    reader: Arc<dyn VaultReader>,
    /// Normalizes for the pair's decimal difference (1e12 for BTC/USDC)
    scale_factor: f64,
}

impl RangeMonitor {
    pub fn new(reader: Arc<dyn VaultReader>, scale_factor: f64) -> Self {
        Self {
            reader,
            scale_factor,
        }
    }

    /// Approximate tick for a quote price: `floor(ln(price / scale) / ln(1.0001))`.
    ///
    /// Monotonic in price for a fixed scale factor. Off by a few ticks from
    /// the pool's exact math, which the containment decision tolerates.
    pub fn price_to_tick(&self, price: f64) -> i32 {
        ((price / self.scale_factor).ln() / TICK_BASE.ln()).floor() as i32
    }

    /// Inverse mapping, used to express the pool's own tick as a spot price
    pub fn tick_to_price(&self, tick: i32) -> f64 {
        self.scale_factor * TICK_BASE.powi(tick)
    }

    /// Closed-interval containment: boundary ticks count as in-range.
    pub fn contain(current_tick: i32, range: PositionRange) -> RangeAssessment {
        if current_tick < range.lower_tick {
            RangeAssessment::OutOfRange {
                current_tick,
                range,
                distance_ticks: range.lower_tick - current_tick,
            }
        } else if current_tick > range.upper_tick {
            RangeAssessment::OutOfRange {
                current_tick,
                range,
                distance_ticks: current_tick - range.upper_tick,
            }
        } else {
            RangeAssessment::InRange {
                current_tick,
                range,
            }
        }
    }

    /// Full per-cycle assessment against freshly read vault state.
    pub async fn assess(&self, price: f64) -> Result<RangeAssessment, KeeperError> {
        let position_id = self.reader.active_position_id().await?;
        if position_id == 0 {
            return Ok(RangeAssessment::NoActivePosition);
        }

        let pool = self.reader.pool_ref().await?;
        if pool == Address::zero() {
            return Ok(RangeAssessment::PoolNotConfigured);
        }

        let range = self.reader.range().await?;
        let current_tick = self.price_to_tick(price);

        tracing::info!(
            current_tick,
            range = %range,
            "Position state read from vault"
        );

        Ok(Self::contain(current_tick, range))
    }
}
