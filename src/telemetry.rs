//! Telemetry sink for decision-point events
//!
//! The core calls this sink at well-defined decision points (validation
//! rejected, attack signal raised, rebalance skipped / dispatched / confirmed
//! / failed) and owns no formatting concerns. The sink is constructed once
//! and injected into each component instead of living in process-wide state.

use std::sync::Arc;

use crate::error::ActionFailureKind;
use crate::types::{AttackSignal, ValidationResult};

/// Decision-point event sink
pub trait Telemetry: Send + Sync {
    /// Cross-validation failed; the cycle will skip rebalancing for safety.
    fn validation_rejected(&self, result: &ValidationResult, max_deviation_bps: u32);

    /// Advisory manipulation-pattern signal (not wired into the gate).
    fn attack_signal(&self, signal: &AttackSignal);

    /// Rebalance needed but skipped because the fee rate exceeds the ceiling.
    fn rebalance_skipped(&self, fee_gwei: f64, ceiling_gwei: f64);

    /// Exit transaction submitted, awaiting confirmation.
    fn rebalance_dispatched(&self, tx_hash: &str);

    /// Exit confirmed. The position is now exited with no open range until
    /// re-entry logic exists, which is an alertable condition in itself.
    fn rebalance_confirmed(&self, tx_hash: &str, gas_used: u64);

    /// Dispatched action failed.
    fn rebalance_failed(&self, kind: ActionFailureKind, message: &str);
}

/// Production sink backed by `tracing`
#[derive(Debug, Default)]
pub struct TracingTelemetry;

impl TracingTelemetry {
    pub fn shared() -> Arc<dyn Telemetry> {
        Arc::new(Self)
    }
}

impl Telemetry for TracingTelemetry {
    fn validation_rejected(&self, result: &ValidationResult, max_deviation_bps: u32) {
        tracing::error!(
            deviation_bps = result.deviation_bps,
            max_deviation_bps,
            message = %result.message,
            "Oracle cross-validation rejected, skipping rebalance for safety"
        );
    }

    fn attack_signal(&self, signal: &AttackSignal) {
        match signal {
            AttackSignal::None => {}
            AttackSignal::FlashLoanAttack {
                oracle_a,
                oracle_b,
                spot,
                spot_deviation_bps,
            } => {
                tracing::error!(
                    oracle_a,
                    oracle_b,
                    spot,
                    spot_deviation_bps,
                    "Possible flash loan attack: oracles agree but spot venue diverges hard"
                );
            }
            AttackSignal::OracleManipulation {
                oracle_a,
                oracle_b,
                deviation_bps,
            } => {
                tracing::error!(
                    oracle_a,
                    oracle_b,
                    deviation_bps,
                    "Oracles diverging from each other: possible manipulation or feed failure"
                );
            }
        }
    }

    fn rebalance_skipped(&self, fee_gwei: f64, ceiling_gwei: f64) {
        tracing::warn!(
            fee_gwei,
            ceiling_gwei,
            "Fee rate above ceiling, skipping rebalance this cycle"
        );
    }

    fn rebalance_dispatched(&self, tx_hash: &str) {
        tracing::info!(tx_hash, "Exit transaction sent, awaiting confirmation");
    }

    fn rebalance_confirmed(&self, tx_hash: &str, gas_used: u64) {
        tracing::info!(tx_hash, gas_used, "Exit confirmed");
        tracing::warn!(
            tx_hash,
            "Position exited with no open range; re-entry is not automated yet"
        );
    }

    fn rebalance_failed(&self, kind: ActionFailureKind, message: &str) {
        tracing::error!(%kind, message, "Rebalance action failed");
    }
}
