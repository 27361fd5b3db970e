//! Rebalance orchestrator - sequences the corrective action
//!
//! Runs a small terminal state machine per cycle:
//! `EVALUATING -> {NO_ACTION | SIMULATING | EXECUTING} -> {DONE | FAILED}`.
//! No state survives into the next cycle. Live dispatch is gated by a fee
//! ceiling; dry-run mode produces the plan without touching the chain.

use ethers::types::U256;
use std::sync::Arc;

use crate::error::{ActionFailureKind, KeeperError};
use crate::telemetry::Telemetry;
use crate::vault::{ActionExecutor, ActionReceipt};

/// Vault price convention: 8-decimal fixed point (BTC/USD style)
const EXIT_PRICE_SCALE: f64 = 1e8;

/// Vault reason code for a range rebalance exit
const EXIT_REASON_REBALANCE: u8 = 3;

/// Steps of the intended corrective sequence
#[derive(Debug, Clone, PartialEq)]
pub enum PlannedStep {
    /// `autoExit(price, Rebalance)`
    Exit { price_fixed_point: U256, reason: u8 },
    /// Compute a new optimized range (external, not yet implemented)
    ComputeNewRange,
    /// `autoReenter(price, tickLower, tickUpper)`
    Reenter,
}

/// Structured description of the intended two-step action sequence
#[derive(Debug, Clone)]
pub struct RebalancePlan {
    pub exit_price: f64,
    pub steps: Vec<PlannedStep>,
}

impl RebalancePlan {
    fn for_price(exit_price: f64) -> Self {
        Self {
            exit_price,
            steps: vec![
                PlannedStep::Exit {
                    price_fixed_point: to_fixed_point(exit_price),
                    reason: EXIT_REASON_REBALANCE,
                },
                PlannedStep::ComputeNewRange,
                PlannedStep::Reenter,
            ],
        }
    }
}

/// Terminal outcome of one orchestrated cycle
#[derive(Debug, Clone)]
pub enum RebalanceOutcome {
    /// Fee rate above the ceiling; deliberate no-op, not a failure
    SkippedFeeCeiling { fee_gwei: f64, ceiling_gwei: f64 },
    /// Dry-run plan produced, nothing dispatched
    Simulated { plan: RebalancePlan },
    /// Exit dispatched and confirmed. Re-entry is not automated, so the
    /// position is left exited with no open range.
    Executed { receipt: ActionReceipt },
    Failed {
        kind: ActionFailureKind,
        message: String,
    },
}

/// Convert a quote price to the vault's fixed-point convention
fn to_fixed_point(price: f64) -> U256 {
    U256::from((price * EXIT_PRICE_SCALE).floor() as u128)
}

/// Sequences exit actions against the vault
pub struct RebalanceOrchestrator {
    executor: Arc<dyn ActionExecutor>,
    telemetry: Arc<dyn Telemetry>,
    dry_run: bool,
    max_fee_gwei: f64,
}

impl RebalanceOrchestrator {
    pub fn new(
        executor: Arc<dyn ActionExecutor>,
        telemetry: Arc<dyn Telemetry>,
        dry_run: bool,
        max_fee_gwei: f64,
    ) -> Self {
        Self {
            executor,
            telemetry,
            dry_run,
            max_fee_gwei,
        }
    }

    /// Run the corrective sequence for an out-of-range position.
    ///
    /// Never retries within the cycle; a later cycle re-evaluates and may
    /// re-attempt if conditions still warrant it.
    pub async fn execute(&self, consensus_price: f64) -> RebalanceOutcome {
        if self.dry_run {
            let plan = RebalancePlan::for_price(consensus_price);
            tracing::warn!(
                exit_price = consensus_price,
                steps = plan.steps.len(),
                "[DRY_RUN] Simulated rebalance, no transactions dispatched"
            );
            return RebalanceOutcome::Simulated { plan };
        }

        let fee_gwei = match self.executor.current_fee_rate_gwei().await {
            Ok(fee) => fee,
            Err(e) => return self.fail(e),
        };

        if fee_gwei > self.max_fee_gwei {
            self.telemetry.rebalance_skipped(fee_gwei, self.max_fee_gwei);
            return RebalanceOutcome::SkippedFeeCeiling {
                fee_gwei,
                ceiling_gwei: self.max_fee_gwei,
            };
        }

        tracing::info!(
            exit_price = consensus_price,
            fee_gwei,
            "Dispatching autoExit"
        );

        let pending = match self
            .executor
            .submit_exit(to_fixed_point(consensus_price), EXIT_REASON_REBALANCE)
            .await
        {
            Ok(pending) => pending,
            Err(e) => return self.fail(e),
        };
        self.telemetry.rebalance_dispatched(&pending.tx_hash);

        match self.executor.await_confirmation(pending).await {
            Ok(receipt) => {
                self.telemetry
                    .rebalance_confirmed(&receipt.tx_hash, receipt.gas_used);
                RebalanceOutcome::Executed { receipt }
            }
            Err(e) => self.fail(e),
        }
    }

    fn fail(&self, error: KeeperError) -> RebalanceOutcome {
        let (kind, message) = match error {
            KeeperError::Action { kind, message } => (kind, message),
            other => (ActionFailureKind::Other, other.to_string()),
        };
        self.telemetry.rebalance_failed(kind, &message);
        RebalanceOutcome::Failed { kind, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::TracingTelemetry;
    use crate::vault::PendingAction;
    use async_trait::async_trait;
    use mockall::mock;
    use mockall::predicate::eq;

    mock! {
        Executor {}

        #[async_trait]
        impl ActionExecutor for Executor {
            async fn current_fee_rate_gwei(&self) -> Result<f64, KeeperError>;
            async fn submit_exit(
                &self,
                price_fixed_point: U256,
                reason: u8,
            ) -> Result<PendingAction, KeeperError>;
            async fn await_confirmation(
                &self,
                pending: PendingAction,
            ) -> Result<ActionReceipt, KeeperError>;
        }
    }

    fn orchestrator(executor: MockExecutor, dry_run: bool) -> RebalanceOrchestrator {
        RebalanceOrchestrator::new(
            Arc::new(executor),
            TracingTelemetry::shared(),
            dry_run,
            50.0,
        )
    }

    #[test]
    fn test_fixed_point_conversion() {
        assert_eq!(to_fixed_point(42_345.5), U256::from(4_234_550_000_000u64));
    }

    #[tokio::test]
    async fn test_dry_run_simulates_without_dispatch() {
        // No expectations set: any executor call would panic
        let executor = MockExecutor::new();
        let outcome = orchestrator(executor, true).execute(50_000.0).await;

        match outcome {
            RebalanceOutcome::Simulated { plan } => {
                assert_eq!(plan.exit_price, 50_000.0);
                assert_eq!(plan.steps.len(), 3);
                assert_eq!(
                    plan.steps[0],
                    PlannedStep::Exit {
                        price_fixed_point: U256::from(5_000_000_000_000u64),
                        reason: 3,
                    }
                );
            }
            other => panic!("expected Simulated, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fee_ceiling_skips_without_dispatch() {
        let mut executor = MockExecutor::new();
        executor
            .expect_current_fee_rate_gwei()
            .times(1)
            .returning(|| Ok(80.0));
        executor.expect_submit_exit().times(0);

        let outcome = orchestrator(executor, false).execute(50_000.0).await;
        assert!(matches!(
            outcome,
            RebalanceOutcome::SkippedFeeCeiling { fee_gwei, .. } if fee_gwei == 80.0
        ));
    }

    #[tokio::test]
    async fn test_live_exit_dispatch_and_confirm() {
        let mut executor = MockExecutor::new();
        executor
            .expect_current_fee_rate_gwei()
            .times(1)
            .returning(|| Ok(12.0));
        executor
            .expect_submit_exit()
            .with(eq(U256::from(5_000_000_000_000u64)), eq(3u8))
            .times(1)
            .returning(|_, _| {
                Ok(PendingAction {
                    tx_hash: "0xabc".to_string(),
                })
            });
        executor
            .expect_await_confirmation()
            .times(1)
            .returning(|pending| {
                Ok(ActionReceipt {
                    tx_hash: pending.tx_hash,
                    gas_used: 120_000,
                })
            });

        let outcome = orchestrator(executor, false).execute(50_000.0).await;
        match outcome {
            RebalanceOutcome::Executed { receipt } => {
                assert_eq!(receipt.tx_hash, "0xabc");
                assert_eq!(receipt.gas_used, 120_000);
            }
            other => panic!("expected Executed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_executor_failure_is_classified_not_retried() {
        let mut executor = MockExecutor::new();
        executor
            .expect_current_fee_rate_gwei()
            .times(1)
            .returning(|| Ok(12.0));
        executor
            .expect_submit_exit()
            .times(1)
            .returning(|_, _| Err(KeeperError::action("caller is not keeper")));
        executor.expect_await_confirmation().times(0);

        let outcome = orchestrator(executor, false).execute(50_000.0).await;
        match outcome {
            RebalanceOutcome::Failed { kind, .. } => {
                assert_eq!(kind, ActionFailureKind::NotAuthorized);
            }
            other => panic!("expected Failed, got {:?}", other),
        }
    }
}
