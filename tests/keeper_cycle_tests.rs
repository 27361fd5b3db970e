//! End-to-end cycle tests over in-memory fakes
//!
//! Exercises the fetch-validate-assess-act pipeline without any network or
//! chain access: fake feeds, a fake vault and a recording telemetry sink.

use async_trait::async_trait;
use ethers::types::{Address, U256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rangekeeper::error::{ActionFailureKind, KeeperError};
use rangekeeper::keeper::{CycleOutcome, KeeperLoop};
use rangekeeper::oracle::sources::{FeedError, FeedHealth, PriceFeed};
use rangekeeper::oracle::ConsensusValidator;
use rangekeeper::rebalance::{RebalanceOrchestrator, RebalanceOutcome};
use rangekeeper::telemetry::Telemetry;
use rangekeeper::types::{
    AttackSignal, PositionRange, PriceObservation, PriceSource, ValidationResult,
};
use rangekeeper::vault::{
    ActionExecutor, ActionReceipt, PendingAction, RangeMonitor, VaultReader,
};

struct FakeFeed {
    source: PriceSource,
    price: f64,
    fail: bool,
}

impl FakeFeed {
    fn pyth(price: f64) -> Arc<Self> {
        Arc::new(Self {
            source: PriceSource::Pyth,
            price,
            fail: false,
        })
    }

    fn chainlink(price: f64) -> Arc<Self> {
        Arc::new(Self {
            source: PriceSource::Chainlink,
            price,
            fail: false,
        })
    }

    fn failing(source: PriceSource) -> Arc<Self> {
        Arc::new(Self {
            source,
            price: 0.0,
            fail: true,
        })
    }
}

#[async_trait]
impl PriceFeed for FakeFeed {
    fn name(&self) -> &'static str {
        self.source.label()
    }

    fn source(&self) -> PriceSource {
        self.source
    }

    async fn fetch_latest(&self) -> Result<PriceObservation, FeedError> {
        if self.fail {
            return Err(FeedError::Unavailable {
                feed: self.source.label(),
                detail: "fake outage".to_string(),
            });
        }
        Ok(PriceObservation::new(self.price, self.source, 1_700_000_000))
    }

    async fn health_check(&self) -> FeedHealth {
        FeedHealth::healthy()
    }
}

struct FakeVault {
    position_id: u64,
    range: PositionRange,
}

#[async_trait]
impl VaultReader for FakeVault {
    async fn active_position_id(&self) -> Result<u64, KeeperError> {
        Ok(self.position_id)
    }

    async fn range(&self) -> Result<PositionRange, KeeperError> {
        Ok(self.range)
    }

    async fn pool_ref(&self) -> Result<Address, KeeperError> {
        Ok("0x0000000000000000000000000000000000000001"
            .parse()
            .unwrap())
    }

    async fn keeper_authority(&self) -> Result<Address, KeeperError> {
        Ok(Address::zero())
    }

    async fn pool_tick(&self) -> Result<Option<i32>, KeeperError> {
        Ok(None)
    }
}

#[derive(Default)]
struct FakeExecutor {
    fee_gwei: f64,
    submits: AtomicU64,
    fail_submit: bool,
}

impl FakeExecutor {
    fn with_fee(fee_gwei: f64) -> Arc<Self> {
        Arc::new(Self {
            fee_gwei,
            ..Default::default()
        })
    }
}

#[async_trait]
impl ActionExecutor for FakeExecutor {
    async fn current_fee_rate_gwei(&self) -> Result<f64, KeeperError> {
        Ok(self.fee_gwei)
    }

    async fn submit_exit(
        &self,
        _price_fixed_point: U256,
        _reason: u8,
    ) -> Result<PendingAction, KeeperError> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        if self.fail_submit {
            return Err(KeeperError::action("execution reverted: caller is not keeper"));
        }
        Ok(PendingAction {
            tx_hash: "0xfake".to_string(),
        })
    }

    async fn await_confirmation(
        &self,
        pending: PendingAction,
    ) -> Result<ActionReceipt, KeeperError> {
        Ok(ActionReceipt {
            tx_hash: pending.tx_hash,
            gas_used: 100_000,
        })
    }
}

#[derive(Default)]
struct RecordingTelemetry {
    events: Mutex<Vec<String>>,
}

impl RecordingTelemetry {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }
}

impl Telemetry for RecordingTelemetry {
    fn validation_rejected(&self, _result: &ValidationResult, _max_deviation_bps: u32) {
        self.record("validation_rejected");
    }

    fn attack_signal(&self, signal: &AttackSignal) {
        self.record(format!("attack_signal:{}", signal.kind()));
    }

    fn rebalance_skipped(&self, _fee_gwei: f64, _ceiling_gwei: f64) {
        self.record("rebalance_skipped");
    }

    fn rebalance_dispatched(&self, _tx_hash: &str) {
        self.record("rebalance_dispatched");
    }

    fn rebalance_confirmed(&self, _tx_hash: &str, _gas_used: u64) {
        self.record("rebalance_confirmed");
    }

    fn rebalance_failed(&self, _kind: ActionFailureKind, _message: &str) {
        self.record("rebalance_failed");
    }
}

// Around $50k with the 1e12 scale the pool tick sits near -168100
const OUT_OF_RANGE: PositionRange = PositionRange {
    lower_tick: -100,
    upper_tick: 100,
};
const IN_RANGE: PositionRange = PositionRange {
    lower_tick: -200_000,
    upper_tick: -100_000,
};

fn keeper(
    feed_a: Arc<FakeFeed>,
    feed_b: Arc<FakeFeed>,
    range: PositionRange,
    executor: Arc<FakeExecutor>,
    telemetry: Arc<RecordingTelemetry>,
    dry_run: bool,
) -> KeeperLoop {
    let reader = Arc::new(FakeVault {
        position_id: 1,
        range,
    });
    let validator = ConsensusValidator::new(500);
    let monitor = RangeMonitor::new(reader.clone(), 1e12);
    let orchestrator = RebalanceOrchestrator::new(executor, telemetry.clone(), dry_run, 50.0);

    KeeperLoop::new(
        feed_a,
        feed_b,
        validator,
        monitor,
        orchestrator,
        reader,
        telemetry,
        Address::zero(),
        Duration::from_secs(60),
    )
}

#[tokio::test]
async fn agreeing_oracles_out_of_range_triggers_exit() {
    let executor = FakeExecutor::with_fee(10.0);
    let telemetry = Arc::new(RecordingTelemetry::default());
    let mut keeper = keeper(
        FakeFeed::pyth(50_000.0),
        FakeFeed::chainlink(50_100.0),
        OUT_OF_RANGE,
        executor.clone(),
        telemetry.clone(),
        false,
    );

    let outcome = keeper.run_cycle().await.unwrap();
    match outcome {
        CycleOutcome::Rebalanced(RebalanceOutcome::Executed { receipt }) => {
            assert_eq!(receipt.tx_hash, "0xfake");
        }
        other => panic!("expected executed rebalance, got {:?}", other),
    }

    assert_eq!(executor.submits.load(Ordering::SeqCst), 1);
    assert_eq!(keeper.stats().rebalances_executed, 1);
    assert_eq!(keeper.stats().errors_observed, 0);
    assert!(keeper.stats().last_rebalance_at.is_some());
    assert_eq!(
        telemetry.events(),
        vec!["rebalance_dispatched", "rebalance_confirmed"]
    );
}

#[tokio::test]
async fn diverging_oracles_block_the_rebalance() {
    let executor = FakeExecutor::with_fee(10.0);
    let telemetry = Arc::new(RecordingTelemetry::default());
    let mut keeper = keeper(
        FakeFeed::pyth(50_000.0),
        FakeFeed::chainlink(53_000.0),
        OUT_OF_RANGE,
        executor.clone(),
        telemetry.clone(),
        false,
    );

    let outcome = keeper.run_cycle().await.unwrap();
    assert!(matches!(outcome, CycleOutcome::ValidationRejected { .. }));
    assert_eq!(executor.submits.load(Ordering::SeqCst), 0);
    assert_eq!(keeper.stats().rebalances_executed, 0);
    assert_eq!(keeper.stats().errors_observed, 1);
    assert_eq!(telemetry.events(), vec!["validation_rejected"]);
}

#[tokio::test]
async fn in_range_position_is_left_alone() {
    let executor = FakeExecutor::with_fee(10.0);
    let telemetry = Arc::new(RecordingTelemetry::default());
    let mut keeper = keeper(
        FakeFeed::pyth(50_000.0),
        FakeFeed::chainlink(50_100.0),
        IN_RANGE,
        executor.clone(),
        telemetry.clone(),
        false,
    );

    let outcome = keeper.run_cycle().await.unwrap();
    assert!(matches!(outcome, CycleOutcome::InRange));
    assert_eq!(executor.submits.load(Ordering::SeqCst), 0);
    assert!(telemetry.events().is_empty());
}

#[tokio::test]
async fn fee_ceiling_defers_the_rebalance() {
    let executor = FakeExecutor::with_fee(80.0);
    let telemetry = Arc::new(RecordingTelemetry::default());
    let mut keeper = keeper(
        FakeFeed::pyth(50_000.0),
        FakeFeed::chainlink(50_100.0),
        OUT_OF_RANGE,
        executor.clone(),
        telemetry.clone(),
        false,
    );

    let outcome = keeper.run_cycle().await.unwrap();
    assert!(matches!(
        outcome,
        CycleOutcome::Rebalanced(RebalanceOutcome::SkippedFeeCeiling { .. })
    ));
    assert_eq!(executor.submits.load(Ordering::SeqCst), 0);
    assert_eq!(keeper.stats().rebalances_executed, 0);
    assert_eq!(telemetry.events(), vec!["rebalance_skipped"]);
}

#[tokio::test]
async fn dry_run_simulates_instead_of_dispatching() {
    let executor = FakeExecutor::with_fee(10.0);
    let telemetry = Arc::new(RecordingTelemetry::default());
    let mut keeper = keeper(
        FakeFeed::pyth(50_000.0),
        FakeFeed::chainlink(50_100.0),
        OUT_OF_RANGE,
        executor.clone(),
        telemetry.clone(),
        true,
    );

    let outcome = keeper.run_cycle().await.unwrap();
    assert!(matches!(
        outcome,
        CycleOutcome::Rebalanced(RebalanceOutcome::Simulated { .. })
    ));
    assert_eq!(executor.submits.load(Ordering::SeqCst), 0);
    // Simulated runs still count as rebalances for the summary
    assert_eq!(keeper.stats().rebalances_executed, 1);
}

#[tokio::test]
async fn feed_outage_is_data_unavailable_and_cycle_recovers() {
    let executor = FakeExecutor::with_fee(10.0);
    let telemetry = Arc::new(RecordingTelemetry::default());
    let mut keeper = keeper(
        FakeFeed::failing(PriceSource::Pyth),
        FakeFeed::chainlink(50_100.0),
        OUT_OF_RANGE,
        executor.clone(),
        telemetry.clone(),
        false,
    );

    let err = keeper.run_cycle().await.unwrap_err();
    assert!(matches!(err, KeeperError::DataUnavailable(_)));
    assert_eq!(executor.submits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_exit_is_classified_and_counted() {
    let executor = Arc::new(FakeExecutor {
        fee_gwei: 10.0,
        submits: AtomicU64::new(0),
        fail_submit: true,
    });
    let telemetry = Arc::new(RecordingTelemetry::default());
    let mut keeper = keeper(
        FakeFeed::pyth(50_000.0),
        FakeFeed::chainlink(50_100.0),
        OUT_OF_RANGE,
        executor.clone(),
        telemetry.clone(),
        false,
    );

    let outcome = keeper.run_cycle().await.unwrap();
    match outcome {
        CycleOutcome::Rebalanced(RebalanceOutcome::Failed { kind, .. }) => {
            assert_eq!(kind, ActionFailureKind::NotAuthorized);
        }
        other => panic!("expected failed rebalance, got {:?}", other),
    }
    assert_eq!(keeper.stats().errors_observed, 1);
    assert_eq!(telemetry.events(), vec!["rebalance_failed"]);
}

#[tokio::test]
async fn repeated_cycles_are_independent() {
    let executor = FakeExecutor::with_fee(10.0);
    let telemetry = Arc::new(RecordingTelemetry::default());
    let mut keeper = keeper(
        FakeFeed::pyth(50_000.0),
        FakeFeed::chainlink(50_100.0),
        OUT_OF_RANGE,
        executor.clone(),
        telemetry.clone(),
        false,
    );

    keeper.run_cycle().await.unwrap();
    keeper.run_cycle().await.unwrap();

    assert_eq!(keeper.stats().checks_performed, 2);
    assert_eq!(keeper.stats().rebalances_executed, 2);
    assert_eq!(executor.submits.load(Ordering::SeqCst), 2);
}
