//! Keeper loop: periodic fetch-validate-assess-act cycles
//!
//! One logical flow repeated on a fixed schedule. Each cycle is independent:
//! a failed cycle logs, counts, and waits for the next tick. Only process
//! startup failures (bad config, unreachable chain) abort the loop.

use chrono::{DateTime, Utc};
use ethers::types::Address;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;

use crate::error::KeeperError;
use crate::oracle::sources::PriceFeed;
use crate::oracle::ConsensusValidator;
use crate::rebalance::{RebalanceOrchestrator, RebalanceOutcome};
use crate::telemetry::Telemetry;
use crate::types::{PriceObservation, WeightedPrice};
use crate::vault::{RangeAssessment, RangeMonitor, VaultReader};

/// Monotonic counters over the loop's lifetime, reported at shutdown
#[derive(Debug, Default, Clone)]
pub struct CycleStats {
    pub checks_performed: u64,
    pub rebalances_executed: u64,
    pub errors_observed: u64,
    /// Cycles whose work exceeded the check interval (ticks skipped, not queued)
    pub cycles_overrun: u64,
    pub last_check_at: Option<DateTime<Utc>>,
    pub last_rebalance_at: Option<DateTime<Utc>>,
}

impl CycleStats {
    pub fn report(&self) {
        tracing::info!(
            checks_performed = self.checks_performed,
            rebalances_executed = self.rebalances_executed,
            errors_observed = self.errors_observed,
            cycles_overrun = self.cycles_overrun,
            last_check_at = self.last_check_at.map(|t| t.to_rfc3339()),
            last_rebalance_at = self.last_rebalance_at.map(|t| t.to_rfc3339()),
            "Keeper run summary"
        );
    }
}

/// What a single cycle concluded
#[derive(Debug)]
pub enum CycleOutcome {
    /// Oracles disagreed; rebalancing skipped for safety
    ValidationRejected { deviation_bps: f64 },
    NoActivePosition,
    PoolNotConfigured,
    InRange,
    Rebalanced(RebalanceOutcome),
}

/// The periodic decision loop
pub struct KeeperLoop {
    feed_a: Arc<dyn PriceFeed>,
    feed_b: Arc<dyn PriceFeed>,
    validator: ConsensusValidator,
    monitor: RangeMonitor,
    orchestrator: RebalanceOrchestrator,
    reader: Arc<dyn VaultReader>,
    telemetry: Arc<dyn Telemetry>,
    wallet: Address,
    check_interval: Duration,
    stats: CycleStats,
}

impl KeeperLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        feed_a: Arc<dyn PriceFeed>,
        feed_b: Arc<dyn PriceFeed>,
        validator: ConsensusValidator,
        monitor: RangeMonitor,
        orchestrator: RebalanceOrchestrator,
        reader: Arc<dyn VaultReader>,
        telemetry: Arc<dyn Telemetry>,
        wallet: Address,
        check_interval: Duration,
    ) -> Self {
        Self {
            feed_a,
            feed_b,
            validator,
            monitor,
            orchestrator,
            reader,
            telemetry,
            wallet,
            check_interval,
            stats: CycleStats::default(),
        }
    }

    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    /// One-shot startup probe: feed health plus keeper authorization.
    ///
    /// Failures are logged, never fatal; the loop starts regardless and the
    /// per-cycle error handling takes over from there.
    pub async fn startup_health_check(&self) {
        let (health_a, health_b) =
            tokio::join!(self.feed_a.health_check(), self.feed_b.health_check());

        for (feed, health) in [(&self.feed_a, health_a), (&self.feed_b, health_b)] {
            if health.healthy {
                tracing::info!(feed = feed.name(), "Feed healthy");
            } else {
                tracing::warn!(
                    feed = feed.name(),
                    issues = ?health.issues,
                    "Feed health check failed"
                );
            }
        }

        match self.reader.keeper_authority().await {
            Ok(authority) if authority == self.wallet => {
                tracing::info!(wallet = %format!("{:#x}", self.wallet), "Wallet is the authorized keeper");
            }
            Ok(authority) => {
                tracing::error!(
                    wallet = %format!("{:#x}", self.wallet),
                    authority = %format!("{:#x}", authority),
                    "Wallet is NOT the vault's keeper; live actions will revert"
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not read keeper authority");
            }
        }
    }

    /// Run cycles on a fixed period until the caller drops the future.
    ///
    /// A cycle that outlasts the period does not queue catch-up work; missed
    /// ticks are skipped and counted.
    pub async fn run(&mut self) {
        self.startup_health_check().await;
        tracing::info!(
            interval_secs = self.check_interval.as_secs(),
            "Keeper loop started"
        );

        let mut ticker = tokio::time::interval(self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let started = Instant::now();

            match self.run_cycle().await {
                Ok(outcome) => tracing::debug!(?outcome, "Cycle complete"),
                Err(e) => {
                    self.stats.errors_observed += 1;
                    tracing::error!(error = %e, "Cycle failed, waiting for next tick");
                }
            }

            let elapsed = started.elapsed();
            if elapsed > self.check_interval {
                self.stats.cycles_overrun += 1;
                tracing::warn!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    interval_ms = self.check_interval.as_millis() as u64,
                    "Cycle outlasted the check interval"
                );
            }
        }
    }

    /// One fetch-validate-assess-act pass.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, KeeperError> {
        self.stats.checks_performed += 1;
        self.stats.last_check_at = Some(Utc::now());

        let (result_a, result_b) =
            tokio::join!(self.feed_a.fetch_latest(), self.feed_b.fetch_latest());
        let obs_a = result_a.map_err(|e| KeeperError::DataUnavailable(e.to_string()))?;
        let obs_b = result_b.map_err(|e| KeeperError::DataUnavailable(e.to_string()))?;

        tracing::info!(
            source_a = self.feed_a.name(),
            price_a = obs_a.price,
            source_b = self.feed_b.name(),
            price_b = obs_b.price,
            "Prices fetched"
        );

        self.advisory_attack_check(obs_a.price, obs_b.price).await;

        let validation = self.validator.validate_pair(
            obs_a.price,
            obs_b.price,
            self.feed_a.name(),
            self.feed_b.name(),
        );
        if !validation.is_valid {
            self.stats.errors_observed += 1;
            self.telemetry
                .validation_rejected(&validation, self.validator.max_deviation_bps());
            return Ok(CycleOutcome::ValidationRejected {
                deviation_bps: validation.deviation_bps,
            });
        }

        let consensus_price = self.validator.weighted_average(&[
            WeightedPrice::new(obs_a.price),
            WeightedPrice::new(obs_b.price),
        ])?;
        let confidence = self.confidence(&obs_a, &obs_b)?;
        tracing::info!(
            consensus_price,
            confidence,
            deviation_bps = validation.deviation_bps,
            "Consensus reached"
        );

        let assessment = self.monitor.assess(consensus_price).await?;
        tracing::info!(assessment = %assessment, "Range assessed");

        match assessment {
            RangeAssessment::NoActivePosition => Ok(CycleOutcome::NoActivePosition),
            RangeAssessment::PoolNotConfigured => Ok(CycleOutcome::PoolNotConfigured),
            RangeAssessment::InRange { .. } => Ok(CycleOutcome::InRange),
            RangeAssessment::OutOfRange { .. } => {
                let outcome = self.orchestrator.execute(consensus_price).await;
                match &outcome {
                    RebalanceOutcome::Simulated { .. } | RebalanceOutcome::Executed { .. } => {
                        self.stats.rebalances_executed += 1;
                        self.stats.last_rebalance_at = Some(Utc::now());
                    }
                    RebalanceOutcome::Failed { .. } => {
                        self.stats.errors_observed += 1;
                    }
                    RebalanceOutcome::SkippedFeeCeiling { .. } => {}
                }
                Ok(CycleOutcome::Rebalanced(outcome))
            }
        }
    }

    fn confidence(
        &self,
        obs_a: &PriceObservation,
        obs_b: &PriceObservation,
    ) -> Result<u8, KeeperError> {
        self.validator
            .confidence_score(&[obs_a.clone(), obs_b.clone()])
    }

    /// Best-effort manipulation-pattern check against the pool's own tick.
    /// Advisory only: raises telemetry, never gates the cycle.
    async fn advisory_attack_check(&self, price_a: f64, price_b: f64) {
        let tick = match self.reader.pool_tick().await {
            Ok(Some(tick)) => tick,
            Ok(None) => return,
            Err(e) => {
                tracing::debug!(error = %e, "Spot reference unavailable for attack check");
                return;
            }
        };

        let spot = self.monitor.tick_to_price(tick);
        let signal = self.validator.detect_attack(price_a, price_b, spot);
        if signal.detected() {
            self.telemetry.attack_signal(&signal);
        }
    }
}
