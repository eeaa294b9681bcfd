//! Cycle orchestration.
//!
//! One controller tick runs one phase (BUILD or UNWIND) end to end:
//! quote fetch, sizing, governor pre-check, dual-leg execution,
//! position bookkeeping, PnL accounting, and the cycle record. A
//! tripped halt latch or a paused reconciler blocks the tick before
//! anything is placed.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, warn};

use dn_core::{
    Cycle, CycleDirection, CycleOutcome, CyclePhase, ExecutionMode, InstrumentId, Leg, OrderSide,
    Price, Quote, Size,
};
use dn_exchange::DynExchange;
use dn_executor::{DualLegExecutor, ExecutorError};
use dn_position::{PositionBook, ReconciliationMonitor};
use dn_pricing::PricingEngine;
use dn_risk::{HaltReason, SafetyGovernor};
use dn_telemetry::{CycleRecord, LegFill, Metrics, StatsReporter};

use crate::config::{AppConfig, InstrumentConfig};
use crate::error::AppResult;

/// What a controller tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleStatus {
    /// Halt latch is tripped; nothing placed.
    Halted,
    /// Reconciler has the engine paused; nothing placed.
    Paused,
    /// Cycle skipped before submission (stale quote, veto, nothing to
    /// unwind). Does not advance direction.
    Skipped(String),
    /// A cycle executed to a terminal outcome.
    Completed(CycleOutcome),
}

/// Drives the build/unwind alternation over the pair.
pub struct CycleController {
    exchange: DynExchange,
    pricing: PricingEngine,
    executor: DualLegExecutor,
    monitor: ReconciliationMonitor,
    governor: Arc<SafetyGovernor>,
    stats: Arc<StatsReporter>,
    book: PositionBook,
    long: InstrumentConfig,
    short: InstrumentConfig,
    target_notional: Decimal,
    next_cycle_id: u64,
    phase: CyclePhase,
    direction: CycleDirection,
    paused: bool,
}

impl CycleController {
    pub fn new(
        config: &AppConfig,
        exchange: DynExchange,
        monitor: ReconciliationMonitor,
        governor: Arc<SafetyGovernor>,
        stats: Arc<StatsReporter>,
    ) -> Self {
        let mut book = PositionBook::new();
        book.track(config.pair.long.instrument());
        book.track(config.pair.short.instrument());

        Self {
            pricing: PricingEngine::new(config.pricing.clone()),
            executor: DualLegExecutor::new(exchange.clone(), config.executor.clone()),
            exchange,
            monitor,
            governor,
            stats,
            book,
            long: config.pair.long.clone(),
            short: config.pair.short.clone(),
            target_notional: config.target_notional,
            next_cycle_id: 1,
            phase: CyclePhase::Build,
            direction: CycleDirection::BuyFirst,
            paused: true,
        }
    }

    /// Phase the next tick will execute.
    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    pub fn direction(&self) -> CycleDirection {
        self.direction
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Run one phase of the build/unwind alternation.
    pub async fn run_cycle(&mut self) -> AppResult<CycleStatus> {
        if !self.governor.can_trade() {
            return Ok(CycleStatus::Halted);
        }
        if self.paused {
            return Ok(CycleStatus::Paused);
        }

        let quotes = match self.fetch_quotes().await {
            Ok(quotes) => quotes,
            Err(e) => {
                warn!(?e, "Quote fetch failed, skipping cycle");
                return Ok(CycleStatus::Skipped(e.to_string()));
            }
        };

        let legs = match self.build_phase_legs(&quotes) {
            Ok(Some(legs)) => legs,
            Ok(None) => {
                // Unwind tick with nothing to close. Fall back to BUILD.
                info!("No open positions to unwind, resuming with build");
                self.phase = CyclePhase::Build;
                return Ok(CycleStatus::Skipped("nothing to unwind".to_string()));
            }
            Err(e) => {
                warn!(%e, "Leg construction failed, skipping cycle");
                return Ok(CycleStatus::Skipped(e.to_string()));
            }
        };

        if let Err(veto) = self.governor.precheck_exposure(&self.projected_after(&legs)) {
            Metrics::cycle("vetoed");
            return Ok(CycleStatus::Skipped(veto.to_string()));
        }

        // Leg order follows the direction flag; the executor dispatches
        // index 0 first.
        let [first, second] = match self.direction {
            CycleDirection::BuyFirst => order_legs(legs, OrderSide::Buy),
            CycleDirection::SellFirst => order_legs(legs, OrderSide::Sell),
        };
        let passive_prices = [
            self.passive_price(&first, &quotes)?,
            self.passive_price(&second, &quotes)?,
        ];

        let mut cycle = Cycle::new(self.next_cycle_id, self.phase, self.direction, [first, second]);
        self.next_cycle_id += 1;

        let outcome = match self.executor.execute_legs(&mut cycle, passive_prices).await {
            Ok(outcome) => outcome,
            Err(ExecutorError::UnwindFailed {
                ref instrument,
                ref remaining,
                attempts,
            }) => {
                // Exposure is stranded; this is the one executor error
                // that must stop everything.
                warn!(
                    instrument = %instrument,
                    remaining = %remaining,
                    attempts,
                    "Unwind failed, halting"
                );
                self.trip(HaltReason::UnwindFailed {
                    instrument: instrument.clone(),
                });
                return Err(ExecutorError::UnwindFailed {
                    instrument: instrument.clone(),
                    remaining: *remaining,
                    attempts,
                }
                .into());
            }
            Err(e) => return Err(e.into()),
        };

        self.settle(&cycle, &outcome);

        // Reconcile against the venue before the next cycle is allowed
        // to start; the governor re-checks observed positions in the
        // same pass.
        self.reconcile_now().await?;

        Ok(CycleStatus::Completed(outcome))
    }

    /// Reconcile the local book against the venue. Drift pauses the
    /// engine until a later clean pass; connectivity exhaustion halts.
    pub async fn reconcile_now(&mut self) -> AppResult<()> {
        match self.monitor.reconcile(&mut self.book).await {
            Ok(report) => {
                for event in &report.drifts {
                    Metrics::drift(event.instrument.as_str());
                }
                if report.in_sync() {
                    if self.paused {
                        info!("Reconciliation clean, resuming cycles");
                        self.paused = false;
                        Metrics::paused(false);
                    }
                } else if !self.paused {
                    warn!(drifts = report.drifts.len(), "Drift detected, pausing cycles");
                    self.paused = true;
                    Metrics::paused(true);
                }

                let observed: Vec<(InstrumentId, Decimal)> = [&self.long, &self.short]
                    .iter()
                    .map(|leg| (leg.instrument(), self.book.local(&leg.instrument())))
                    .collect();
                self.governor.check_observed(&observed);
                Ok(())
            }
            Err(e) => {
                self.paused = true;
                Metrics::paused(true);
                self.trip(HaltReason::ReconcileConnectivity {
                    detail: e.to_string(),
                });
                Err(e.into())
            }
        }
    }

    fn trip(&self, reason: HaltReason) {
        let label = reason.label();
        if self.governor.latch().trip(reason) {
            Metrics::halt(label);
        }
    }

    async fn fetch_quotes(&self) -> Result<PairQuotes, dn_exchange::ExchangeError> {
        let (long, short) = tokio::join!(
            self.exchange.bbo(&self.long.instrument()),
            self.exchange.bbo(&self.short.instrument()),
        );
        Ok(PairQuotes {
            long: long?,
            short: short?,
        })
    }

    /// Legs for the next phase. `Ok(None)` means an unwind tick found
    /// nothing to close.
    fn build_phase_legs(
        &self,
        quotes: &PairQuotes,
    ) -> Result<Option<[Leg; 2]>, dn_pricing::PricingError> {
        match self.phase {
            CyclePhase::Build => {
                let long_leg = self.pricing.build_leg(
                    self.long.instrument(),
                    OrderSide::Buy,
                    &quotes.long,
                    self.long.tick(),
                    self.long.step(),
                    self.target_notional,
                )?;
                let short_leg = self.pricing.build_leg(
                    self.short.instrument(),
                    OrderSide::Sell,
                    &quotes.short,
                    self.short.tick(),
                    self.short.step(),
                    self.target_notional,
                )?;
                Ok(Some([long_leg, short_leg]))
            }
            CyclePhase::Unwind => {
                // Close what is actually on the book, not a fresh
                // notional sizing.
                let long_pos = self.book.local(&self.long.instrument());
                let short_pos = self.book.local(&self.short.instrument());
                if long_pos.is_zero() || short_pos.is_zero() {
                    return Ok(None);
                }
                self.pricing.validate(&quotes.long)?;
                self.pricing.validate(&quotes.short)?;
                Ok(Some([
                    closing_leg(&self.long, long_pos),
                    closing_leg(&self.short, short_pos),
                ]))
            }
        }
    }

    fn passive_price(
        &self,
        leg: &Leg,
        quotes: &PairQuotes,
    ) -> Result<Price, dn_pricing::PricingError> {
        let quote = if leg.instrument == self.long.instrument() {
            &quotes.long
        } else {
            &quotes.short
        };
        self.pricing
            .leg_price(quote, leg.side, ExecutionMode::Passive, leg.tick_size)
    }

    /// Signed positions as they would stand if both legs filled in full.
    fn projected_after(&self, legs: &[Leg; 2]) -> Vec<(InstrumentId, Decimal)> {
        legs.iter()
            .map(|leg| {
                let projected = self.book.local(&leg.instrument)
                    + Decimal::from(leg.side.sign()) * leg.target.inner();
                (leg.instrument.clone(), projected)
            })
            .collect()
    }

    /// Fold a finished cycle into the book, the governor, the stats
    /// reporter, and the phase/direction state.
    fn settle(&mut self, cycle: &Cycle, outcome: &CycleOutcome) {
        for leg in &cycle.legs {
            let filled = leg.filled();
            if filled.is_positive() {
                self.book.apply_fill(&leg.instrument, leg.side, filled);
            }
        }

        let (pnl, unwind_cost) = match outcome {
            CycleOutcome::Success => (cycle.cash_flow(), None),
            CycleOutcome::Failed => (Decimal::ZERO, None),
            CycleOutcome::AsymmetricRecovered { unwind_cost } => {
                // The executor force-closed the one exposed leg; mirror
                // that close into the local book.
                if let Some(leg) = cycle.legs.iter().find(|l| l.filled().is_positive()) {
                    self.book
                        .apply_fill(&leg.instrument, leg.side.opposite(), leg.filled());
                    Metrics::unwind(leg.instrument.as_str());
                }
                (*unwind_cost, Some(*unwind_cost))
            }
        };

        let daily = self.governor.record_pnl(pnl);
        Metrics::daily_pnl(daily);

        let duration_ms = cycle
            .ended_at
            .map(|end| (end - cycle.started_at).num_milliseconds())
            .unwrap_or(0);
        self.stats.record_cycle(CycleRecord {
            cycle_id: cycle.id,
            phase: cycle.phase,
            direction: cycle.direction,
            legs: cycle.legs.iter().map(leg_fill).collect(),
            outcome: outcome.label().to_string(),
            pnl,
            unwind_cost,
            duration_ms,
            ended_at: cycle.ended_at.unwrap_or(cycle.started_at),
        });

        match outcome {
            CycleOutcome::Success => {
                self.phase = match self.phase {
                    CyclePhase::Build => CyclePhase::Unwind,
                    CyclePhase::Unwind => CyclePhase::Build,
                };
                self.direction = self.direction.flipped();
            }
            // The forced close put positions back where they started;
            // retry the same phase from the other direction.
            CycleOutcome::AsymmetricRecovered { .. } => {
                self.direction = self.direction.flipped();
            }
            // Symmetric failure placed nothing that stuck. Same phase,
            // same direction.
            CycleOutcome::Failed => {}
        }
    }
}

struct PairQuotes {
    long: Quote,
    short: Quote,
}

/// Arrange the pair so the leg with `first_side` dispatches first.
fn order_legs(legs: [Leg; 2], first_side: OrderSide) -> [Leg; 2] {
    let [a, b] = legs;
    if a.side == first_side {
        [a, b]
    } else {
        [b, a]
    }
}

/// A leg that closes the given signed position.
fn closing_leg(config: &InstrumentConfig, position: Decimal) -> Leg {
    let side = if position > Decimal::ZERO {
        OrderSide::Sell
    } else {
        OrderSide::Buy
    };
    Leg::new(
        config.instrument(),
        side,
        Size::new(position.abs()),
        config.tick(),
    )
}

fn leg_fill(leg: &Leg) -> LegFill {
    LegFill {
        instrument: leg.instrument.clone(),
        side: leg.side,
        qty: leg.filled(),
        avg_price: leg.avg_fill_price(),
        mode: leg.mode,
        fees: leg.fees_paid(),
    }
}
