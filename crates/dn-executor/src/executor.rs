//! Dual-leg execution state machine.
//!
//! Both legs are driven as independent concurrent futures joined at two
//! points: once right after passive submission (to capture order
//! handles) and once after the poll/escalation loop completes. The two
//! leg futures never touch each other's attempt records; classification
//! happens only at the final join.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use dn_core::{
    ClientOrderId, Cycle, CycleOutcome, ExecutionMode, Leg, OrderAttempt, OrderStatus, Price,
};
use dn_exchange::{
    AggressiveRequest, DynExchange, ExchangeError, OrderHandle, OrderRequest, OrderSnapshot,
};

use crate::error::{ExecutorError, ExecutorResult};
use crate::unwind::UnwindConfig;

/// Consecutive status-poll failures tolerated before the leg is
/// declared disconnected.
const MAX_POLL_FAILURES: u32 = 3;

/// Execution timing and retry parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Fill poll interval. Default: 500ms.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Passive window before escalation. Default: 5000ms.
    #[serde(default = "default_passive_timeout_ms")]
    pub passive_timeout_ms: u64,
    /// Aggressive attempts per leg after the passive window. Default: 2.
    #[serde(default = "default_max_aggressive_retries")]
    pub max_aggressive_retries: u32,
    /// Deadline for a cancel ack, decoupled from the phase timeout so a
    /// slow ack cannot block escalation. Default: 1000ms.
    #[serde(default = "default_cancel_deadline_ms")]
    pub cancel_deadline_ms: u64,
    /// Slippage tolerance for escalation orders (bps).
    #[serde(default = "default_aggressive_slippage_bps")]
    pub aggressive_slippage_bps: u32,
    /// Emergency unwind parameters.
    #[serde(default)]
    pub unwind: UnwindConfig,
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_passive_timeout_ms() -> u64 {
    5_000
}

fn default_max_aggressive_retries() -> u32 {
    2
}

fn default_cancel_deadline_ms() -> u64 {
    1_000
}

fn default_aggressive_slippage_bps() -> u32 {
    20
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            passive_timeout_ms: default_passive_timeout_ms(),
            max_aggressive_retries: default_max_aggressive_retries(),
            cancel_deadline_ms: default_cancel_deadline_ms(),
            aggressive_slippage_bps: default_aggressive_slippage_bps(),
            unwind: UnwindConfig::default(),
        }
    }
}

impl ExecutorConfig {
    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn passive_timeout(&self) -> Duration {
        Duration::from_millis(self.passive_timeout_ms)
    }

    fn cancel_deadline(&self) -> Duration {
        Duration::from_millis(self.cancel_deadline_ms)
    }
}

/// Typed per-leg failure. Carried in [`LegReport`] so that symmetric vs
/// asymmetric classification never depends on error ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegError {
    /// Venue rejected the order; immediate leg failure.
    Rejected(String),
    /// Transport failure while submitting or polling.
    Connectivity(String),
}

/// Outcome of driving one leg through the protocol. Fill state lives in
/// the leg's attempt records; this only carries the terminal error, if
/// any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegReport {
    pub error: Option<LegError>,
}

impl LegReport {
    fn ok() -> Self {
        Self { error: None }
    }

    fn failed(error: LegError) -> Self {
        Self { error: Some(error) }
    }
}

/// Dispatches both legs concurrently and runs the fill-polling /
/// escalation / unwind state machine.
pub struct DualLegExecutor {
    exchange: DynExchange,
    config: ExecutorConfig,
}

impl DualLegExecutor {
    pub fn new(exchange: DynExchange, config: ExecutorConfig) -> Self {
        Self { exchange, config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Execute both legs of a cycle.
    ///
    /// `passive_prices` are the limit prices for the initial passive
    /// orders, in leg order. The cycle's legs are mutated in place; the
    /// returned outcome classifies the terminal state.
    pub async fn execute_legs(
        &self,
        cycle: &mut Cycle,
        passive_prices: [Price; 2],
    ) -> ExecutorResult<CycleOutcome> {
        let cycle_id = cycle.id;
        let [leg_a, leg_b] = &mut cycle.legs;

        info!(
            cycle_id,
            phase = %cycle.phase,
            direction = %cycle.direction,
            leg_a = %leg_a.instrument,
            leg_b = %leg_b.instrument,
            "Dispatching dual-leg execution"
        );

        // Join point 1: both passive submissions issued before either
        // result is awaited.
        let (handle_a, handle_b) = tokio::join!(
            self.submit_passive_leg(leg_a, passive_prices[0]),
            self.submit_passive_leg(leg_b, passive_prices[1]),
        );

        // Join point 2: poll/escalation loops run to completion.
        let (report_a, report_b) = tokio::join!(
            self.drive_leg(leg_a, handle_a),
            self.drive_leg(leg_b, handle_b),
        );
        let (report_a, report_b) = (report_a?, report_b?);

        let outcome = self.classify(cycle_id, leg_a, leg_b, &report_a, &report_b).await?;
        cycle.mark_ended();

        info!(cycle_id, outcome = outcome.label(), "Dual-leg execution resolved");
        Ok(outcome)
    }

    /// Submit the initial passive order for one leg.
    async fn submit_passive_leg(
        &self,
        leg: &Leg,
        price: Price,
    ) -> Result<OrderHandle, LegError> {
        let req = OrderRequest {
            cloid: ClientOrderId::new(),
            instrument: leg.instrument.clone(),
            side: leg.side,
            price,
            qty: leg.target,
        };
        debug!(instrument = %leg.instrument, side = %leg.side, price = %price, qty = %leg.target, "Submitting passive order");

        self.exchange
            .submit_passive(req)
            .await
            .map_err(|e| match e {
                ExchangeError::Rejected { reason } => LegError::Rejected(reason),
                other => LegError::Connectivity(other.to_string()),
            })
    }

    /// Drive one leg from its submitted passive order through the
    /// poll/escalation protocol.
    async fn drive_leg(
        &self,
        leg: &mut Leg,
        submitted: Result<OrderHandle, LegError>,
    ) -> ExecutorResult<LegReport> {
        let handle = match submitted {
            Ok(handle) => handle,
            // A hard reject or connectivity error at submission is an
            // immediate leg failure; no escalation.
            Err(err) => {
                warn!(instrument = %leg.instrument, ?err, "Passive submission failed");
                return Ok(LegReport::failed(err));
            }
        };
        let submitted_at = Utc::now();

        // Non-terminal exits (window expired, or polling lost
        // connectivity) cancel the outstanding order and re-read, so a
        // fill observed before the exit still counts toward exposure.
        let (final_snap, poll_error) = match self.poll_passive(leg, &handle).await {
            Ok(snap) if snap.status.is_terminal() => (snap, None),
            Ok(snap) => (self.cancel_and_settle(leg, &handle, snap).await, None),
            Err((err, last)) => (self.cancel_and_settle(leg, &handle, last).await, Some(err)),
        };

        let status = if final_snap.status.is_terminal() {
            final_snap.status
        } else {
            OrderStatus::Expired
        };
        leg.record_attempt(OrderAttempt {
            mode: ExecutionMode::Passive,
            submitted: leg.target,
            filled: final_snap.filled,
            avg_price: final_snap.avg_price,
            status,
            fee_rate: final_snap.fee_rate,
            submitted_at,
        })?;

        // The leg fails on lost connectivity, but only after its observed
        // fills are on the record; classification still sees the
        // exposure.
        if let Some(err) = poll_error {
            return Ok(LegReport::failed(err));
        }

        if leg.is_filled() {
            debug!(instrument = %leg.instrument, "Leg filled passively");
            return Ok(LegReport::ok());
        }

        self.escalate_leg(leg).await
    }

    /// Cooperative fill polling for the passive window. Returns the last
    /// observed snapshot; never polls faster than the configured
    /// interval. Connectivity exhaustion carries the last snapshot out
    /// with the error so observed fills are never discarded.
    async fn poll_passive(
        &self,
        leg: &Leg,
        handle: &OrderHandle,
    ) -> Result<OrderSnapshot, (LegError, OrderSnapshot)> {
        let deadline = Instant::now() + self.config.passive_timeout();
        let mut last = OrderSnapshot::open();
        let mut poll_failures = 0u32;

        loop {
            tokio::time::sleep(self.config.poll_interval()).await;

            match self.exchange.order_status(handle).await {
                Ok(snap) => {
                    poll_failures = 0;
                    last = snap;
                    if last.status.is_terminal() {
                        return Ok(last);
                    }
                }
                Err(e) => {
                    poll_failures += 1;
                    warn!(instrument = %leg.instrument, poll_failures, ?e, "Status poll failed");
                    if poll_failures >= MAX_POLL_FAILURES {
                        return Err((LegError::Connectivity(e.to_string()), last));
                    }
                }
            }

            if Instant::now() >= deadline {
                return Ok(last);
            }
        }
    }

    /// Cancel an outstanding order and read back its settled state.
    ///
    /// Cancellation is idempotent and awaited under its own short
    /// deadline; a slow ack falls through to the status re-read rather
    /// than blocking escalation.
    async fn cancel_and_settle(
        &self,
        leg: &Leg,
        handle: &OrderHandle,
        last: OrderSnapshot,
    ) -> OrderSnapshot {
        match tokio::time::timeout(
            self.config.cancel_deadline(),
            self.exchange.cancel_order(handle),
        )
        .await
        {
            Ok(Ok(ack)) => {
                debug!(instrument = %leg.instrument, cancelled = ack.cancelled, "Cancel acked");
            }
            // The order already reached a terminal state; the re-read
            // below captures whatever filled.
            Ok(Err(ExchangeError::UnknownOrder)) => {}
            Ok(Err(e)) => {
                warn!(instrument = %leg.instrument, ?e, "Cancel failed, reading final state");
            }
            Err(_) => {
                warn!(instrument = %leg.instrument, "Cancel ack timed out, reading final state");
            }
        }

        // Final read catches the fill-during-cancel race; fills are
        // taken from this snapshot exactly once.
        match self.exchange.order_status(handle).await {
            Ok(snap) => snap,
            Err(e) => {
                warn!(instrument = %leg.instrument, ?e, "Post-cancel status read failed, using last poll");
                last
            }
        }
    }

    /// Submit aggressive orders for the remainder, up to the configured
    /// retry bound.
    async fn escalate_leg(&self, leg: &mut Leg) -> ExecutorResult<LegReport> {
        for attempt in 1..=self.config.max_aggressive_retries {
            let remaining = leg.remaining();
            if !remaining.is_positive() {
                break;
            }

            info!(
                instrument = %leg.instrument,
                attempt,
                remaining = %remaining,
                "Escalating to aggressive order"
            );

            let req = AggressiveRequest {
                cloid: ClientOrderId::new(),
                instrument: leg.instrument.clone(),
                side: leg.side,
                qty: remaining,
                max_slippage_bps: self.config.aggressive_slippage_bps,
            };
            let submitted_at = Utc::now();

            match self.exchange.submit_aggressive(req).await {
                Ok(result) => {
                    leg.record_attempt(OrderAttempt {
                        mode: ExecutionMode::Aggressive,
                        submitted: remaining,
                        filled: result.filled,
                        avg_price: result.avg_price,
                        status: result.status,
                        fee_rate: result.fee_rate,
                        submitted_at,
                    })?;
                    if leg.is_filled() {
                        return Ok(LegReport::ok());
                    }
                }
                Err(ExchangeError::Rejected { reason }) => {
                    warn!(instrument = %leg.instrument, reason = %reason, "Aggressive order rejected");
                    return Ok(LegReport::failed(LegError::Rejected(reason)));
                }
                Err(e) => {
                    warn!(instrument = %leg.instrument, ?e, "Aggressive submission failed");
                    return Ok(LegReport::failed(LegError::Connectivity(e.to_string())));
                }
            }
        }

        if leg.is_filled() {
            Ok(LegReport::ok())
        } else {
            Ok(LegReport::failed(LegError::Rejected(
                "passive window and aggressive retries exhausted".to_string(),
            )))
        }
    }

    /// Classify the joined per-leg results and run emergency unwind when
    /// exactly one leg holds exposure.
    async fn classify(
        &self,
        cycle_id: u64,
        leg_a: &mut Leg,
        leg_b: &mut Leg,
        report_a: &LegReport,
        report_b: &LegReport,
    ) -> ExecutorResult<CycleOutcome> {
        if leg_a.is_filled() && leg_b.is_filled() {
            return Ok(CycleOutcome::Success);
        }

        let a_exposed = leg_a.filled().is_positive();
        let b_exposed = leg_b.filled().is_positive();

        match (a_exposed, b_exposed) {
            // Symmetric failure: no exposure imbalance, no unwind.
            (false, false) => {
                info!(cycle_id, ?report_a, ?report_b, "Symmetric failure, both legs flat");
                Ok(CycleOutcome::Failed)
            }
            // Asymmetric: exactly one leg holds exposure.
            (true, false) => {
                let report = self.unwind_leg(cycle_id, leg_a).await?;
                Ok(CycleOutcome::AsymmetricRecovered {
                    unwind_cost: report.cost,
                })
            }
            (false, true) => {
                let report = self.unwind_leg(cycle_id, leg_b).await?;
                Ok(CycleOutcome::AsymmetricRecovered {
                    unwind_cost: report.cost,
                })
            }
            // Both legs partially filled: exposure is roughly offset, so
            // forced closes would only add cost. Flagged for the
            // reconciliation pass.
            (true, true) => {
                warn!(
                    cycle_id,
                    filled_a = %leg_a.filled(),
                    filled_b = %leg_b.filled(),
                    "Both legs ended partially filled; residual left to reconciliation"
                );
                Ok(CycleOutcome::Failed)
            }
        }
    }

    pub(crate) fn exchange(&self) -> &DynExchange {
        &self.exchange
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dn_core::{CycleDirection, CyclePhase, InstrumentId, OrderSide, Size};
    use dn_exchange::mock::MockExchange;
    use dn_exchange::OrderResult;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn eth() -> InstrumentId {
        InstrumentId::from("ETH-PERP")
    }

    fn btc() -> InstrumentId {
        InstrumentId::from("BTC-PERP")
    }

    fn test_config() -> ExecutorConfig {
        ExecutorConfig {
            poll_interval_ms: 500,
            passive_timeout_ms: 5_000,
            max_aggressive_retries: 2,
            cancel_deadline_ms: 1_000,
            aggressive_slippage_bps: 20,
            unwind: UnwindConfig::default(),
        }
    }

    fn build_cycle() -> Cycle {
        let leg_a = Leg::new(eth(), OrderSide::Buy, Size::new(dec!(0.05)), Price::new(dec!(0.01)));
        let leg_b = Leg::new(btc(), OrderSide::Sell, Size::new(dec!(0.002)), Price::new(dec!(0.5)));
        Cycle::new(1, CyclePhase::Build, CycleDirection::BuyFirst, [leg_a, leg_b])
    }

    fn prices() -> [Price; 2] {
        [Price::new(dec!(2000)), Price::new(dec!(50000))]
    }

    fn filled_snap(qty: Decimal, px: Decimal, fee: Decimal) -> OrderSnapshot {
        OrderSnapshot {
            status: OrderStatus::Filled,
            filled: Size::new(qty),
            avg_price: Price::new(px),
            fee_rate: fee,
            as_of: Utc::now(),
        }
    }

    fn partial_snap(qty: Decimal, px: Decimal) -> OrderSnapshot {
        OrderSnapshot {
            status: OrderStatus::PartiallyFilled,
            filled: Size::new(qty),
            avg_price: Price::new(px),
            fee_rate: dec!(0.0002),
            as_of: Utc::now(),
        }
    }

    fn expired_snap(qty: Decimal, px: Decimal) -> OrderSnapshot {
        OrderSnapshot {
            status: OrderStatus::Expired,
            filled: Size::new(qty),
            avg_price: Price::new(px),
            fee_rate: dec!(0.0002),
            as_of: Utc::now(),
        }
    }

    fn aggressive_fill(qty: Decimal, px: Decimal) -> OrderResult {
        OrderResult {
            status: OrderStatus::Filled,
            filled: Size::new(qty),
            avg_price: Price::new(px),
            fee_rate: dec!(0.0005),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_both_legs_fill_passively() {
        let mock = Arc::new(MockExchange::new());
        mock.script_status(&eth(), vec![filled_snap(dec!(0.05), dec!(2000), dec!(0.0002))]);
        mock.script_status(&btc(), vec![filled_snap(dec!(0.002), dec!(50000), dec!(0.0002))]);

        let executor = DualLegExecutor::new(mock.clone(), test_config());
        let mut cycle = build_cycle();

        let outcome = executor.execute_legs(&mut cycle, prices()).await.unwrap();
        assert_eq!(outcome, CycleOutcome::Success);
        assert_eq!(mock.passive_submits().len(), 2);
        assert!(mock.aggressive_submits().is_empty());
        assert!(mock.cancels().is_empty());
        assert!(cycle.ended_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_escalates_both_legs() {
        let mock = Arc::new(MockExchange::new());
        // Neither leg fills passively; polls keep returning Open.
        mock.script_aggressive(&eth(), Ok(aggressive_fill(dec!(0.05), dec!(2001))));
        mock.script_aggressive(&btc(), Ok(aggressive_fill(dec!(0.002), dec!(49990))));

        let executor = DualLegExecutor::new(mock.clone(), test_config());
        let mut cycle = build_cycle();

        let outcome = executor.execute_legs(&mut cycle, prices()).await.unwrap();
        assert_eq!(outcome, CycleOutcome::Success);
        // Both outstanding passives cancelled before escalation.
        assert_eq!(mock.cancels().len(), 2);
        assert_eq!(mock.aggressive_submits().len(), 2);

        // Escalation monotonicity: no passive attempt after an aggressive one.
        for leg in &cycle.legs {
            let modes: Vec<_> = leg.attempts.iter().map(|a| a.mode).collect();
            assert!(modes.windows(2).all(|w| w[0] <= w[1]));
            assert_eq!(leg.mode, ExecutionMode::Aggressive);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_passive_fill_escalates_remainder() {
        let mock = Arc::new(MockExchange::new());
        // ETH fills 0.02 passively, cancel settles at 0.02, remainder 0.03
        // goes aggressive. BTC fills passively.
        mock.script_status(&eth(), vec![partial_snap(dec!(0.02), dec!(2000))]);
        mock.script_aggressive(&eth(), Ok(aggressive_fill(dec!(0.03), dec!(2001))));
        mock.script_status(&btc(), vec![filled_snap(dec!(0.002), dec!(50000), dec!(0.0002))]);

        let executor = DualLegExecutor::new(mock.clone(), test_config());
        let mut cycle = build_cycle();

        let outcome = executor.execute_legs(&mut cycle, prices()).await.unwrap();
        assert_eq!(outcome, CycleOutcome::Success);

        let eth_leg = &cycle.legs[0];
        assert_eq!(eth_leg.filled(), Size::new(dec!(0.05)));
        assert_eq!(eth_leg.attempts.len(), 2);
        assert_eq!(mock.aggressive_submits()[0].qty, Size::new(dec!(0.03)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fill_during_cancel_not_double_counted() {
        let mock = Arc::new(MockExchange::new());
        // Polls see the order open; the post-cancel read finds it fully
        // filled (the fill landed while the cancel was in flight).
        let mut polls = vec![partial_snap(dec!(0.00), dec!(0)); 10];
        polls.push(filled_snap(dec!(0.05), dec!(2000), dec!(0.0002)));
        // The filled snapshot must be consumed by the post-cancel read,
        // so pad the poll script to cover every in-window poll.
        mock.script_status(&eth(), polls);
        mock.script_status(&btc(), vec![filled_snap(dec!(0.002), dec!(50000), dec!(0.0002))]);

        let executor = DualLegExecutor::new(mock.clone(), test_config());
        let mut cycle = build_cycle();

        let outcome = executor.execute_legs(&mut cycle, prices()).await.unwrap();
        assert_eq!(outcome, CycleOutcome::Success);

        let eth_leg = &cycle.legs[0];
        // Exactly one passive attempt carrying the full fill; nothing
        // escalated, nothing double-counted.
        assert_eq!(eth_leg.attempts.len(), 1);
        assert_eq!(eth_leg.filled(), Size::new(dec!(0.05)));
        assert!(mock.aggressive_submits().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_symmetric_failure_no_unwind() {
        let mock = Arc::new(MockExchange::new());
        // Neither leg ever fills; both escalations are rejected.
        mock.script_aggressive(
            &eth(),
            Err(ExchangeError::Rejected {
                reason: "post only".into(),
            }),
        );
        mock.script_aggressive(
            &btc(),
            Err(ExchangeError::Rejected {
                reason: "post only".into(),
            }),
        );

        let executor = DualLegExecutor::new(mock.clone(), test_config());
        let mut cycle = build_cycle();

        let outcome = executor.execute_legs(&mut cycle, prices()).await.unwrap();
        assert_eq!(outcome, CycleOutcome::Failed);
        // No unwind was attempted: the only aggressive submissions are
        // the two rejected escalations.
        assert_eq!(mock.aggressive_submits().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_asymmetric_failure_triggers_unwind() {
        let mock = Arc::new(MockExchange::new());
        // ETH fills passively; BTC never fills and exhausts both
        // aggressive retries with zero fill.
        mock.script_status(&eth(), vec![filled_snap(dec!(0.05), dec!(2000), dec!(0.0002))]);
        mock.script_aggressive(
            &btc(),
            Ok(OrderResult {
                status: OrderStatus::Expired,
                filled: Size::ZERO,
                avg_price: Price::ZERO,
                fee_rate: dec!(0),
            }),
        );
        mock.script_aggressive(
            &btc(),
            Ok(OrderResult {
                status: OrderStatus::Expired,
                filled: Size::ZERO,
                avg_price: Price::ZERO,
                fee_rate: dec!(0),
            }),
        );
        // The unwind sell of the ETH leg.
        mock.script_aggressive(
            &eth(),
            Ok(OrderResult {
                status: OrderStatus::Filled,
                filled: Size::new(dec!(0.05)),
                avg_price: Price::new(dec!(1999)),
                fee_rate: dec!(0.0005),
            }),
        );

        let executor = DualLegExecutor::new(mock.clone(), test_config());
        let mut cycle = build_cycle();

        let outcome = executor.execute_legs(&mut cycle, prices()).await.unwrap();
        let CycleOutcome::AsymmetricRecovered { unwind_cost } = outcome else {
            panic!("expected asymmetric recovery, got {outcome:?}");
        };
        // Bought 0.05 @ 2000 (fee 0.0002), sold 0.05 @ 1999 (fee 0.0005):
        // the round trip realizes a loss.
        assert!(unwind_cost < Decimal::ZERO);

        // The unwind order is the opposite side, sized to the fill.
        let unwind_req = mock
            .aggressive_submits()
            .into_iter()
            .find(|r| r.instrument == eth())
            .expect("unwind submission");
        assert_eq!(unwind_req.side, OrderSide::Sell);
        assert_eq!(unwind_req.qty, Size::new(dec!(0.05)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_connectivity_loss_keeps_observed_fill_and_unwinds() {
        let mock = Arc::new(MockExchange::new());
        // ETH reports a partial fill, then the venue goes dark: three
        // failed polls exhaust the budget and the post-cancel re-read
        // fails too. BTC never fills and is rejected on escalation.
        mock.script_status(&eth(), vec![partial_snap(dec!(0.02), dec!(2000))]);
        mock.fail_status_polls(&eth(), 4);
        // The unwind sell of the partially filled ETH leg.
        mock.script_aggressive(
            &eth(),
            Ok(aggressive_fill(dec!(0.02), dec!(1999))),
        );

        let executor = DualLegExecutor::new(mock.clone(), test_config());
        let mut cycle = build_cycle();

        let outcome = executor.execute_legs(&mut cycle, prices()).await.unwrap();

        // The fill observed before connectivity was lost stays on the
        // leg's record, so classification sees the exposure and the
        // unwind fires.
        assert_eq!(cycle.legs[0].filled(), Size::new(dec!(0.02)));
        assert!(matches!(outcome, CycleOutcome::AsymmetricRecovered { .. }));

        // The dark leg's order was cancelled, not left resting.
        assert!(mock.cancels().iter().any(|h| h.instrument == eth()));

        let unwind_req = mock
            .aggressive_submits()
            .into_iter()
            .find(|r| r.instrument == eth())
            .expect("unwind submission");
        assert_eq!(unwind_req.side, OrderSide::Sell);
        assert_eq!(unwind_req.qty, Size::new(dec!(0.02)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hard_reject_on_one_leg_classified_asymmetric() {
        let mock = Arc::new(MockExchange::new());
        // BTC passive submission hard-rejected; ETH fills.
        mock.script_passive_reject(
            &btc(),
            ExchangeError::Rejected {
                reason: "margin check failed".into(),
            },
        );
        mock.script_status(&eth(), vec![filled_snap(dec!(0.05), dec!(2000), dec!(0.0002))]);
        mock.script_aggressive(
            &eth(),
            Ok(OrderResult {
                status: OrderStatus::Filled,
                filled: Size::new(dec!(0.05)),
                avg_price: Price::new(dec!(2000)),
                fee_rate: dec!(0.0005),
            }),
        );

        let executor = DualLegExecutor::new(mock.clone(), test_config());
        let mut cycle = build_cycle();

        let outcome = executor.execute_legs(&mut cycle, prices()).await.unwrap();
        assert!(matches!(outcome, CycleOutcome::AsymmetricRecovered { .. }));
        // Rejected leg never escalates.
        assert!(mock
            .aggressive_submits()
            .iter()
            .all(|r| r.instrument == eth()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_fill_on_failed_peer_zero_is_unwound() {
        let mock = Arc::new(MockExchange::new());
        // ETH partial-fills 0.02 then expires across all retries; BTC
        // ends at zero. The 0.02 ETH exposure must be force-closed.
        mock.script_status(&eth(), vec![expired_snap(dec!(0.02), dec!(2000))]);
        mock.script_aggressive(
            &eth(),
            Ok(OrderResult {
                status: OrderStatus::Expired,
                filled: Size::ZERO,
                avg_price: Price::ZERO,
                fee_rate: dec!(0),
            }),
        );
        mock.script_aggressive(
            &eth(),
            Ok(OrderResult {
                status: OrderStatus::Expired,
                filled: Size::ZERO,
                avg_price: Price::ZERO,
                fee_rate: dec!(0),
            }),
        );
        mock.script_aggressive(
            &btc(),
            Ok(OrderResult {
                status: OrderStatus::Expired,
                filled: Size::ZERO,
                avg_price: Price::ZERO,
                fee_rate: dec!(0),
            }),
        );
        mock.script_aggressive(
            &btc(),
            Ok(OrderResult {
                status: OrderStatus::Expired,
                filled: Size::ZERO,
                avg_price: Price::ZERO,
                fee_rate: dec!(0),
            }),
        );
        // Unwind sell of the 0.02 partial.
        mock.script_aggressive(
            &eth(),
            Ok(OrderResult {
                status: OrderStatus::Filled,
                filled: Size::new(dec!(0.02)),
                avg_price: Price::new(dec!(1999.5)),
                fee_rate: dec!(0.0005),
            }),
        );

        let executor = DualLegExecutor::new(mock.clone(), test_config());
        let mut cycle = build_cycle();

        let outcome = executor.execute_legs(&mut cycle, prices()).await.unwrap();
        assert!(matches!(outcome, CycleOutcome::AsymmetricRecovered { .. }));

        let unwind_req = mock
            .aggressive_submits()
            .into_iter()
            .filter(|r| r.instrument == eth())
            .last()
            .unwrap();
        assert_eq!(unwind_req.qty, Size::new(dec!(0.02)));
        assert_eq!(unwind_req.side, OrderSide::Sell);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unwind_failure_is_fatal_and_surfaced() {
        let mock = Arc::new(MockExchange::new());
        mock.script_status(&eth(), vec![filled_snap(dec!(0.05), dec!(2000), dec!(0.0002))]);
        // BTC exhausts retries at zero fill; every ETH unwind shot fails.
        for _ in 0..2 {
            mock.script_aggressive(
                &btc(),
                Ok(OrderResult {
                    status: OrderStatus::Expired,
                    filled: Size::ZERO,
                    avg_price: Price::ZERO,
                    fee_rate: dec!(0),
                }),
            );
        }
        for _ in 0..3 {
            mock.script_aggressive(
                &eth(),
                Ok(OrderResult {
                    status: OrderStatus::Expired,
                    filled: Size::ZERO,
                    avg_price: Price::ZERO,
                    fee_rate: dec!(0),
                }),
            );
        }

        let executor = DualLegExecutor::new(mock.clone(), test_config());
        let mut cycle = build_cycle();

        let err = executor.execute_legs(&mut cycle, prices()).await.unwrap_err();
        match err {
            ExecutorError::UnwindFailed {
                instrument,
                remaining,
                ..
            } => {
                assert_eq!(instrument, eth());
                assert_eq!(remaining, Size::new(dec!(0.05)));
            }
            other => panic!("expected UnwindFailed, got {other:?}"),
        }
    }
}
