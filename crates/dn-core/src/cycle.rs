//! Cycle, leg, and attempt records for dual-leg execution.
//!
//! A `Cycle` is one BUILD or UNWIND pass over the instrument pair. Each of
//! its two `Leg`s accumulates an ordered list of `OrderAttempt`s as the
//! executor escalates from passive to aggressive pricing.

use crate::error::{CoreError, Result};
use crate::{ExecutionMode, InstrumentId, OrderSide, OrderStatus, Price, Size};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One order submission for a leg.
///
/// `fee_rate` is the rate the venue actually applied to this attempt,
/// not the configured default for the submitted mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAttempt {
    /// Pricing mode of this attempt.
    pub mode: ExecutionMode,
    /// Quantity submitted.
    pub submitted: Size,
    /// Quantity filled.
    pub filled: Size,
    /// Average fill price (zero if nothing filled).
    pub avg_price: Price,
    /// Final status of this attempt.
    pub status: OrderStatus,
    /// Fee rate actually applied by the venue.
    pub fee_rate: Decimal,
    /// When the order was submitted.
    pub submitted_at: DateTime<Utc>,
}

impl OrderAttempt {
    /// Fees paid on this attempt in quote currency.
    pub fn fee_paid(&self) -> Decimal {
        self.filled.inner() * self.avg_price.inner() * self.fee_rate
    }
}

/// One side of the pair trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leg {
    /// Instrument this leg trades.
    pub instrument: InstrumentId,
    /// Direction of the leg.
    pub side: OrderSide,
    /// Target quantity to fill.
    pub target: Size,
    /// Instrument tick size.
    pub tick_size: Price,
    /// Current execution mode. Only ever advances Passive -> Aggressive.
    pub mode: ExecutionMode,
    /// Ordered attempt history.
    pub attempts: Vec<OrderAttempt>,
}

impl Leg {
    /// Create a leg in passive mode with no attempts.
    pub fn new(instrument: InstrumentId, side: OrderSide, target: Size, tick_size: Price) -> Self {
        Self {
            instrument,
            side,
            target,
            tick_size,
            mode: ExecutionMode::Passive,
            attempts: Vec::new(),
        }
    }

    /// Cumulative filled quantity across all attempts.
    pub fn filled(&self) -> Size {
        self.attempts
            .iter()
            .fold(Size::ZERO, |acc, a| acc + a.filled)
    }

    /// Unfilled remainder.
    pub fn remaining(&self) -> Size {
        self.target - self.filled()
    }

    /// True when the target is fully filled.
    pub fn is_filled(&self) -> bool {
        self.remaining() <= Size::ZERO && self.target.is_positive()
    }

    /// Fill-weighted average price across attempts. None if nothing filled.
    pub fn avg_fill_price(&self) -> Option<Price> {
        let filled = self.filled();
        if !filled.is_positive() {
            return None;
        }
        let cash: Decimal = self
            .attempts
            .iter()
            .map(|a| a.filled.inner() * a.avg_price.inner())
            .sum();
        Some(Price::new(cash / filled.inner()))
    }

    /// Total fees paid across attempts.
    pub fn fees_paid(&self) -> Decimal {
        self.attempts.iter().map(|a| a.fee_paid()).sum()
    }

    /// Signed cash flow of this leg: negative for buys, positive for sells,
    /// fees always subtracted.
    pub fn cash_flow(&self) -> Decimal {
        let gross: Decimal = self
            .attempts
            .iter()
            .map(|a| a.filled.inner() * a.avg_price.inner())
            .sum();
        let signed = match self.side {
            OrderSide::Buy => -gross,
            OrderSide::Sell => gross,
        };
        signed - self.fees_paid()
    }

    /// Record a completed attempt, enforcing the leg invariants:
    /// cumulative fill never exceeds the target, and the execution mode
    /// never regresses from aggressive back to passive.
    pub fn record_attempt(&mut self, attempt: OrderAttempt) -> Result<()> {
        if attempt.mode < self.mode {
            return Err(CoreError::ModeRegression {
                instrument: self.instrument.clone(),
                current: self.mode,
                attempted: attempt.mode,
            });
        }
        let new_filled = self.filled() + attempt.filled;
        if new_filled > self.target {
            return Err(CoreError::FillExceedsTarget {
                instrument: self.instrument.clone(),
                filled: new_filled,
                target: self.target,
            });
        }
        self.mode = attempt.mode;
        self.attempts.push(attempt);
        Ok(())
    }
}

/// Which half of the build/unwind alternation a cycle executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CyclePhase {
    /// Open the delta-neutral pair.
    Build,
    /// Close it back down.
    Unwind,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Build => write!(f, "build"),
            Self::Unwind => write!(f, "unwind"),
        }
    }
}

/// Entry ordering, alternated across cycles to avoid exchange-side
/// pattern heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleDirection {
    BuyFirst,
    SellFirst,
}

impl CycleDirection {
    /// The direction the next cycle should use.
    pub fn flipped(&self) -> Self {
        match self {
            Self::BuyFirst => Self::SellFirst,
            Self::SellFirst => Self::BuyFirst,
        }
    }
}

impl fmt::Display for CycleDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BuyFirst => write!(f, "buy_first"),
            Self::SellFirst => write!(f, "sell_first"),
        }
    }
}

/// Terminal classification of an executed cycle phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CycleOutcome {
    /// Both legs fully filled inside the protocol.
    Success,
    /// Both legs ended at zero fill after exhausting retries. No new
    /// exposure, no unwind needed.
    Failed,
    /// Exactly one leg filled; the filled leg was force-closed.
    /// `unwind_cost` is the realized cost of the forced close, kept
    /// separate from normal cycle PnL.
    AsymmetricRecovered { unwind_cost: Decimal },
}

impl CycleOutcome {
    /// Label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::AsymmetricRecovered { .. } => "asymmetric_recovered",
        }
    }
}

/// One BUILD or UNWIND execution over the pair.
///
/// Exclusively owned by the cycle controller for its duration; the
/// executor mutates only the cycle it was handed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cycle {
    /// Monotonic cycle id.
    pub id: u64,
    /// Build or unwind.
    pub phase: CyclePhase,
    /// Entry ordering for this cycle.
    pub direction: CycleDirection,
    /// The two legs. Index 0 dispatches first per `direction`.
    pub legs: [Leg; 2],
    /// When execution started.
    pub started_at: DateTime<Utc>,
    /// When execution finished, if it has.
    pub ended_at: Option<DateTime<Utc>>,
}

impl Cycle {
    pub fn new(id: u64, phase: CyclePhase, direction: CycleDirection, legs: [Leg; 2]) -> Self {
        Self {
            id,
            phase,
            direction,
            legs,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Net signed cash flow of both legs, fees included.
    pub fn cash_flow(&self) -> Decimal {
        self.legs.iter().map(|l| l.cash_flow()).sum()
    }

    pub fn mark_ended(&mut self) {
        self.ended_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn leg(side: OrderSide) -> Leg {
        Leg::new(
            InstrumentId::from("ETH-PERP"),
            side,
            Size::new(dec!(1.0)),
            Price::new(dec!(0.01)),
        )
    }

    fn attempt(mode: ExecutionMode, filled: Decimal, price: Decimal, fee: Decimal) -> OrderAttempt {
        OrderAttempt {
            mode,
            submitted: Size::new(filled),
            filled: Size::new(filled),
            avg_price: Price::new(price),
            status: OrderStatus::Filled,
            fee_rate: fee,
            submitted_at: Utc::now(),
        }
    }

    #[test]
    fn test_leg_fill_accumulation() {
        let mut leg = leg(OrderSide::Buy);
        leg.record_attempt(attempt(ExecutionMode::Passive, dec!(0.4), dec!(2000), dec!(0)))
            .unwrap();
        leg.record_attempt(attempt(
            ExecutionMode::Aggressive,
            dec!(0.6),
            dec!(2001),
            dec!(0),
        ))
        .unwrap();

        assert_eq!(leg.filled(), Size::new(dec!(1.0)));
        assert!(leg.is_filled());
        assert_eq!(leg.remaining(), Size::ZERO);
    }

    #[test]
    fn test_fill_exceeding_target_rejected() {
        let mut leg = leg(OrderSide::Buy);
        leg.record_attempt(attempt(ExecutionMode::Passive, dec!(0.8), dec!(2000), dec!(0)))
            .unwrap();
        let err = leg
            .record_attempt(attempt(
                ExecutionMode::Aggressive,
                dec!(0.3),
                dec!(2001),
                dec!(0),
            ))
            .unwrap_err();
        assert!(matches!(err, CoreError::FillExceedsTarget { .. }));
    }

    #[test]
    fn test_passive_after_aggressive_rejected() {
        let mut leg = leg(OrderSide::Sell);
        leg.record_attempt(attempt(
            ExecutionMode::Aggressive,
            dec!(0.2),
            dec!(2000),
            dec!(0),
        ))
        .unwrap();
        let err = leg
            .record_attempt(attempt(ExecutionMode::Passive, dec!(0.1), dec!(2000), dec!(0)))
            .unwrap_err();
        assert!(matches!(err, CoreError::ModeRegression { .. }));
    }

    #[test]
    fn test_avg_fill_price_weighted() {
        let mut leg = leg(OrderSide::Buy);
        leg.record_attempt(attempt(ExecutionMode::Passive, dec!(0.5), dec!(2000), dec!(0)))
            .unwrap();
        leg.record_attempt(attempt(
            ExecutionMode::Aggressive,
            dec!(0.5),
            dec!(2002),
            dec!(0),
        ))
        .unwrap();
        assert_eq!(leg.avg_fill_price().unwrap().inner(), dec!(2001));
    }

    #[test]
    fn test_cash_flow_uses_actual_fee_rates() {
        let mut buy = leg(OrderSide::Buy);
        buy.record_attempt(attempt(
            ExecutionMode::Passive,
            dec!(1.0),
            dec!(2000),
            dec!(0.0002),
        ))
        .unwrap();

        // -2000 notional - 0.4 fee
        assert_eq!(buy.cash_flow(), dec!(-2000.4));
    }

    #[test]
    fn test_direction_alternation() {
        assert_eq!(CycleDirection::BuyFirst.flipped(), CycleDirection::SellFirst);
        assert_eq!(CycleDirection::SellFirst.flipped(), CycleDirection::BuyFirst);
    }

    #[test]
    fn test_cycle_cash_flow_nets_legs() {
        let mut buy = leg(OrderSide::Buy);
        buy.record_attempt(attempt(ExecutionMode::Passive, dec!(1.0), dec!(2000), dec!(0)))
            .unwrap();
        let mut sell = Leg::new(
            InstrumentId::from("BTC-PERP"),
            OrderSide::Sell,
            Size::new(dec!(1.0)),
            Price::new(dec!(0.01)),
        );
        sell.record_attempt(attempt(ExecutionMode::Passive, dec!(1.0), dec!(2010), dec!(0)))
            .unwrap();

        let cycle = Cycle::new(1, CyclePhase::Build, CycleDirection::BuyFirst, [buy, sell]);
        assert_eq!(cycle.cash_flow(), dec!(10));
    }
}
