//! Position caps and the daily loss floor.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use dn_core::InstrumentId;

use crate::halt::{HaltLatch, HaltReason};

/// Loss limits. Position caps are per instrument and supplied
/// separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// Daily realized PnL at or below this trips the halt latch.
    /// Negative, in quote currency. Default: -500.
    #[serde(default = "default_daily_loss_floor")]
    pub daily_loss_floor: Decimal,
}

fn default_daily_loss_floor() -> Decimal {
    Decimal::new(-500, 0)
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            daily_loss_floor: default_daily_loss_floor(),
        }
    }
}

/// A cycle refused before submission: its projected exposure would
/// breach a cap. A veto pauses nothing; the next cycle is re-checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleVeto {
    pub instrument: InstrumentId,
    pub projected: Decimal,
    pub cap: Decimal,
}

impl fmt::Display for CycleVeto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "projected position {} on {} exceeds cap {}",
            self.projected, self.instrument, self.cap
        )
    }
}

struct DayState {
    date: NaiveDate,
    realized_pnl: Decimal,
}

/// Enforces position caps and the daily loss floor.
///
/// Projected breaches veto the cycle; observed breaches and floor
/// breaches trip the shared halt latch.
pub struct SafetyGovernor {
    config: SafetyConfig,
    caps: HashMap<InstrumentId, Decimal>,
    latch: Arc<HaltLatch>,
    day: Mutex<DayState>,
}

impl SafetyGovernor {
    pub fn new(
        config: SafetyConfig,
        caps: HashMap<InstrumentId, Decimal>,
        latch: Arc<HaltLatch>,
    ) -> Self {
        Self {
            config,
            caps,
            latch,
            day: Mutex::new(DayState {
                date: Utc::now().date_naive(),
                realized_pnl: Decimal::ZERO,
            }),
        }
    }

    #[must_use]
    pub fn can_trade(&self) -> bool {
        !self.latch.is_halted()
    }

    #[must_use]
    pub fn latch(&self) -> &Arc<HaltLatch> {
        &self.latch
    }

    /// Pre-trade check: would the projected signed positions stay inside
    /// their caps?
    pub fn precheck_exposure(
        &self,
        projected: &[(InstrumentId, Decimal)],
    ) -> Result<(), CycleVeto> {
        for (instrument, position) in projected {
            if let Some(cap) = self.caps.get(instrument) {
                if position.abs() > *cap {
                    let veto = CycleVeto {
                        instrument: instrument.clone(),
                        projected: *position,
                        cap: *cap,
                    };
                    warn!(%veto, "Cycle vetoed");
                    return Err(veto);
                }
            }
        }
        Ok(())
    }

    /// Post-reconciliation check of observed positions. A breach here
    /// means exposure already exists, so it halts rather than vetoes.
    pub fn check_observed(&self, observed: &[(InstrumentId, Decimal)]) {
        for (instrument, position) in observed {
            if let Some(cap) = self.caps.get(instrument) {
                if position.abs() > *cap {
                    self.latch.trip(HaltReason::PositionCap {
                        instrument: instrument.clone(),
                        position: *position,
                        cap: *cap,
                    });
                    return;
                }
            }
        }
    }

    /// Fold a cycle's realized PnL into the daily total and enforce the
    /// loss floor. The floor is inclusive: landing exactly on it halts.
    /// Returns the running total for the day.
    pub fn record_pnl(&self, pnl: Decimal) -> Decimal {
        self.record_pnl_on(pnl, Utc::now().date_naive())
    }

    /// Test seam for `record_pnl`, taking the date explicitly.
    pub fn record_pnl_on(&self, pnl: Decimal, today: NaiveDate) -> Decimal {
        self.roll_day(today);
        let mut day = self.day.lock();
        day.realized_pnl += pnl;
        let total = day.realized_pnl;
        drop(day);

        debug!(cycle_pnl = %pnl, daily_pnl = %total, "Daily PnL updated");
        if total <= self.config.daily_loss_floor {
            self.latch.trip(HaltReason::DailyLossFloor {
                pnl: total,
                floor: self.config.daily_loss_floor,
            });
        }
        total
    }

    /// Close out the tracked day if `today` has moved past it. Resets
    /// the daily PnL only; a tripped latch stays tripped across days.
    pub fn roll_day(&self, today: NaiveDate) {
        let mut day = self.day.lock();
        if day.date != today {
            info!(
                old_date = %day.date,
                new_date = %today,
                closed_pnl = %day.realized_pnl,
                "Daily PnL rolled"
            );
            day.date = today;
            day.realized_pnl = Decimal::ZERO;
        }
    }

    /// Running realized PnL for the current day.
    #[must_use]
    pub fn daily_pnl(&self) -> Decimal {
        self.day.lock().realized_pnl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn eth() -> InstrumentId {
        InstrumentId::from("ETH-PERP")
    }

    fn governor(floor: Decimal, cap: Decimal) -> SafetyGovernor {
        let mut caps = HashMap::new();
        caps.insert(eth(), cap);
        SafetyGovernor::new(
            SafetyConfig {
                daily_loss_floor: floor,
            },
            caps,
            Arc::new(HaltLatch::new()),
        )
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, d).unwrap()
    }

    #[test]
    fn test_precheck_vetoes_over_cap() {
        let gov = governor(dec!(-500), dec!(0.1));

        assert!(gov.precheck_exposure(&[(eth(), dec!(0.09))]).is_ok());
        let veto = gov
            .precheck_exposure(&[(eth(), dec!(-0.11))])
            .unwrap_err();
        assert_eq!(veto.cap, dec!(0.1));
        // A veto is not a halt.
        assert!(gov.can_trade());
    }

    #[test]
    fn test_observed_breach_halts() {
        let gov = governor(dec!(-500), dec!(0.1));
        gov.check_observed(&[(eth(), dec!(0.15))]);

        assert!(!gov.can_trade());
        assert!(matches!(
            gov.latch().reason(),
            Some(HaltReason::PositionCap { .. })
        ));
    }

    #[test]
    fn test_loss_floor_halts_at_boundary() {
        let gov = governor(dec!(-500), dec!(1));

        gov.record_pnl_on(dec!(-499.99), day(31));
        assert!(gov.can_trade());

        // Landing exactly on the floor halts: the boundary is inclusive.
        let total = gov.record_pnl_on(dec!(-0.01), day(31));
        assert_eq!(total, dec!(-500.00));
        assert!(!gov.can_trade());
        assert!(matches!(
            gov.latch().reason(),
            Some(HaltReason::DailyLossFloor { floor, .. }) if floor == dec!(-500)
        ));
    }

    #[test]
    fn test_day_roll_resets_pnl_but_not_halt() {
        let gov = governor(dec!(-100), dec!(1));
        gov.record_pnl_on(dec!(-150), day(30));
        assert!(!gov.can_trade());

        // New day: the counter resets, the halt does not.
        let total = gov.record_pnl_on(dec!(10), day(31));
        assert_eq!(total, dec!(10));
        assert!(!gov.can_trade());

        gov.latch().reset();
        assert!(gov.can_trade());
    }

    #[test]
    fn test_profit_offsets_losses_within_day() {
        let gov = governor(dec!(-100), dec!(1));
        gov.record_pnl_on(dec!(-80), day(31));
        gov.record_pnl_on(dec!(50), day(31));
        gov.record_pnl_on(dec!(-60), day(31));

        assert_eq!(gov.daily_pnl(), dec!(-90));
        assert!(gov.can_trade());
    }

    #[test]
    fn test_uncapped_instrument_passes_precheck() {
        let gov = governor(dec!(-500), dec!(0.1));
        let btc = InstrumentId::from("BTC-PERP");
        assert!(gov.precheck_exposure(&[(btc, dec!(100))]).is_ok());
    }
}
