//! Sticky halt latch.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use dn_core::InstrumentId;

/// Why trading was halted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HaltReason {
    /// Daily realized PnL fell to or below the configured floor.
    DailyLossFloor { pnl: Decimal, floor: Decimal },
    /// A position breached its per-instrument cap.
    PositionCap {
        instrument: InstrumentId,
        position: Decimal,
        cap: Decimal,
    },
    /// An emergency unwind could not flatten a one-sided fill.
    UnwindFailed { instrument: InstrumentId },
    /// Reconciliation lost contact with the venue.
    ReconcileConnectivity { detail: String },
    /// Operator-initiated halt.
    Manual { message: String },
}

impl HaltReason {
    /// Label used in metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::DailyLossFloor { .. } => "daily_loss_floor",
            Self::PositionCap { .. } => "position_cap",
            Self::UnwindFailed { .. } => "unwind_failed",
            Self::ReconcileConnectivity { .. } => "reconcile_connectivity",
            Self::Manual { .. } => "manual",
        }
    }
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DailyLossFloor { pnl, floor } => {
                write!(f, "daily PnL {pnl} breached floor {floor}")
            }
            Self::PositionCap {
                instrument,
                position,
                cap,
            } => write!(f, "position {position} on {instrument} breached cap {cap}"),
            Self::UnwindFailed { instrument } => {
                write!(f, "emergency unwind failed on {instrument}")
            }
            Self::ReconcileConnectivity { detail } => {
                write!(f, "reconciliation connectivity lost: {detail}")
            }
            Self::Manual { message } => write!(f, "manual: {message}"),
        }
    }
}

/// Once tripped, stays tripped until an operator resets it.
///
/// Thread-safe; share via `Arc<HaltLatch>`.
pub struct HaltLatch {
    halted: AtomicBool,
    /// Unix millis of the trip, 0 when clear.
    halted_at: AtomicU64,
    reason: RwLock<Option<HaltReason>>,
}

impl Default for HaltLatch {
    fn default() -> Self {
        Self::new()
    }
}

impl HaltLatch {
    #[must_use]
    pub fn new() -> Self {
        Self {
            halted: AtomicBool::new(false),
            halted_at: AtomicU64::new(0),
            reason: RwLock::new(None),
        }
    }

    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Trip the latch. A second trip is a no-op; the first reason wins.
    /// Returns true if this call did the tripping.
    pub fn trip(&self, reason: HaltReason) -> bool {
        if self
            .halted
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0);
            self.halted_at.store(now, Ordering::SeqCst);
            *self.reason.write() = Some(reason.clone());

            error!(reason = %reason, "TRADING HALTED");
            true
        } else {
            warn!(new_reason = %reason, "Halt latch already tripped, keeping original reason");
            false
        }
    }

    /// Unix millis of the trip, `None` when clear.
    #[must_use]
    pub fn halted_at(&self) -> Option<u64> {
        if self.is_halted() {
            let ts = self.halted_at.load(Ordering::SeqCst);
            if ts > 0 {
                return Some(ts);
            }
        }
        None
    }

    #[must_use]
    pub fn reason(&self) -> Option<HaltReason> {
        if self.is_halted() {
            self.reason.read().clone()
        } else {
            None
        }
    }

    /// Operator reset. Never called from engine code paths; the latch
    /// does not auto-reset.
    pub fn reset(&self) {
        if self.is_halted() {
            let reason = self.reason.read().clone();
            info!(previous_reason = ?reason, "Halt latch manually reset");

            self.halted.store(false, Ordering::SeqCst);
            self.halted_at.store(0, Ordering::SeqCst);
            *self.reason.write() = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_latch_initially_clear() {
        let latch = HaltLatch::new();
        assert!(!latch.is_halted());
        assert!(latch.halted_at().is_none());
        assert!(latch.reason().is_none());
    }

    #[test]
    fn test_trip_and_reset() {
        let latch = HaltLatch::new();
        assert!(latch.trip(HaltReason::Manual {
            message: "drill".to_string(),
        }));
        assert!(latch.is_halted());
        assert!(latch.halted_at().is_some());

        latch.reset();
        assert!(!latch.is_halted());
        assert!(latch.reason().is_none());
    }

    #[test]
    fn test_second_trip_keeps_first_reason() {
        let latch = HaltLatch::new();
        latch.trip(HaltReason::DailyLossFloor {
            pnl: dec!(-501),
            floor: dec!(-500),
        });
        assert!(!latch.trip(HaltReason::Manual {
            message: "late".to_string(),
        }));

        assert!(matches!(
            latch.reason(),
            Some(HaltReason::DailyLossFloor { .. })
        ));
    }
}
