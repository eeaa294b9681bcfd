//! Emergency unwind of a one-sided fill.
//!
//! When a cycle ends with exactly one leg holding exposure, that leg is
//! force-closed with aggressive orders on the opposite side. Slippage
//! tolerance widens on each retry so a thinning book cannot strand the
//! position.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use dn_core::{ClientOrderId, ExecutionMode, Leg, OrderAttempt, Size};
use dn_exchange::AggressiveRequest;

use crate::error::{ExecutorError, ExecutorResult};
use crate::executor::DualLegExecutor;

/// Emergency unwind parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnwindConfig {
    /// Retries after the first close attempt. Default: 2.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Slippage tolerance for the first close attempt (bps).
    #[serde(default = "default_base_slippage_bps")]
    pub base_slippage_bps: u32,
    /// Added to the tolerance on each retry (bps).
    #[serde(default = "default_widen_slippage_bps")]
    pub widen_slippage_bps: u32,
}

fn default_max_retries() -> u32 {
    2
}

fn default_base_slippage_bps() -> u32 {
    50
}

fn default_widen_slippage_bps() -> u32 {
    25
}

impl Default for UnwindConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_slippage_bps: default_base_slippage_bps(),
            widen_slippage_bps: default_widen_slippage_bps(),
        }
    }
}

/// Result of a completed emergency unwind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnwindReport {
    /// Quantity closed.
    pub closed: Size,
    /// Close attempts issued.
    pub attempts: u32,
    /// Realized cash flow of the round trip (entry plus forced close),
    /// fees included. Negative is a loss.
    pub cost: Decimal,
}

impl DualLegExecutor {
    /// Force-close the filled quantity of `leg` with aggressive orders on
    /// the opposite side.
    ///
    /// Returns `Err(UnwindFailed)` if quantity is still open after the
    /// retry budget; that error is fatal to the engine and must halt
    /// trading upstream.
    pub(crate) async fn unwind_leg(
        &self,
        cycle_id: u64,
        leg: &mut Leg,
    ) -> ExecutorResult<UnwindReport> {
        let cfg = &self.config().unwind;
        let exposure = leg.filled();
        let close_side = leg.side.opposite();

        warn!(
            cycle_id,
            instrument = %leg.instrument,
            exposure = %exposure,
            close_side = %close_side,
            "Emergency unwind triggered"
        );

        // The close is tracked as its own leg so the fill-accumulation
        // invariants apply to it too.
        let mut close = Leg::new(leg.instrument.clone(), close_side, exposure, leg.tick_size);
        let mut attempts = 0u32;

        for retry in 0..=cfg.max_retries {
            let remaining = close.remaining();
            if !remaining.is_positive() {
                break;
            }
            let slippage_bps = cfg.base_slippage_bps + cfg.widen_slippage_bps * retry;
            attempts += 1;

            info!(
                cycle_id,
                instrument = %close.instrument,
                attempt = attempts,
                remaining = %remaining,
                slippage_bps,
                "Submitting unwind order"
            );

            let req = AggressiveRequest {
                cloid: ClientOrderId::new(),
                instrument: close.instrument.clone(),
                side: close.side,
                qty: remaining,
                max_slippage_bps: slippage_bps,
            };
            let submitted_at = Utc::now();

            match self.exchange().submit_aggressive(req).await {
                Ok(result) => {
                    close.record_attempt(OrderAttempt {
                        mode: ExecutionMode::Aggressive,
                        submitted: remaining,
                        filled: result.filled,
                        avg_price: result.avg_price,
                        status: result.status,
                        fee_rate: result.fee_rate,
                        submitted_at,
                    })?;
                }
                Err(e) => {
                    warn!(
                        cycle_id,
                        instrument = %close.instrument,
                        attempt = attempts,
                        ?e,
                        "Unwind order failed"
                    );
                }
            }
        }

        if !close.is_filled() {
            return Err(ExecutorError::UnwindFailed {
                instrument: close.instrument.clone(),
                remaining: close.remaining(),
                attempts,
            });
        }

        let cost = leg.cash_flow() + close.cash_flow();
        info!(
            cycle_id,
            instrument = %close.instrument,
            closed = %close.filled(),
            attempts,
            cost = %cost,
            "Emergency unwind complete"
        );

        Ok(UnwindReport {
            closed: close.filled(),
            attempts,
            cost,
        })
    }
}
