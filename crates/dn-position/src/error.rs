use thiserror::Error;

use dn_core::InstrumentId;

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Remote position queries kept failing past the retry budget.
    /// The local view can no longer be trusted; trading must pause.
    #[error("position query for {instrument} failed {attempts} times: {last_error}")]
    ConnectivityExhausted {
        instrument: InstrumentId,
        attempts: u32,
        last_error: String,
    },
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;
