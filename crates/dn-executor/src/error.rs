//! Error types for dn-executor.

use dn_core::{CoreError, InstrumentId, Size};
use thiserror::Error;

/// Executor failures.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Emergency unwind could not flatten the orphaned leg. The
    /// remaining exposure stays open and must be surfaced, never
    /// silently dropped.
    #[error("unwind failed on {instrument}: {remaining} still open after {attempts} attempts")]
    UnwindFailed {
        instrument: InstrumentId,
        remaining: Size,
        attempts: u32,
    },

    /// A leg invariant was violated while recording an attempt.
    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;
