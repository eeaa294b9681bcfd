//! Error types for dn-core.

use crate::{ExecutionMode, InstrumentId, Size};
use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("fill {filled} exceeds target {target} on {instrument}")]
    FillExceedsTarget {
        instrument: InstrumentId,
        filled: Size,
        target: Size,
    },

    #[error("execution mode regression on {instrument}: {current} -> {attempted}")]
    ModeRegression {
        instrument: InstrumentId,
        current: ExecutionMode,
        attempted: ExecutionMode,
    },

    #[error("decimal parse error: {0}")]
    DecimalParse(#[from] rust_decimal::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
