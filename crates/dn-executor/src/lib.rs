//! Dual-leg synchronized execution.
//!
//! [`DualLegExecutor`] dispatches both legs of a cycle concurrently,
//! polls fills, escalates from passive to aggressive pricing on timeout,
//! classifies symmetric vs asymmetric outcomes, and force-closes an
//! orphaned leg via emergency unwind.

pub mod error;
pub mod executor;
pub mod unwind;

pub use error::{ExecutorError, ExecutorResult};
pub use executor::{DualLegExecutor, ExecutorConfig, LegError, LegReport};
pub use unwind::{UnwindConfig, UnwindReport};
