//! Core domain types for the delta-neutral pair cycle engine.
//!
//! This crate provides fundamental types used throughout the system:
//! - `Price`, `Size`: precision-safe numeric types
//! - `InstrumentId`: venue instrument identifier
//! - `Quote`: best bid/offer with staleness tracking
//! - `Leg`, `OrderAttempt`, `Cycle`: the execution data model

pub mod cycle;
pub mod decimal;
pub mod error;
pub mod order;
pub mod quote;

pub use cycle::{Cycle, CycleDirection, CycleOutcome, CyclePhase, Leg, OrderAttempt};
pub use decimal::{Price, Size};
pub use error::{CoreError, Result};
pub use order::{ClientOrderId, ExecutionMode, InstrumentId, OrderSide, OrderStatus};
pub use quote::Quote;
