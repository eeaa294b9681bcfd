//! Per-leg order pricing and sizing.
//!
//! Turns a target notional plus a live BBO into a priced, tick-rounded
//! [`dn_core::Leg`]. Rejects crossed, non-positive, or stale quotes so
//! the controller can skip the cycle before anything is placed.

pub mod engine;
pub mod error;

pub use engine::{PricingConfig, PricingEngine};
pub use error::{PricingError, PricingResult};
