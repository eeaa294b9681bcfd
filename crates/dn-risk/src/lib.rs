//! Safety governor: position caps, daily loss floor, and the halt latch.
//!
//! Every halt is sticky. The latch only releases on an explicit operator
//! reset; nothing in the engine resets it automatically.

pub mod governor;
pub mod halt;

pub use governor::{CycleVeto, SafetyConfig, SafetyGovernor};
pub use halt::{HaltLatch, HaltReason};
