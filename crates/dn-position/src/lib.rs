//! Position tracking and remote reconciliation.
//!
//! The engine keeps a provisional local view of its positions, updated
//! from fills as they happen. The reconciliation monitor periodically
//! compares that view with the venue's authoritative numbers and treats
//! the venue as the source of truth whenever they disagree.

pub mod book;
pub mod error;
pub mod reconcile;

pub use book::{Position, PositionBook};
pub use error::{ReconcileError, ReconcileResult};
pub use reconcile::{DriftEvent, ReconcileReport, ReconcilerConfig, ReconciliationMonitor};
