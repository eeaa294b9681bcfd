//! Prometheus metrics, structured logging, and daily cycle statistics.

pub mod error;
pub mod logging;
pub mod metrics;
pub mod stats;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
pub use stats::{CycleRecord, DailySummary, LegFill, StatsReporter};
