//! Application crate: configuration, cycle controller, and the run loop.

pub mod app;
pub mod config;
pub mod controller;
pub mod error;

pub use app::Application;
pub use config::{AppConfig, InstrumentConfig, OperatingMode, PairConfig};
pub use controller::{CycleController, CycleStatus};
pub use error::{AppError, AppResult};
