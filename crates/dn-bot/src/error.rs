//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Core error: {0}")]
    Core(#[from] dn_core::CoreError),

    #[error("Exchange error: {0}")]
    Exchange(#[from] dn_exchange::ExchangeError),

    #[error("Pricing error: {0}")]
    Pricing(#[from] dn_pricing::PricingError),

    #[error("Executor error: {0}")]
    Executor(#[from] dn_executor::ExecutorError),

    #[error("Reconcile error: {0}")]
    Reconcile(#[from] dn_position::ReconcileError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] dn_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
