//! Error types for dn-exchange.

use thiserror::Error;

/// Errors surfaced by the exchange client.
#[derive(Debug, Clone, Error)]
pub enum ExchangeError {
    /// Venue rejected the order outright. Nothing was placed.
    #[error("order rejected: {reason}")]
    Rejected { reason: String },

    /// Transport-level failure; the request may or may not have reached
    /// the venue.
    #[error("connectivity error: {0}")]
    Connectivity(String),

    /// The venue does not know the referenced order. For cancels this is
    /// treated as success (the order already reached a terminal state).
    #[error("unknown order")]
    UnknownOrder,
}

impl ExchangeError {
    /// True when retrying the same request may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connectivity(_))
    }
}

pub type ExchangeResult<T> = Result<T, ExchangeError>;
