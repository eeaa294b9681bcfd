//! Error types for dn-pricing.

use thiserror::Error;

/// Pricing failures. All of these skip the cycle; nothing is placed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    #[error("invalid quote: {0}")]
    InvalidQuote(String),

    #[error("stale quote: age {age_ms}ms exceeds {max_age_ms}ms")]
    StaleQuote { age_ms: i64, max_age_ms: i64 },

    #[error("insufficient liquidity: {0}")]
    InsufficientLiquidity(String),
}

pub type PricingResult<T> = Result<T, PricingError>;
