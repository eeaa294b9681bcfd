//! Best bid/offer snapshot with staleness tracking.

use crate::Price;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Best bid and offer for an instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// Best bid price.
    pub bid: Price,
    /// Best ask price.
    pub ask: Price,
    /// Timestamp when this quote was received.
    pub received_at: DateTime<Utc>,
}

impl Quote {
    /// Create a new quote stamped with the current time.
    pub fn new(bid: Price, ask: Price) -> Self {
        Self {
            bid,
            ask,
            received_at: Utc::now(),
        }
    }

    /// Create a quote with an explicit receive timestamp.
    pub fn at(bid: Price, ask: Price, received_at: DateTime<Utc>) -> Self {
        Self {
            bid,
            ask,
            received_at,
        }
    }

    /// Both sides positive and bid strictly below ask.
    pub fn is_well_formed(&self) -> bool {
        self.bid.is_positive() && self.ask.is_positive() && self.bid < self.ask
    }

    /// Bid at or above ask.
    pub fn is_crossed(&self) -> bool {
        self.bid >= self.ask
    }

    /// Mid price: (bid + ask) / 2. None for a malformed quote.
    pub fn mid(&self) -> Option<Price> {
        if !self.is_well_formed() {
            return None;
        }
        Some(Price::new(
            (self.bid.inner() + self.ask.inner()) / rust_decimal::Decimal::TWO,
        ))
    }

    /// Age of this quote in milliseconds.
    pub fn age_ms(&self) -> i64 {
        (Utc::now() - self.received_at).num_milliseconds()
    }

    /// Check if the quote is older than `max_age_ms`.
    pub fn is_stale(&self, max_age_ms: i64) -> bool {
        self.age_ms() > max_age_ms
    }
}
