//! Exchange client trait for order submission and queries.
//!
//! Trait-based abstraction over the venue API. This allows for:
//! - Dependency injection for testing
//! - Separation of execution logic from transport
//! - Future flexibility in transport implementation

use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use dn_core::{ClientOrderId, InstrumentId, OrderSide, OrderStatus, Price, Quote, Size};

use crate::error::ExchangeResult;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// A passive (resting) order to submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Client order ID for idempotency.
    pub cloid: ClientOrderId,
    /// Target instrument.
    pub instrument: InstrumentId,
    /// Order side.
    pub side: OrderSide,
    /// Limit price.
    pub price: Price,
    /// Order size.
    pub qty: Size,
}

/// An aggressive (crossing) order to submit.
///
/// The venue prices the crossing order; `max_slippage_bps` bounds how far
/// through the book it may sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggressiveRequest {
    /// Client order ID for idempotency.
    pub cloid: ClientOrderId,
    /// Target instrument.
    pub instrument: InstrumentId,
    /// Order side.
    pub side: OrderSide,
    /// Order size.
    pub qty: Size,
    /// Slippage tolerance in basis points from the touch.
    pub max_slippage_bps: u32,
}

/// Handle to a resting order, used for status polls and cancels.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderHandle {
    /// Venue-assigned order id.
    pub order_id: u64,
    /// Echo of the client order id.
    pub cloid: ClientOrderId,
    /// Instrument the order rests on.
    pub instrument: InstrumentId,
}

/// Point-in-time view of a resting order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    /// Current status.
    pub status: OrderStatus,
    /// Quantity filled so far.
    pub filled: Size,
    /// Average fill price (zero if nothing filled).
    pub avg_price: Price,
    /// Fee rate the venue applied to the fills so far.
    pub fee_rate: Decimal,
    /// When this snapshot was taken.
    pub as_of: DateTime<Utc>,
}

impl OrderSnapshot {
    /// Snapshot of an untouched open order.
    pub fn open() -> Self {
        Self {
            status: OrderStatus::Open,
            filled: Size::ZERO,
            avg_price: Price::ZERO,
            fee_rate: Decimal::ZERO,
            as_of: Utc::now(),
        }
    }
}

/// Final result of an aggressive order (venue settles it immediately).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderResult {
    /// Terminal status.
    pub status: OrderStatus,
    /// Quantity filled.
    pub filled: Size,
    /// Average fill price.
    pub avg_price: Price,
    /// Fee rate the venue actually applied.
    pub fee_rate: Decimal,
}

/// Cancel acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelAck {
    /// False if the order was already in a terminal state when the
    /// cancel arrived. Either way the order is no longer working.
    pub cancelled: bool,
}

/// Venue API consumed by the engine.
///
/// Cancellation is idempotent: cancelling an order that already filled or
/// expired returns `Ok` (or `UnknownOrder`, which callers treat as done).
pub trait ExchangeClient: Send + Sync {
    /// Submit a passive order; returns a handle for polling and cancels.
    fn submit_passive(&self, req: OrderRequest) -> BoxFuture<'_, ExchangeResult<OrderHandle>>;

    /// Submit an aggressive order; the venue settles it immediately.
    fn submit_aggressive(&self, req: AggressiveRequest)
        -> BoxFuture<'_, ExchangeResult<OrderResult>>;

    /// Cancel a resting order. Idempotent.
    fn cancel_order(&self, handle: &OrderHandle) -> BoxFuture<'_, ExchangeResult<CancelAck>>;

    /// Poll the current state of a resting order.
    fn order_status(&self, handle: &OrderHandle) -> BoxFuture<'_, ExchangeResult<OrderSnapshot>>;

    /// Authoritative signed position for an instrument.
    fn position(&self, instrument: &InstrumentId) -> BoxFuture<'_, ExchangeResult<Decimal>>;

    /// Current best bid/offer for an instrument.
    fn bbo(&self, instrument: &InstrumentId) -> BoxFuture<'_, ExchangeResult<Quote>>;
}

/// Arc wrapper for ExchangeClient trait objects.
pub type DynExchange = Arc<dyn ExchangeClient>;
