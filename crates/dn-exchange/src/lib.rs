//! Exchange client abstraction.
//!
//! The engine consumes the venue through the dyn-compatible
//! [`ExchangeClient`] trait; authentication, connection management, and
//! margin computation live behind it and are not part of this workspace.
//! A scripted [`mock::MockExchange`] is provided for tests across the
//! downstream crates.

pub mod client;
pub mod error;
pub mod mock;
pub mod sim;

pub use client::{
    AggressiveRequest, BoxFuture, CancelAck, DynExchange, ExchangeClient, OrderHandle,
    OrderRequest, OrderResult, OrderSnapshot,
};
pub use error::{ExchangeError, ExchangeResult};
