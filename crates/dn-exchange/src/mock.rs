//! Scripted exchange mock for testing.
//!
//! Downstream crates drive their tests by scripting per-instrument poll
//! sequences and aggressive results, then asserting on the recorded
//! submissions and cancels.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use rust_decimal::Decimal;

use dn_core::{InstrumentId, Price, Quote, Size};

use crate::client::{
    AggressiveRequest, BoxFuture, CancelAck, ExchangeClient, OrderHandle, OrderRequest,
    OrderResult, OrderSnapshot,
};
use crate::error::{ExchangeError, ExchangeResult};

#[derive(Default)]
struct Inner {
    next_order_id: u64,
    passive_rejects: HashMap<InstrumentId, VecDeque<ExchangeError>>,
    status_scripts: HashMap<InstrumentId, VecDeque<OrderSnapshot>>,
    status_failures: HashMap<InstrumentId, u32>,
    last_status: HashMap<InstrumentId, OrderSnapshot>,
    aggressive_scripts: HashMap<InstrumentId, VecDeque<ExchangeResult<OrderResult>>>,
    positions: HashMap<InstrumentId, Decimal>,
    position_failures: u32,
    quotes: HashMap<InstrumentId, Quote>,
    passive_submits: Vec<OrderRequest>,
    aggressive_submits: Vec<AggressiveRequest>,
    cancels: Vec<OrderHandle>,
}

/// Scripted mock venue.
///
/// Status polls pop from a per-instrument queue; once the queue drains,
/// the last snapshot repeats (an order that filled stays filled). One
/// outstanding order per instrument, matching the engine's discipline.
#[derive(Default)]
pub struct MockExchange {
    inner: Mutex<Inner>,
}

impl MockExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue snapshots returned by successive `order_status` polls.
    pub fn script_status(&self, instrument: &InstrumentId, snapshots: Vec<OrderSnapshot>) {
        self.inner
            .lock()
            .status_scripts
            .entry(instrument.clone())
            .or_default()
            .extend(snapshots);
    }

    /// Queue the result of the next aggressive submission.
    pub fn script_aggressive(&self, instrument: &InstrumentId, result: ExchangeResult<OrderResult>) {
        self.inner
            .lock()
            .aggressive_scripts
            .entry(instrument.clone())
            .or_default()
            .push_back(result);
    }

    /// Fail the next `n` status polls for `instrument` with a
    /// connectivity error, once its scripted snapshots are drained.
    pub fn fail_status_polls(&self, instrument: &InstrumentId, n: u32) {
        self.inner
            .lock()
            .status_failures
            .insert(instrument.clone(), n);
    }

    /// Make the next passive submission for `instrument` fail.
    pub fn script_passive_reject(&self, instrument: &InstrumentId, err: ExchangeError) {
        self.inner
            .lock()
            .passive_rejects
            .entry(instrument.clone())
            .or_default()
            .push_back(err);
    }

    /// Set the authoritative signed position.
    pub fn set_position(&self, instrument: &InstrumentId, qty: Decimal) {
        self.inner.lock().positions.insert(instrument.clone(), qty);
    }

    /// Fail the next `n` position queries with a connectivity error.
    pub fn fail_position_queries(&self, n: u32) {
        self.inner.lock().position_failures = n;
    }

    /// Set the BBO returned for an instrument.
    pub fn set_quote(&self, instrument: &InstrumentId, bid: Price, ask: Price) {
        self.inner
            .lock()
            .quotes
            .insert(instrument.clone(), Quote::new(bid, ask));
    }

    /// Recorded passive submissions, in order.
    pub fn passive_submits(&self) -> Vec<OrderRequest> {
        self.inner.lock().passive_submits.clone()
    }

    /// Recorded aggressive submissions, in order.
    pub fn aggressive_submits(&self) -> Vec<AggressiveRequest> {
        self.inner.lock().aggressive_submits.clone()
    }

    /// Recorded cancels, in order.
    pub fn cancels(&self) -> Vec<OrderHandle> {
        self.inner.lock().cancels.clone()
    }
}

impl ExchangeClient for MockExchange {
    fn submit_passive(&self, req: OrderRequest) -> BoxFuture<'_, ExchangeResult<OrderHandle>> {
        Box::pin(async move {
            let mut inner = self.inner.lock();
            if let Some(err) = inner
                .passive_rejects
                .get_mut(&req.instrument)
                .and_then(|q| q.pop_front())
            {
                return Err(err);
            }
            inner.next_order_id += 1;
            let handle = OrderHandle {
                order_id: inner.next_order_id,
                cloid: req.cloid.clone(),
                instrument: req.instrument.clone(),
            };
            inner.passive_submits.push(req);
            Ok(handle)
        })
    }

    fn submit_aggressive(
        &self,
        req: AggressiveRequest,
    ) -> BoxFuture<'_, ExchangeResult<OrderResult>> {
        Box::pin(async move {
            let mut inner = self.inner.lock();
            let result = inner
                .aggressive_scripts
                .get_mut(&req.instrument)
                .and_then(|q| q.pop_front())
                .unwrap_or(Err(ExchangeError::Rejected {
                    reason: "unscripted aggressive order".to_string(),
                }));
            inner.aggressive_submits.push(req);
            result
        })
    }

    fn cancel_order(&self, handle: &OrderHandle) -> BoxFuture<'_, ExchangeResult<CancelAck>> {
        let handle = handle.clone();
        Box::pin(async move {
            self.inner.lock().cancels.push(handle);
            Ok(CancelAck { cancelled: true })
        })
    }

    fn order_status(&self, handle: &OrderHandle) -> BoxFuture<'_, ExchangeResult<OrderSnapshot>> {
        let instrument = handle.instrument.clone();
        Box::pin(async move {
            let mut inner = self.inner.lock();
            if let Some(snap) = inner
                .status_scripts
                .get_mut(&instrument)
                .and_then(|q| q.pop_front())
            {
                inner.last_status.insert(instrument, snap.clone());
                return Ok(snap);
            }
            if let Some(n) = inner.status_failures.get_mut(&instrument) {
                if *n > 0 {
                    *n -= 1;
                    return Err(ExchangeError::Connectivity("status poll failed".into()));
                }
            }
            Ok(inner
                .last_status
                .get(&instrument)
                .cloned()
                .unwrap_or_else(OrderSnapshot::open))
        })
    }

    fn position(&self, instrument: &InstrumentId) -> BoxFuture<'_, ExchangeResult<Decimal>> {
        let instrument = instrument.clone();
        Box::pin(async move {
            let mut inner = self.inner.lock();
            if inner.position_failures > 0 {
                inner.position_failures -= 1;
                return Err(ExchangeError::Connectivity("position query failed".into()));
            }
            Ok(inner.positions.get(&instrument).copied().unwrap_or_default())
        })
    }

    fn bbo(&self, instrument: &InstrumentId) -> BoxFuture<'_, ExchangeResult<Quote>> {
        let instrument = instrument.clone();
        Box::pin(async move {
            self.inner
                .lock()
                .quotes
                .get(&instrument)
                .cloned()
                .ok_or_else(|| ExchangeError::Connectivity(format!("no quote for {instrument}")))
        })
    }
}
