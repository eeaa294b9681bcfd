//! In-process simulated venue for dry runs.
//!
//! Fills every passive order at its limit price on the first status
//! poll and every aggressive order at the touch, tracks signed
//! positions, and serves a fixed two-tick-wide book around a
//! configurable mid. Good enough to exercise the full cycle loop
//! without a transport.

use std::collections::HashMap;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::debug;

use dn_core::{InstrumentId, OrderSide, OrderStatus, Price, Quote, Size};

use crate::client::{
    AggressiveRequest, BoxFuture, CancelAck, ExchangeClient, OrderHandle, OrderRequest,
    OrderResult, OrderSnapshot,
};
use crate::error::{ExchangeError, ExchangeResult};

/// Book parameters for one simulated instrument.
#[derive(Debug, Clone)]
pub struct SimInstrument {
    pub mid: Price,
    pub tick_size: Price,
}

struct RestingOrder {
    instrument: InstrumentId,
    side: OrderSide,
    price: Price,
    qty: Size,
    filled: bool,
}

struct Inner {
    next_order_id: u64,
    orders: HashMap<u64, RestingOrder>,
    positions: HashMap<InstrumentId, Decimal>,
}

/// Deterministic simulated venue.
pub struct SimExchange {
    instruments: HashMap<InstrumentId, SimInstrument>,
    maker_fee_rate: Decimal,
    taker_fee_rate: Decimal,
    inner: Mutex<Inner>,
}

impl SimExchange {
    pub fn new(
        instruments: HashMap<InstrumentId, SimInstrument>,
        maker_fee_rate: Decimal,
        taker_fee_rate: Decimal,
    ) -> Self {
        Self {
            instruments,
            maker_fee_rate,
            taker_fee_rate,
            inner: Mutex::new(Inner {
                next_order_id: 0,
                orders: HashMap::new(),
                positions: HashMap::new(),
            }),
        }
    }

    fn instrument(&self, id: &InstrumentId) -> ExchangeResult<&SimInstrument> {
        self.instruments
            .get(id)
            .ok_or_else(|| ExchangeError::Rejected {
                reason: format!("unknown instrument {id}"),
            })
    }

    fn quote_for(&self, sim: &SimInstrument) -> Quote {
        Quote::new(
            sim.mid.offset_ticks(sim.tick_size, -1),
            sim.mid.offset_ticks(sim.tick_size, 1),
        )
    }

    fn apply_fill(inner: &mut Inner, instrument: &InstrumentId, side: OrderSide, qty: Size) {
        let pos = inner.positions.entry(instrument.clone()).or_default();
        *pos += Decimal::from(side.sign()) * qty.inner();
    }
}

impl ExchangeClient for SimExchange {
    fn submit_passive(&self, req: OrderRequest) -> BoxFuture<'_, ExchangeResult<OrderHandle>> {
        Box::pin(async move {
            self.instrument(&req.instrument)?;
            let mut inner = self.inner.lock();
            inner.next_order_id += 1;
            let order_id = inner.next_order_id;
            inner.orders.insert(
                order_id,
                RestingOrder {
                    instrument: req.instrument.clone(),
                    side: req.side,
                    price: req.price,
                    qty: req.qty,
                    filled: false,
                },
            );
            debug!(order_id, instrument = %req.instrument, "Sim passive order resting");
            Ok(OrderHandle {
                order_id,
                cloid: req.cloid,
                instrument: req.instrument,
            })
        })
    }

    fn submit_aggressive(
        &self,
        req: AggressiveRequest,
    ) -> BoxFuture<'_, ExchangeResult<OrderResult>> {
        Box::pin(async move {
            let sim = self.instrument(&req.instrument)?;
            let quote = self.quote_for(sim);
            let price = match req.side {
                OrderSide::Buy => quote.ask,
                OrderSide::Sell => quote.bid,
            };
            let mut inner = self.inner.lock();
            Self::apply_fill(&mut inner, &req.instrument, req.side, req.qty);
            debug!(instrument = %req.instrument, qty = %req.qty, %price, "Sim aggressive fill");
            Ok(OrderResult {
                status: OrderStatus::Filled,
                filled: req.qty,
                avg_price: price,
                fee_rate: self.taker_fee_rate,
            })
        })
    }

    fn cancel_order(&self, handle: &OrderHandle) -> BoxFuture<'_, ExchangeResult<CancelAck>> {
        let order_id = handle.order_id;
        Box::pin(async move {
            let mut inner = self.inner.lock();
            match inner.orders.remove(&order_id) {
                Some(order) if !order.filled => Ok(CancelAck { cancelled: true }),
                Some(_) => Ok(CancelAck { cancelled: false }),
                None => Err(ExchangeError::UnknownOrder),
            }
        })
    }

    fn order_status(&self, handle: &OrderHandle) -> BoxFuture<'_, ExchangeResult<OrderSnapshot>> {
        let order_id = handle.order_id;
        Box::pin(async move {
            let mut inner = self.inner.lock();
            let order = inner
                .orders
                .get_mut(&order_id)
                .ok_or(ExchangeError::UnknownOrder)?;

            // A resting order fills in full the first time it is polled.
            if !order.filled {
                order.filled = true;
                let (instrument, side, qty) =
                    (order.instrument.clone(), order.side, order.qty);
                Self::apply_fill(&mut inner, &instrument, side, qty);
            }
            let order = &inner.orders[&order_id];
            Ok(OrderSnapshot {
                status: OrderStatus::Filled,
                filled: order.qty,
                avg_price: order.price,
                fee_rate: self.maker_fee_rate,
                as_of: chrono::Utc::now(),
            })
        })
    }

    fn position(&self, instrument: &InstrumentId) -> BoxFuture<'_, ExchangeResult<Decimal>> {
        let instrument = instrument.clone();
        Box::pin(async move {
            Ok(self
                .inner
                .lock()
                .positions
                .get(&instrument)
                .copied()
                .unwrap_or_default())
        })
    }

    fn bbo(&self, instrument: &InstrumentId) -> BoxFuture<'_, ExchangeResult<Quote>> {
        let instrument = instrument.clone();
        Box::pin(async move {
            let sim = self.instrument(&instrument)?;
            Ok(self.quote_for(sim))
        })
    }
}
