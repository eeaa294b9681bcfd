//! Local position book, updated provisionally from fills.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use dn_core::{InstrumentId, OrderSide, Size};

/// Signed position in one instrument. Positive is long.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub instrument: InstrumentId,
    /// Provisional view, accumulated from our own fills.
    pub local: Decimal,
    /// Last authoritative value read from the venue.
    pub remote: Decimal,
    /// When `remote` was last refreshed.
    pub synced_at: Option<DateTime<Utc>>,
}

impl Position {
    fn new(instrument: InstrumentId) -> Self {
        Self {
            instrument,
            local: Decimal::ZERO,
            remote: Decimal::ZERO,
            synced_at: None,
        }
    }
}

/// Positions for every instrument the engine trades.
///
/// The local side is provisional bookkeeping only; reconciliation
/// overwrites it with the venue's numbers whenever they drift apart.
#[derive(Debug, Default)]
pub struct PositionBook {
    positions: HashMap<InstrumentId, Position>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an instrument so reconciliation covers it even before
    /// the first fill.
    pub fn track(&mut self, instrument: InstrumentId) {
        self.positions
            .entry(instrument.clone())
            .or_insert_with(|| Position::new(instrument));
    }

    /// Apply a fill to the local view.
    pub fn apply_fill(&mut self, instrument: &InstrumentId, side: OrderSide, qty: Size) {
        let pos = self
            .positions
            .entry(instrument.clone())
            .or_insert_with(|| Position::new(instrument.clone()));
        pos.local += Decimal::from(side.sign()) * qty.inner();
    }

    /// Local signed position, zero if untracked.
    pub fn local(&self, instrument: &InstrumentId) -> Decimal {
        self.positions
            .get(instrument)
            .map(|p| p.local)
            .unwrap_or_default()
    }

    /// Record an authoritative remote read and overwrite the local view
    /// with it.
    pub fn sync_remote(&mut self, instrument: &InstrumentId, remote: Decimal) {
        let pos = self
            .positions
            .entry(instrument.clone())
            .or_insert_with(|| Position::new(instrument.clone()));
        pos.remote = remote;
        pos.local = remote;
        pos.synced_at = Some(Utc::now());
    }

    pub fn get(&self, instrument: &InstrumentId) -> Option<&Position> {
        self.positions.get(instrument)
    }

    pub fn instruments(&self) -> impl Iterator<Item = &InstrumentId> {
        self.positions.keys()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
