//! Periodic local/remote position reconciliation.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use dn_core::InstrumentId;
use dn_exchange::DynExchange;

use crate::book::PositionBook;
use crate::error::{ReconcileError, ReconcileResult};

/// Reconciliation cadence and tolerance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// How often to reconcile. Default: 10s.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Relative drift above which positions are declared out of sync.
    /// Default: 0.01 (1%).
    #[serde(default = "default_drift_tolerance")]
    pub drift_tolerance: Decimal,
    /// Position query attempts before giving up. Default: 5.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First retry backoff. Doubles per retry. Default: 1s.
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    /// Backoff ceiling. Default: 30s.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_interval_ms() -> u64 {
    10_000
}

fn default_drift_tolerance() -> Decimal {
    Decimal::new(1, 2)
}

fn default_max_retries() -> u32 {
    5
}

fn default_base_backoff_ms() -> u64 {
    1_000
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            drift_tolerance: default_drift_tolerance(),
            max_retries: default_max_retries(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl ReconcilerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// One instrument whose local view disagreed with the venue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriftEvent {
    pub instrument: InstrumentId,
    pub local: Decimal,
    pub remote: Decimal,
    /// Relative drift that tripped the tolerance.
    pub drift: Decimal,
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReconcileReport {
    /// Instruments checked.
    pub checked: usize,
    /// Drift events; empty means the books agree.
    pub drifts: Vec<DriftEvent>,
}

impl ReconcileReport {
    pub fn in_sync(&self) -> bool {
        self.drifts.is_empty()
    }
}

/// Compares the local book against the venue and resolves disagreements
/// in the venue's favor.
pub struct ReconciliationMonitor {
    exchange: DynExchange,
    config: ReconcilerConfig,
}

impl ReconciliationMonitor {
    pub fn new(exchange: DynExchange, config: ReconcilerConfig) -> Self {
        Self { exchange, config }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Run one reconciliation pass over every tracked instrument.
    ///
    /// The local view is overwritten with the remote read either way;
    /// drift beyond the tolerance is additionally reported so the caller
    /// can pause trading.
    pub async fn reconcile(&self, book: &mut PositionBook) -> ReconcileResult<ReconcileReport> {
        let instruments: Vec<InstrumentId> = book.instruments().cloned().collect();
        let mut report = ReconcileReport::default();

        for instrument in instruments {
            let remote = self.query_with_backoff(&instrument).await?;
            let local = book.local(&instrument);
            let drift = relative_drift(local, remote);

            if drift > self.config.drift_tolerance {
                warn!(
                    instrument = %instrument,
                    %local,
                    %remote,
                    %drift,
                    "Position drift detected, venue wins"
                );
                report.drifts.push(DriftEvent {
                    instrument: instrument.clone(),
                    local,
                    remote,
                    drift,
                });
            } else {
                debug!(instrument = %instrument, %local, %remote, "Positions in sync");
            }

            book.sync_remote(&instrument, remote);
            report.checked += 1;
        }

        Ok(report)
    }

    /// Query the remote position with exponential backoff between
    /// failed attempts.
    async fn query_with_backoff(&self, instrument: &InstrumentId) -> ReconcileResult<Decimal> {
        let mut backoff = Duration::from_millis(self.config.base_backoff_ms);
        let max_backoff = Duration::from_millis(self.config.max_backoff_ms);
        let mut last_error = String::new();

        for attempt in 1..=self.config.max_retries {
            match self.exchange.position(instrument).await {
                Ok(remote) => return Ok(remote),
                Err(e) => {
                    warn!(instrument = %instrument, attempt, ?e, "Position query failed");
                    last_error = e.to_string();
                    if attempt < self.config.max_retries {
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(max_backoff);
                    }
                }
            }
        }

        Err(ReconcileError::ConnectivityExhausted {
            instrument: instrument.clone(),
            attempts: self.config.max_retries,
            last_error,
        })
    }
}

/// Relative drift between local and remote, with the denominator floored
/// at 1 so near-zero positions do not blow the ratio up.
fn relative_drift(local: Decimal, remote: Decimal) -> Decimal {
    (local - remote).abs() / remote.abs().max(Decimal::ONE)
}
