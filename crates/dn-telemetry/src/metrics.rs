//! Prometheus metrics for the dual-leg engine.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A registration
//! failure means duplicate metric names, which should crash at startup
//! rather than fail silently. These panics only occur during static
//! initialization, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, register_int_gauge, CounterVec,
    Gauge, HistogramVec, IntGauge,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Completed cycles by outcome.
/// Labels: outcome (success/failed/asymmetric_recovered/vetoed)
pub static CYCLES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!("dn_cycles_total", "Completed cycles by outcome", &["outcome"]).unwrap()
});

/// Passive-to-aggressive escalations.
pub static ESCALATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "dn_escalations_total",
        "Passive-to-aggressive escalations",
        &["instrument"]
    )
    .unwrap()
});

/// Emergency unwinds triggered.
pub static UNWINDS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "dn_unwinds_total",
        "Emergency unwinds of one-sided fills",
        &["instrument"]
    )
    .unwrap()
});

/// Position drift events detected by reconciliation.
pub static DRIFT_EVENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "dn_drift_events_total",
        "Local/remote position drift events",
        &["instrument"]
    )
    .unwrap()
});

/// Halt latch trips by reason.
pub static HALTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!("dn_halts_total", "Halt latch trips", &["reason"]).unwrap()
});

/// Daily realized PnL in quote currency.
pub static DAILY_PNL: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("dn_daily_pnl", "Daily realized PnL in quote currency").unwrap()
});

/// Engine paused state (1 = paused for reconciliation).
pub static PAUSED: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("dn_paused", "Engine paused for position reconciliation").unwrap()
});

/// Time from first submission to full fill, per leg.
pub static LEG_FILL_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "dn_leg_fill_latency_ms",
        "Time from first submission to full leg fill in milliseconds",
        &["instrument", "mode"],
        vec![50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0]
    )
    .unwrap()
});

/// Facade for recording metrics.
pub struct Metrics;

impl Metrics {
    /// Record a completed cycle.
    pub fn cycle(outcome: &str) {
        CYCLES_TOTAL.with_label_values(&[outcome]).inc();
    }

    /// Record a passive-to-aggressive escalation.
    pub fn escalation(instrument: &str) {
        ESCALATIONS_TOTAL.with_label_values(&[instrument]).inc();
    }

    /// Record an emergency unwind.
    pub fn unwind(instrument: &str) {
        UNWINDS_TOTAL.with_label_values(&[instrument]).inc();
    }

    /// Record a position drift event.
    pub fn drift(instrument: &str) {
        DRIFT_EVENTS_TOTAL.with_label_values(&[instrument]).inc();
    }

    /// Record a halt latch trip.
    pub fn halt(reason: &str) {
        HALTS_TOTAL.with_label_values(&[reason]).inc();
    }

    /// Set the daily PnL gauge.
    pub fn daily_pnl(pnl: Decimal) {
        DAILY_PNL.set(pnl.to_f64().unwrap_or(0.0));
    }

    /// Mark the engine paused or resumed.
    pub fn paused(paused: bool) {
        PAUSED.set(if paused { 1 } else { 0 });
    }

    /// Record leg fill latency.
    pub fn leg_fill_latency(instrument: &str, mode: &str, latency_ms: f64) {
        LEG_FILL_LATENCY_MS
            .with_label_values(&[instrument, mode])
            .observe(latency_ms);
    }
}
