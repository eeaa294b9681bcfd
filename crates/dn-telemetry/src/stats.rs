//! Daily cycle statistics output.
//!
//! Aggregates per-cycle results and logs a daily summary so a day of
//! trading can be reviewed without scraping Prometheus.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use dn_core::{CycleDirection, CyclePhase, ExecutionMode, InstrumentId, OrderSide, Price, Size};

use crate::metrics::Metrics;

/// Fill summary for one leg of a recorded cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegFill {
    pub instrument: InstrumentId,
    pub side: OrderSide,
    pub qty: Size,
    pub avg_price: Option<Price>,
    /// Final execution mode the leg reached.
    pub mode: ExecutionMode,
    pub fees: Decimal,
}

/// One completed cycle, as recorded for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleRecord {
    pub cycle_id: u64,
    pub phase: CyclePhase,
    pub direction: CycleDirection,
    pub legs: Vec<LegFill>,
    /// Outcome label (`success`, `failed`, `asymmetric_recovered`).
    pub outcome: String,
    /// Realized cash flow of the cycle, fees included.
    pub pnl: Decimal,
    /// Cost of the emergency unwind, when one ran.
    pub unwind_cost: Option<Decimal>,
    pub duration_ms: i64,
    pub ended_at: DateTime<Utc>,
}

/// Aggregate view over the recorded cycles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySummary {
    pub cycles: usize,
    pub success: usize,
    pub failed: usize,
    pub asymmetric_recovered: usize,
    pub total_pnl: Decimal,
    pub total_unwind_cost: Decimal,
    pub avg_duration_ms: i64,
}

/// Collects cycle records and produces the daily summary.
pub struct StatsReporter {
    start_time: DateTime<Utc>,
    records: Mutex<Vec<CycleRecord>>,
}

impl Default for StatsReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsReporter {
    pub fn new() -> Self {
        Self {
            start_time: Utc::now(),
            records: Mutex::new(Vec::new()),
        }
    }

    /// Log a completed cycle, update the cycle metrics, and retain the
    /// record for the daily summary.
    pub fn record_cycle(&self, record: CycleRecord) {
        info!(
            cycle_id = record.cycle_id,
            phase = %record.phase,
            direction = %record.direction,
            outcome = %record.outcome,
            pnl = %record.pnl,
            unwind_cost = ?record.unwind_cost,
            duration_ms = record.duration_ms,
            "Cycle recorded"
        );
        Metrics::cycle(&record.outcome);
        for leg in &record.legs {
            if leg.mode == ExecutionMode::Aggressive {
                Metrics::escalation(leg.instrument.as_str());
            }
            if leg.qty.is_positive() {
                Metrics::leg_fill_latency(
                    leg.instrument.as_str(),
                    &leg.mode.to_string(),
                    record.duration_ms as f64,
                );
            }
        }
        self.records.lock().push(record);
    }

    pub fn summary(&self) -> DailySummary {
        let records = self.records.lock();
        let cycles = records.len();
        let success = records.iter().filter(|r| r.outcome == "success").count();
        let failed = records.iter().filter(|r| r.outcome == "failed").count();
        let asymmetric_recovered = records
            .iter()
            .filter(|r| r.outcome == "asymmetric_recovered")
            .count();
        let total_pnl: Decimal = records.iter().map(|r| r.pnl).sum();
        let total_unwind_cost: Decimal =
            records.iter().filter_map(|r| r.unwind_cost).sum();
        let avg_duration_ms = if cycles > 0 {
            records.iter().map(|r| r.duration_ms).sum::<i64>() / cycles as i64
        } else {
            0
        };

        DailySummary {
            cycles,
            success,
            failed,
            asymmetric_recovered,
            total_pnl,
            total_unwind_cost,
            avg_duration_ms,
        }
    }

    /// Drop all records, typically on day roll.
    pub fn clear(&self) {
        self.records.lock().clear();
    }

    /// Output the summary to logs.
    pub fn output_daily_summary(&self) {
        let s = self.summary();
        let duration = Utc::now() - self.start_time;
        let hours = duration.num_hours();
        let minutes = duration.num_minutes() % 60;

        info!("========== Daily Cycle Summary ==========");
        info!(
            "Period: {} ({} hours {} minutes)",
            self.start_time.format("%Y-%m-%d %H:%M:%S UTC"),
            hours,
            minutes
        );
        info!(
            "  Cycles: {} (success: {}, failed: {}, asymmetric: {})",
            s.cycles, s.success, s.failed, s.asymmetric_recovered
        );
        info!("  Total PnL: {}", s.total_pnl);
        info!("  Unwind cost: {}", s.total_unwind_cost);
        info!("  Avg cycle duration: {} ms", s.avg_duration_ms);
        info!("=========================================");
    }

    /// JSON-formatted summary for external consumption.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "start_time": self.start_time,
            "summary": self.summary(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn record(id: u64, outcome: &str, pnl: Decimal, unwind_cost: Option<Decimal>) -> CycleRecord {
        CycleRecord {
            cycle_id: id,
            phase: CyclePhase::Build,
            direction: CycleDirection::BuyFirst,
            legs: vec![LegFill {
                instrument: InstrumentId::from("ETH-PERP"),
                side: OrderSide::Buy,
                qty: Size::new(dec!(0.05)),
                avg_price: Some(Price::new(dec!(2000))),
                mode: ExecutionMode::Passive,
                fees: dec!(0.02),
            }],
            outcome: outcome.to_string(),
            pnl,
            unwind_cost,
            duration_ms: 1_000,
            ended_at: Utc::now(),
        }
    }

    #[test]
    fn test_summary_aggregates_outcomes() {
        let reporter = StatsReporter::new();
        reporter.record_cycle(record(1, "success", dec!(0.5), None));
        reporter.record_cycle(record(2, "failed", dec!(0), None));
        reporter.record_cycle(record(3, "asymmetric_recovered", dec!(0), Some(dec!(-1.2))));

        let s = reporter.summary();
        assert_eq!(s.cycles, 3);
        assert_eq!(s.success, 1);
        assert_eq!(s.failed, 1);
        assert_eq!(s.asymmetric_recovered, 1);
        assert_eq!(s.total_pnl, dec!(0.5));
        assert_eq!(s.total_unwind_cost, dec!(-1.2));
    }

    #[test]
    fn test_empty_reporter_summary() {
        let reporter = StatsReporter::new();
        let s = reporter.summary();
        assert_eq!(s.cycles, 0);
        assert_eq!(s.avg_duration_ms, 0);
        assert_eq!(s.total_pnl, Decimal::ZERO);
    }

    #[test]
    fn test_clear_drops_records() {
        let reporter = StatsReporter::new();
        reporter.record_cycle(record(1, "success", dec!(1), None));
        reporter.clear();
        assert_eq!(reporter.summary().cycles, 0);
    }
}
