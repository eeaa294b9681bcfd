//! Application wiring and the main run loop.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use dn_core::{CyclePhase, Price};
use dn_exchange::sim::{SimExchange, SimInstrument};
use dn_exchange::DynExchange;
use dn_position::ReconciliationMonitor;
use dn_risk::{HaltLatch, SafetyGovernor};
use dn_telemetry::StatsReporter;

use crate::config::{AppConfig, InstrumentConfig, OperatingMode};
use crate::controller::{CycleController, CycleStatus};
use crate::error::{AppError, AppResult};

/// The assembled engine.
pub struct Application {
    config: AppConfig,
    controller: CycleController,
    stats: Arc<StatsReporter>,
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Application {
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let exchange = build_exchange(&config)?;
        let governor = Arc::new(SafetyGovernor::new(
            config.safety.clone(),
            config.position_caps(),
            Arc::new(HaltLatch::new()),
        ));
        let monitor = ReconciliationMonitor::new(exchange.clone(), config.reconciler.clone());
        let stats = Arc::new(StatsReporter::new());
        let controller =
            CycleController::new(&config, exchange, monitor, governor, stats.clone());

        info!(
            long = %config.pair.long.symbol,
            short = %config.pair.short.symbol,
            notional = %config.target_notional,
            mode = ?config.mode,
            "Engine assembled"
        );

        Ok(Self {
            config,
            controller,
            stats,
        })
    }

    /// Run until ctrl-c, a halt, or the configured cycle budget.
    pub async fn run(&mut self) -> AppResult<()> {
        info!("Starting cycle loop");

        // First reconciliation pass seeds the book from the venue and
        // lifts the initial pause.
        if let Err(e) = self.controller.reconcile_now().await {
            error!(%e, "Initial reconciliation failed");
            self.stats.output_daily_summary();
            return Err(e);
        }

        // The controller reconciles after every completed cycle; this
        // timer covers the stretches where no cycle completes (paused,
        // halted, or repeated skips).
        let mut reconcile_timer = tokio::time::interval(self.config.reconciler.interval());
        reconcile_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // interval() fires immediately; the seeding pass above already ran.
        reconcile_timer.tick().await;

        let mut completed: u64 = 0;
        loop {
            let delay = if self.controller.phase() == CyclePhase::Unwind {
                self.config.inter_phase_delay_ms
            } else {
                self.config.cycle_pause_ms
            };

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(delay)) => {
                    match self.controller.run_cycle().await {
                        Ok(CycleStatus::Completed(outcome)) => {
                            completed += 1;
                            info!(completed, outcome = outcome.label(), "Cycle finished");
                            if let Some(max) = self.config.max_cycles {
                                if completed >= max {
                                    info!(max, "Cycle budget reached, stopping");
                                    break;
                                }
                            }
                        }
                        Ok(CycleStatus::Halted) => {
                            error!("Trading halted, stopping cycle loop");
                            break;
                        }
                        Ok(CycleStatus::Paused) => {
                            info!("Cycles paused pending reconciliation");
                        }
                        Ok(CycleStatus::Skipped(reason)) => {
                            info!(%reason, "Cycle skipped");
                        }
                        Err(e) => {
                            error!(%e, "Cycle failed, stopping");
                            self.stats.output_daily_summary();
                            return Err(e);
                        }
                    }
                }
                _ = reconcile_timer.tick() => {
                    if let Err(e) = self.controller.reconcile_now().await {
                        error!(%e, "Reconciliation halted the engine");
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        self.stats.output_daily_summary();
        Ok(())
    }
}

fn build_exchange(config: &AppConfig) -> AppResult<DynExchange> {
    match config.mode {
        OperatingMode::Simulation => {
            let mut instruments = std::collections::HashMap::new();
            for leg in [&config.pair.long, &config.pair.short] {
                instruments.insert(leg.instrument(), sim_instrument(leg)?);
            }
            warn!("Running against the in-process simulated venue");
            Ok(Arc::new(SimExchange::new(
                instruments,
                config.sim_maker_fee_rate,
                config.sim_taker_fee_rate,
            )))
        }
        OperatingMode::Live => Err(AppError::Config(
            "live trading transport not configured".to_string(),
        )),
    }
}

fn sim_instrument(leg: &InstrumentConfig) -> AppResult<SimInstrument> {
    let mid = leg.sim_mid.ok_or_else(|| {
        AppError::Config(format!("sim_mid required for {} in simulation mode", leg.symbol))
    })?;
    Ok(SimInstrument {
        mid: Price::new(mid),
        tick_size: leg.tick(),
    })
}
