//! Application configuration.

use std::collections::HashMap;
use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use dn_core::{InstrumentId, Price, Size};
use dn_executor::ExecutorConfig;
use dn_position::ReconcilerConfig;
use dn_pricing::PricingConfig;
use dn_risk::SafetyConfig;

use crate::error::{AppError, AppResult};

/// Operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingMode {
    /// In-process simulated venue, no external connectivity.
    #[default]
    Simulation,
    /// Live venue. Requires a transport wired in at build time.
    Live,
}

/// One instrument of the pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// Venue symbol (e.g. "ETH-PERP").
    pub symbol: String,
    /// Price tick size.
    pub tick_size: Decimal,
    /// Quantity step for order sizing.
    #[serde(default = "default_size_step")]
    pub size_step: Decimal,
    /// Absolute signed position cap.
    pub position_cap: Decimal,
    /// Mid price for the simulated venue. Required in simulation mode.
    #[serde(default)]
    pub sim_mid: Option<Decimal>,
}

fn default_size_step() -> Decimal {
    // 0.0001
    Decimal::new(1, 4)
}

impl InstrumentConfig {
    pub fn instrument(&self) -> InstrumentId {
        InstrumentId::from(self.symbol.as_str())
    }

    pub fn tick(&self) -> Price {
        Price::new(self.tick_size)
    }

    pub fn step(&self) -> Size {
        Size::new(self.size_step)
    }
}

/// The traded pair. A BUILD cycle buys `long` and sells `short`;
/// UNWIND reverses both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairConfig {
    pub long: InstrumentConfig,
    pub short: InstrumentConfig,
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub mode: OperatingMode,
    /// The instrument pair.
    pub pair: PairConfig,
    /// Per-leg notional in quote currency. Default: 100.
    #[serde(default = "default_target_notional")]
    pub target_notional: Decimal,
    /// Delay between BUILD and the following UNWIND (ms). Default: 2000.
    #[serde(default = "default_inter_phase_delay_ms")]
    pub inter_phase_delay_ms: u64,
    /// Pause after a full build/unwind round before the next BUILD (ms).
    /// Default: 5000.
    #[serde(default = "default_cycle_pause_ms")]
    pub cycle_pause_ms: u64,
    /// Stop after this many completed cycles. None = run until ctrl_c.
    #[serde(default)]
    pub max_cycles: Option<u64>,
    /// Maker fee rate for the simulated venue.
    #[serde(default = "default_sim_maker_fee_rate")]
    pub sim_maker_fee_rate: Decimal,
    /// Taker fee rate for the simulated venue.
    #[serde(default = "default_sim_taker_fee_rate")]
    pub sim_taker_fee_rate: Decimal,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
}

fn default_target_notional() -> Decimal {
    Decimal::new(100, 0)
}

fn default_inter_phase_delay_ms() -> u64 {
    2_000
}

fn default_cycle_pause_ms() -> u64 {
    5_000
}

fn default_sim_maker_fee_rate() -> Decimal {
    // 2 bps
    Decimal::new(2, 4)
}

fn default_sim_taker_fee_rate() -> Decimal {
    // 5 bps
    Decimal::new(5, 4)
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: OperatingMode::Simulation,
            pair: PairConfig {
                long: InstrumentConfig {
                    symbol: "ETH-PERP".to_string(),
                    tick_size: Decimal::new(1, 2),
                    size_step: default_size_step(),
                    position_cap: Decimal::new(1, 1),
                    sim_mid: Some(Decimal::new(2000, 0)),
                },
                short: InstrumentConfig {
                    symbol: "BTC-PERP".to_string(),
                    tick_size: Decimal::new(1, 0),
                    size_step: default_size_step(),
                    position_cap: Decimal::new(1, 2),
                    sim_mid: Some(Decimal::new(50000, 0)),
                },
            },
            target_notional: default_target_notional(),
            inter_phase_delay_ms: default_inter_phase_delay_ms(),
            cycle_pause_ms: default_cycle_pause_ms(),
            max_cycles: None,
            sim_maker_fee_rate: default_sim_maker_fee_rate(),
            sim_taker_fee_rate: default_sim_taker_fee_rate(),
            pricing: PricingConfig::default(),
            executor: ExecutorConfig::default(),
            reconciler: ReconcilerConfig::default(),
            safety: SafetyConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration, preferring `DN_CONFIG` over the default path.
    pub fn load() -> AppResult<Self> {
        let config_path =
            std::env::var("DN_CONFIG").unwrap_or_else(|_| "config/default.toml".to_string());

        if Path::new(&config_path).exists() {
            Self::from_file(&config_path)
        } else {
            tracing::warn!(path = %config_path, "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot produce a sane cycle.
    pub fn validate(&self) -> AppResult<()> {
        if self.target_notional <= Decimal::ZERO {
            return Err(AppError::Config(format!(
                "target_notional must be positive, got {}",
                self.target_notional
            )));
        }
        for leg in [&self.pair.long, &self.pair.short] {
            if leg.tick_size <= Decimal::ZERO {
                return Err(AppError::Config(format!(
                    "tick_size for {} must be positive",
                    leg.symbol
                )));
            }
            if leg.size_step <= Decimal::ZERO {
                return Err(AppError::Config(format!(
                    "size_step for {} must be positive",
                    leg.symbol
                )));
            }
            if leg.position_cap <= Decimal::ZERO {
                return Err(AppError::Config(format!(
                    "position_cap for {} must be positive",
                    leg.symbol
                )));
            }
        }
        if self.pair.long.symbol == self.pair.short.symbol {
            return Err(AppError::Config(format!(
                "pair legs must be distinct instruments, both are {}",
                self.pair.long.symbol
            )));
        }
        Ok(())
    }

    /// Position caps keyed by instrument, for the governor.
    pub fn position_caps(&self) -> HashMap<InstrumentId, Decimal> {
        let mut caps = HashMap::new();
        caps.insert(self.pair.long.instrument(), self.pair.long.position_cap);
        caps.insert(self.pair.short.instrument(), self.pair.short.position_cap);
        caps
    }
}
