//! Engine configuration.
//!
//! Loaded from an optional TOML file and overridden by `POLYBOT_*`
//! environment variables (spec §6). Invalid numerics in either source fail
//! with `TradingError::Config`. Grounded on the teacher's `config/mod.rs`
//! TOML-plus-env layering.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TradingError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_max_positions")]
    pub max_positions: u64,
    #[serde(default = "default_max_order_size_usdc")]
    pub max_order_size_usdc: u64,
    #[serde(default = "default_max_daily_loss_usdc")]
    pub max_daily_loss_usdc: u64,
    #[serde(default)]
    pub paper_mode: bool,
    #[serde(default = "default_max_slippage_bps")]
    pub max_slippage_bps: u64,
}

fn default_name() -> String {
    "tickforge".to_string()
}
fn default_tick_interval_ms() -> u64 {
    1_000
}
fn default_max_positions() -> u64 {
    5
}
fn default_max_order_size_usdc() -> u64 {
    100
}
fn default_max_daily_loss_usdc() -> u64 {
    500
}
fn default_max_slippage_bps() -> u64 {
    50
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            tick_interval_ms: default_tick_interval_ms(),
            max_positions: default_max_positions(),
            max_order_size_usdc: default_max_order_size_usdc(),
            max_daily_loss_usdc: default_max_daily_loss_usdc(),
            paper_mode: true,
            max_slippage_bps: default_max_slippage_bps(),
        }
    }
}

impl EngineConfig {
    /// Load defaults, then a TOML file if present, then `POLYBOT_*`
    /// environment variable overrides, in that order of precedence.
    pub fn load(toml_path: Option<&Path>) -> Result<Self> {
        let mut config = match toml_path {
            Some(path) if path.exists() => {
                let raw = std::fs::read_to_string(path)?;
                toml::from_str(&raw).map_err(|e| TradingError::config(format!("invalid config TOML: {e}")))?
            }
            _ => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(v) = std::env::var("POLYBOT_NAME") {
            self.name = v;
        }
        self.tick_interval_ms = parse_positive_env("POLYBOT_TICK_INTERVAL_MS", self.tick_interval_ms)?;
        self.max_positions = parse_positive_env("POLYBOT_MAX_POSITIONS", self.max_positions)?;
        self.max_order_size_usdc =
            parse_positive_env("POLYBOT_MAX_ORDER_SIZE_USDC", self.max_order_size_usdc)?;
        self.max_daily_loss_usdc =
            parse_positive_env("POLYBOT_MAX_DAILY_LOSS_USDC", self.max_daily_loss_usdc)?;
        self.max_slippage_bps =
            parse_nonnegative_env("POLYBOT_MAX_SLIPPAGE_BPS", self.max_slippage_bps)?;
        if let Ok(v) = std::env::var("POLYBOT_PAPER_MODE") {
            self.paper_mode = parse_bool(&v)?;
        }
        Ok(())
    }
}

fn parse_positive_env(key: &str, default: u64) -> Result<u64> {
    match std::env::var(key) {
        Ok(raw) => {
            let value: i64 = raw
                .trim()
                .parse()
                .map_err(|_| TradingError::config(format!("{key} must be a positive integer, got `{raw}`")))?;
            if value <= 0 {
                return Err(TradingError::config(format!("{key} must be a positive integer, got `{raw}`")));
            }
            Ok(value as u64)
        }
        Err(_) => Ok(default),
    }
}

fn parse_nonnegative_env(key: &str, default: u64) -> Result<u64> {
    match std::env::var(key) {
        Ok(raw) => {
            let value: i64 = raw.trim().parse().map_err(|_| {
                TradingError::config(format!("{key} must be a non-negative integer, got `{raw}`"))
            })?;
            if value < 0 {
                return Err(TradingError::config(format!(
                    "{key} must be a non-negative integer, got `{raw}`"
                )));
            }
            Ok(value as u64)
        }
        Err(_) => Ok(default),
    }
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(TradingError::config(format!("POLYBOT_PAPER_MODE must be a boolean, got `{raw}`"))),
    }
}
