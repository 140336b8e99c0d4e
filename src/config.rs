// =============================================================================
// Engine Configuration — every tunable knob the control loop reads
// =============================================================================
//
// Directly grounded in the donor's `runtime_config.rs`: hot-reloadable,
// atomic tmp+rename persistence, `#[serde(default = "...")]` on every field
// so an older config file on disk never breaks a newer binary. The donor's
// crypto-scalper knobs (SL/TP ATR multipliers, smart-filter feature flags)
// are replaced by the options control loop's knobs from spec.md §6.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::{AccountMode, TradingMode};

// ---------------------------------------------------------------------------
// Default-value helpers
// ---------------------------------------------------------------------------

fn default_universe() -> Vec<String> {
    vec!["SPY".into(), "QQQ".into(), "AAPL".into(), "MSFT".into(), "NVDA".into()]
}

fn default_min_bars() -> usize {
    30
}
fn default_max_chain_size() -> usize {
    2000
}
fn default_min_dte() -> i64 {
    0
}
fn default_max_dte() -> i64 {
    30
}
fn default_preferred_dte() -> (i64, i64) {
    (0, 7)
}
fn default_price_floor() -> f64 {
    0.10
}
fn default_max_positions() -> u32 {
    10
}
fn default_position_size_pct() -> f64 {
    0.10
}
fn default_portfolio_heat_cap() -> f64 {
    0.35
}
fn default_stop_loss_pct() -> f64 {
    0.20
}
fn default_tp_ladder() -> Vec<TakeProfitTier> {
    vec![
        TakeProfitTier { pnl_pct: 0.40, close_fraction: 0.50 },
        TakeProfitTier { pnl_pct: 0.60, close_fraction: 0.20 },
        TakeProfitTier { pnl_pct: 1.00, close_fraction: 0.10 },
        TakeProfitTier { pnl_pct: 1.50, close_fraction: 0.10 },
        TakeProfitTier { pnl_pct: 2.00, close_fraction: 1.00 },
    ]
}
fn default_trailing_arm_tp() -> u32 {
    4
}
fn default_confidence_threshold() -> f64 {
    0.70
}
fn default_daily_trade_limit() -> u32 {
    5
}
fn default_max_delta() -> f64 {
    500.0
}
fn default_max_gamma() -> f64 {
    25.0
}
fn default_max_theta_per_day() -> f64 {
    -300.0
}
fn default_max_vega() -> f64 {
    300.0
}
fn default_max_uvar_pct() -> f64 {
    0.05
}
fn default_cycle_period_secs() -> u64 {
    300
}
fn default_session_open() -> String {
    "09:30".to_string()
}
fn default_session_close() -> String {
    "16:00".to_string()
}
fn default_flatten_time() -> String {
    "15:50".to_string()
}
fn default_timezone() -> String {
    "America/New_York".to_string()
}
fn default_iv_rank_lookback_days() -> usize {
    75
}

/// Hard ceiling on `iv_rank_lookback_days` (roughly one trading year).
pub const IV_RANK_LOOKBACK_DAYS_CAP: usize = 252;

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TakeProfitTier {
    pub pnl_pct: f64,
    pub close_fraction: f64,
}

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    // --- Operational modes ---------------------------------------------------
    #[serde(default)]
    pub trading_mode: TradingMode,
    #[serde(default)]
    pub account_mode: AccountMode,

    // --- Universe & data -------------------------------------------------
    #[serde(default = "default_universe")]
    pub universe: Vec<String>,
    #[serde(default = "default_min_bars")]
    pub min_bars: usize,
    #[serde(default = "default_max_chain_size")]
    pub max_chain_size: usize,

    // --- Option selection --------------------------------------------------
    #[serde(default = "default_min_dte")]
    pub min_dte: i64,
    #[serde(default = "default_max_dte")]
    pub max_dte: i64,
    #[serde(default = "default_preferred_dte")]
    pub preferred_dte: (i64, i64),
    #[serde(default = "default_price_floor")]
    pub price_floor: f64,

    // --- Position sizing & portfolio caps ----------------------------------
    #[serde(default = "default_max_positions")]
    pub max_positions: u32,
    #[serde(default = "default_position_size_pct")]
    pub position_size_pct: f64,
    #[serde(default = "default_portfolio_heat_cap")]
    pub portfolio_heat_cap: f64,

    // --- Exit ladder --------------------------------------------------------
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: f64,
    #[serde(default = "default_tp_ladder")]
    pub tp_ladder: Vec<TakeProfitTier>,
    #[serde(default = "default_trailing_arm_tp")]
    pub trailing_arm_tp: u32,

    // --- Signal gate ---------------------------------------------------------
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    // --- Risk stack -----------------------------------------------------------
    #[serde(default = "default_daily_trade_limit")]
    pub daily_trade_limit: u32,
    #[serde(default = "default_max_delta")]
    pub max_delta: f64,
    #[serde(default = "default_max_gamma")]
    pub max_gamma: f64,
    #[serde(default = "default_max_theta_per_day")]
    pub max_theta_per_day: f64,
    #[serde(default = "default_max_vega")]
    pub max_vega: f64,
    #[serde(default = "default_max_uvar_pct")]
    pub max_uvar_pct: f64,
    #[serde(default = "default_iv_rank_lookback_days")]
    pub iv_rank_lookback_days: usize,

    // --- Scheduler --------------------------------------------------------
    #[serde(default = "default_cycle_period_secs")]
    pub cycle_period_secs: u64,
    #[serde(default = "default_session_open")]
    pub session_open: String,
    #[serde(default = "default_session_close")]
    pub session_close: String,
    #[serde(default = "default_flatten_time")]
    pub flatten_time: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            trading_mode: TradingMode::Paused,
            account_mode: AccountMode::Demo,
            universe: default_universe(),
            min_bars: default_min_bars(),
            max_chain_size: default_max_chain_size(),
            min_dte: default_min_dte(),
            max_dte: default_max_dte(),
            preferred_dte: default_preferred_dte(),
            price_floor: default_price_floor(),
            max_positions: default_max_positions(),
            position_size_pct: default_position_size_pct(),
            portfolio_heat_cap: default_portfolio_heat_cap(),
            stop_loss_pct: default_stop_loss_pct(),
            tp_ladder: default_tp_ladder(),
            trailing_arm_tp: default_trailing_arm_tp(),
            confidence_threshold: default_confidence_threshold(),
            daily_trade_limit: default_daily_trade_limit(),
            max_delta: default_max_delta(),
            max_gamma: default_max_gamma(),
            max_theta_per_day: default_max_theta_per_day(),
            max_vega: default_max_vega(),
            max_uvar_pct: default_max_uvar_pct(),
            iv_rank_lookback_days: default_iv_rank_lookback_days(),
            cycle_period_secs: default_cycle_period_secs(),
            session_open: default_session_open(),
            session_close: default_session_close(),
            flatten_time: default_flatten_time(),
            timezone: default_timezone(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse engine config from {}", path.display()))?;

        info!(
            path = %path.display(),
            universe = ?config.universe,
            trading_mode = %config.trading_mode,
            "engine config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self).context("failed to serialise engine config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "engine config saved (atomic)");
        Ok(())
    }

    /// Clamp `iv_rank_lookback_days` to `[1, IV_RANK_LOOKBACK_DAYS_CAP]`.
    pub fn clamped_iv_rank_lookback_days(&self) -> usize {
        self.iv_rank_lookback_days.clamp(1, IV_RANK_LOOKBACK_DAYS_CAP)
    }
}
