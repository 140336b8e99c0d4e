// =============================================================================
// Persistence — cross-session state + end-of-day snapshot
// =============================================================================
//
// Grounded in the donor's `config.rs`/`runtime_config.rs` atomic tmp+rename
// write pattern, applied here to the two payloads the process must survive
// a restart with: open positions (so a restart mid-session doesn't abandon
// a live ladder) and the Risk Stack's counters/history (so a restart can't
// be used to dodge the daily trade limit). The EOD snapshot is write-once
// per trading day and is not read back by this process.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::options::contract::Greeks;
use crate::position_engine::{Position, PositionManager, PositionStatus};
use crate::risk::RiskManager;
use crate::types::Direction;

fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value).context("failed to serialise persisted payload")?;
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &content).with_context(|| format!("failed to write tmp file {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path).with_context(|| format!("failed to rename tmp file to {}", path.display()))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Cross-session state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedPosition {
    pub id: String,
    pub option_symbol: String,
    pub underlying: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub quantity: f64,
    pub original_quantity: f64,
    #[serde(default)]
    pub greeks: Greeks,
    pub expiration_date: NaiveDate,
    pub tp1_fired: bool,
    pub tp2_fired: bool,
    pub tp3_fired: bool,
    pub tp4_fired: bool,
    pub trailing_armed: bool,
    pub highest_profit_pct: f64,
    pub opened_at: chrono::DateTime<Utc>,
}

impl From<&Position> for PersistedPosition {
    fn from(p: &Position) -> Self {
        Self {
            id: p.id.clone(),
            option_symbol: p.option_symbol.clone(),
            underlying: p.underlying.clone(),
            direction: p.direction,
            entry_price: p.entry_price,
            quantity: p.quantity,
            original_quantity: p.original_quantity,
            greeks: p.greeks,
            expiration_date: p.expiration_date,
            tp1_fired: p.tp1_fired,
            tp2_fired: p.tp2_fired,
            tp3_fired: p.tp3_fired,
            tp4_fired: p.tp4_fired,
            trailing_armed: p.trailing_armed,
            highest_profit_pct: p.highest_profit_pct,
            opened_at: p.opened_at,
        }
    }
}

impl PersistedPosition {
    fn into_position(self) -> Position {
        Position {
            id: self.id,
            option_symbol: self.option_symbol,
            underlying: self.underlying,
            direction: self.direction,
            entry_price: self.entry_price,
            quantity: self.quantity,
            original_quantity: self.original_quantity,
            greeks: self.greeks,
            current_price: self.entry_price,
            pnl_pct: 0.0,
            highest_profit_pct: self.highest_profit_pct,
            expiration_date: self.expiration_date,
            tp1_fired: self.tp1_fired,
            tp2_fired: self.tp2_fired,
            tp3_fired: self.tp3_fired,
            tp4_fired: self.tp4_fired,
            trailing_armed: self.trailing_armed,
            status: PositionStatus::Open,
            opened_at: self.opened_at,
            closed_at: None,
            close_reason: None,
            realized_pnl: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedRiskState {
    pub trades_today: u32,
    pub current_date: String,
    pub daily_returns: Vec<f64>,
    pub iv_history: HashMap<String, Vec<f64>>,
}

/// Everything restored at `PRE_MARKET_WARMUP`: open positions and the Risk
/// Stack's counters/history. Price/current-quote fields are not persisted —
/// the next cycle's first mark-to-market re-derives them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedState {
    pub saved_at: String,
    pub positions: Vec<PersistedPosition>,
    pub risk: PersistedRiskState,
}

impl PersistedState {
    /// Snapshot the current open positions and Risk Stack counters. Called
    /// on graceful shutdown and at the end of every `FLATTENING` cycle.
    pub fn capture(position_manager: &PositionManager, risk_manager: &RiskManager) -> Self {
        let positions = position_manager.get_open_positions().iter().map(PersistedPosition::from).collect();

        let mut iv_history = HashMap::new();
        for underlying in position_manager.get_open_positions().iter().map(|p| p.underlying.clone()) {
            iv_history.entry(underlying.clone()).or_insert_with(|| risk_manager.iv_history(&underlying));
        }

        Self {
            saved_at: Utc::now().to_rfc3339(),
            positions,
            risk: PersistedRiskState {
                trades_today: risk_manager.trades_today(),
                current_date: Utc::now().format("%Y-%m-%d").to_string(),
                daily_returns: risk_manager.daily_returns(),
                iv_history,
            },
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        atomic_write_json(path, self)?;
        info!(path = %path.display(), positions = self.positions.len(), "state persisted");
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).with_context(|| format!("failed to read persisted state from {}", path.display()))?;
        let state: Self = serde_json::from_str(&content).with_context(|| format!("failed to parse persisted state from {}", path.display()))?;
        info!(path = %path.display(), positions = state.positions.len(), "state loaded");
        Ok(state)
    }

    /// Re-inserts every persisted position into a fresh `PositionManager` and
    /// replays the recorded IV history into a fresh `RiskManager`. Called
    /// once, during `PRE_MARKET_WARMUP`, before any cycle runs.
    pub fn restore_into(&self, position_manager: &PositionManager, risk_manager: &RiskManager) {
        for p in &self.positions {
            position_manager.restore_position(p.clone().into_position());
        }
        for (underlying, samples) in &self.risk.iv_history {
            for iv in samples {
                risk_manager.record_iv_sample(underlying, *iv);
            }
        }
        for r in &self.risk.daily_returns {
            risk_manager.record_daily_return(*r);
        }
        // Only carry the trade counter forward if the snapshot is from the
        // same calendar day — a restart on a new trading day gets a fresh
        // DAILY_TRADE_LIMIT budget regardless of yesterday's count.
        let today = Utc::now().format("%Y-%m-%d").to_string();
        if self.risk.current_date == today {
            for _ in 0..self.risk.trades_today {
                risk_manager.record_trade();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// End-of-day snapshot
// ---------------------------------------------------------------------------

/// `{equity, realized_pnl, trades_opened, trades_closed, win_rate,
/// max_drawdown, per_agent_attribution}`, emitted once per session at the
/// `REPORTING` transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EodSnapshot {
    pub date: String,
    pub equity: f64,
    pub realized_pnl: f64,
    pub trades_opened: u32,
    pub trades_closed: u32,
    pub win_rate: f64,
    pub max_drawdown: f64,
    pub per_agent_attribution: HashMap<String, f64>,
}

impl EodSnapshot {
    pub fn compute(
        date: NaiveDate,
        equity: f64,
        trades_opened: u32,
        closed_today: &[Position],
        peak_equity: f64,
        per_agent_attribution: HashMap<String, f64>,
    ) -> Self {
        let trades_closed = closed_today.len() as u32;
        let realized_pnl: f64 = closed_today.iter().map(|p| p.realized_pnl).sum();
        let wins = closed_today.iter().filter(|p| p.realized_pnl > 0.0).count();
        let win_rate = if trades_closed > 0 { wins as f64 / trades_closed as f64 } else { 0.0 };
        let max_drawdown = if peak_equity > 0.0 { ((peak_equity - equity) / peak_equity).max(0.0) } else { 0.0 };

        Self {
            date: date.format("%Y-%m-%d").to_string(),
            equity,
            realized_pnl,
            trades_opened,
            trades_closed,
            win_rate,
            max_drawdown,
            per_agent_attribution,
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        atomic_write_json(path, self)?;
        info!(path = %path.display(), date = %self.date, realized_pnl = self.realized_pnl, "EOD snapshot written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_position(realized_pnl: f64) -> Position {
        Position {
            id: "p1".into(),
            option_symbol: "AAPL260821C00150000".into(),
            underlying: "AAPL".into(),
            direction: Direction::Long,
            entry_price: 1.0,
            quantity: 0.0,
            original_quantity: 10.0,
            greeks: Greeks::default(),
            current_price: 1.0,
            pnl_pct: 0.0,
            highest_profit_pct: 0.5,
            expiration_date: Utc::now().date_naive() + chrono::Duration::days(10),
            tp1_fired: true,
            tp2_fired: false,
            tp3_fired: false,
            tp4_fired: false,
            trailing_armed: false,
            status: PositionStatus::Closed,
            opened_at: Utc::now(),
            closed_at: Some(Utc::now()),
            close_reason: None,
            realized_pnl,
        }
    }

    #[test]
    fn capture_and_restore_roundtrip_positions() {
        let pm = PositionManager::new();
        let expiration = Utc::now().date_naive() + chrono::Duration::days(15);
        pm.open_position("AAPL260821C00150000", "AAPL", Direction::Long, 2.0, 10.0, expiration, Default::default());

        let risk_manager = RiskManager::with_default_stack(5, 75);
        let snapshot = PersistedState::capture(&pm, &risk_manager);
        assert_eq!(snapshot.positions.len(), 1);

        let pm2 = PositionManager::new();
        let risk_manager2 = RiskManager::with_default_stack(5, 75);
        snapshot.restore_into(&pm2, &risk_manager2);
        assert!(pm2.has_open_position_for("AAPL"));
    }

    #[test]
    fn save_and_load_roundtrip_via_tmp_file() {
        let dir = std::env::temp_dir().join(format!("tradenova-persistence-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("state.json");

        let state = PersistedState {
            saved_at: "2026-01-01T00:00:00Z".into(),
            positions: vec![],
            risk: PersistedRiskState { trades_today: 3, ..Default::default() },
        };
        state.save(&path).unwrap();
        let loaded = PersistedState::load(&path).unwrap();
        assert_eq!(loaded.risk.trades_today, 3);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn eod_snapshot_computes_win_rate_and_drawdown() {
        let closed = vec![sample_position(100.0), sample_position(-40.0), sample_position(50.0)];
        let snapshot = EodSnapshot::compute(Utc::now().date_naive(), 95_000.0, 5, &closed, 100_000.0, HashMap::new());
        assert_eq!(snapshot.trades_closed, 3);
        assert!((snapshot.realized_pnl - 110.0).abs() < f64::EPSILON);
        assert!((snapshot.win_rate - (2.0 / 3.0)).abs() < 1e-9);
        assert!((snapshot.max_drawdown - 0.05).abs() < f64::EPSILON);
    }

    #[test]
    fn eod_snapshot_handles_no_trades() {
        let snapshot = EodSnapshot::compute(Utc::now().date_naive(), 100_000.0, 0, &[], 100_000.0, HashMap::new());
        assert_eq!(snapshot.win_rate, 0.0);
        assert_eq!(snapshot.max_drawdown, 0.0);
    }
}
