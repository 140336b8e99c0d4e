// =============================================================================
// Central Application State — TradeNova control plane
// =============================================================================
//
// The single source of truth shared across the Scheduler and every worker
// pipeline. Grounded in the donor's `app_state.rs` shape (atomic version
// counter, `parking_lot::RwLock`-guarded collections, `Arc`-wrapped
// subsystem engines, bounded ring buffers for decisions/errors) with the
// dashboard-oriented `build_snapshot()`/`StateSnapshot` machinery dropped —
// this crate has no dashboard or WebSocket surface (see Non-goals).
//
// Thread safety:
//   - `AtomicU64` for lock-free version tracking.
//   - `parking_lot::RwLock` for mutable shared collections.
//   - `Arc` wrappers for subsystem engines that manage their own interior
//     mutability.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;

use crate::broker::{Account, BrokerAdapter};
use crate::config::EngineConfig;
use crate::decision_envelope::DecisionEnvelope;
use crate::events::EventLog;
use crate::market_data::{BarBuffer, DataAdapter};
use crate::position_engine::PositionManager;
use crate::regime::RegimeDetector;
use crate::risk::RiskManager;
use crate::signals::ema_agent::EmaAgent;
use crate::signals::mean_reversion_agent::MeanReversionAgent;
use crate::signals::options_agent::OptionsAgent;
use crate::signals::rl_predictor::RlPredictor;
use crate::signals::trend_agent::TrendAgent;
use crate::signals::volatility_agent::VolatilityAgent;
use crate::signals::{EnsembleConfig, SignalProducer};

/// A recorded error event for the bounded error log.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub message: String,
    pub code: Option<String>,
    pub at: String,
}

const MAX_RECENT_ERRORS: usize = 200;
const MAX_RECENT_DECISIONS: usize = 200;

/// The five rule-based producers of the Agent Set. Closed enumeration —
/// no runtime plugin discovery (§9 redesign guidance).
fn default_agents() -> Vec<Box<dyn SignalProducer>> {
    vec![
        Box::new(EmaAgent),
        Box::new(TrendAgent),
        Box::new(MeanReversionAgent),
        Box::new(VolatilityAgent),
        Box::new(OptionsAgent),
    ]
}

/// Central application state shared across the Scheduler and every worker
/// via `Arc<AppState>`.
pub struct AppState {
    /// Monotonically increasing version counter, incremented on every
    /// meaningful state mutation. Not consumed by anything in this crate
    /// today (no dashboard/WebSocket surface), but kept as the donor's
    /// change-detection primitive for a future external collaborator.
    pub state_version: AtomicU64,

    pub config: RwLock<EngineConfig>,

    // ── Market data ──────────────────────────────────────────────────────
    pub bar_buffer: Arc<BarBuffer>,
    pub data_adapter: Arc<dyn DataAdapter>,

    // ── Broker ───────────────────────────────────────────────────────────
    pub broker: Arc<dyn BrokerAdapter>,
    pub last_account: RwLock<Option<Account>>,

    // ── Risk & positions ─────────────────────────────────────────────────
    pub risk_manager: Arc<RiskManager>,
    pub position_manager: Arc<PositionManager>,

    // ── Regime ───────────────────────────────────────────────────────────
    pub regime_detector: Arc<RegimeDetector>,

    // ── Signal pipeline ──────────────────────────────────────────────────
    pub agents: Vec<Box<dyn SignalProducer>>,
    pub rl_predictor: Arc<RlPredictor>,
    pub ensemble_config: EnsembleConfig,

    // ── Observability ────────────────────────────────────────────────────
    pub events: EventLog,
    pub recent_decisions: RwLock<VecDeque<DecisionEnvelope>>,
    pub recent_errors: RwLock<VecDeque<ErrorRecord>>,

    // ── Session accounting ───────────────────────────────────────────────
    /// Count of positions opened so far this trading day, for the EOD
    /// snapshot's `trades_opened` field.
    pub trades_opened_today: AtomicU64,
    /// Peak equity observed this session, for max-drawdown computation.
    pub peak_equity: RwLock<f64>,
    /// Equity observed at warmup, the baseline for the realized daily return
    /// recorded into the UVaR layer's history at end of day.
    pub session_open_equity: RwLock<Option<f64>>,

    /// Serializes the risk-decision-and-position-mutation critical section
    /// in `process_symbol` across concurrently running per-symbol tasks, so
    /// two symbols can never both be admitted past the Daily Trade Budget or
    /// `max_positions` on the same cycle.
    pub risk_decision_lock: tokio::sync::Mutex<()>,

    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(config: EngineConfig, data_adapter: Arc<dyn DataAdapter>, broker: Arc<dyn BrokerAdapter>) -> Self {
        let risk_manager = Arc::new(RiskManager::with_default_stack(config.daily_trade_limit, config.clamped_iv_rank_lookback_days()));

        Self {
            state_version: AtomicU64::new(1),
            config: RwLock::new(config),

            bar_buffer: Arc::new(BarBuffer::new(500)),
            data_adapter,

            broker,
            last_account: RwLock::new(None),

            risk_manager,
            position_manager: Arc::new(PositionManager::new()),

            regime_detector: crate::regime::new_shared(),

            agents: default_agents(),
            rl_predictor: Arc::new(RlPredictor::heuristic()),
            ensemble_config: EnsembleConfig::default(),

            events: EventLog::new(),
            recent_decisions: RwLock::new(VecDeque::new()),
            recent_errors: RwLock::new(VecDeque::new()),

            trades_opened_today: AtomicU64::new(0),
            peak_equity: RwLock::new(0.0),
            session_open_equity: RwLock::new(None),
            risk_decision_lock: tokio::sync::Mutex::new(()),

            start_time: std::time::Instant::now(),
        }
    }

    // ── Version management ──────────────────────────────────────────────

    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    // ── Error logging ────────────────────────────────────────────────────

    pub fn push_error(&self, msg: impl Into<String>) {
        self.push_error_with_code(msg, None);
    }

    pub fn push_error_with_code(&self, msg: impl Into<String>, code: Option<String>) {
        let record = ErrorRecord {
            message: msg.into(),
            code,
            at: Utc::now().to_rfc3339(),
        };

        let mut errors = self.recent_errors.write();
        errors.push_back(record);
        while errors.len() > MAX_RECENT_ERRORS {
            errors.pop_front();
        }
        self.increment_version();
    }

    // ── Decision audit ───────────────────────────────────────────────────

    pub fn push_decision(&self, envelope: DecisionEnvelope) {
        let mut decisions = self.recent_decisions.write();
        decisions.push_back(envelope);
        while decisions.len() > MAX_RECENT_DECISIONS {
            decisions.pop_front();
        }
        self.increment_version();
    }

    // ── Session accounting ───────────────────────────────────────────────

    pub fn record_trade_opened(&self) {
        self.trades_opened_today.fetch_add(1, Ordering::SeqCst);
    }

    pub fn trades_opened_today(&self) -> u64 {
        self.trades_opened_today.load(Ordering::SeqCst)
    }

    pub fn reset_session_counters(&self) {
        self.trades_opened_today.store(0, Ordering::SeqCst);
    }

    pub fn observe_equity(&self, equity: f64) {
        let mut peak = self.peak_equity.write();
        if equity > *peak {
            *peak = equity;
        }
    }

    pub fn peak_equity(&self) -> f64 {
        *self.peak_equity.read()
    }

    pub fn set_session_open_equity(&self, equity: f64) {
        *self.session_open_equity.write() = Some(equity);
    }

    pub fn session_open_equity(&self) -> Option<f64> {
        *self.session_open_equity.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::BrokerAdapter;
    use crate::market_data::DataAdapter;
    use async_trait::async_trait;
    use chrono::{DateTime, NaiveDate};
    use std::time::Duration;

    struct NullDataAdapter;
    #[async_trait]
    impl DataAdapter for NullDataAdapter {
        async fn get_bars(&self, _symbol: &str, _tf: crate::types::Timeframe, _start: DateTime<Utc>, _end: DateTime<Utc>) -> Result<Vec<crate::market_data::Bar>, crate::error::TradeNovaError> {
            Ok(vec![])
        }
        async fn get_chain(&self, _symbol: &str, _expiration: Option<NaiveDate>) -> Result<Vec<crate::options::OptionContract>, crate::error::TradeNovaError> {
            Ok(vec![])
        }
        async fn get_quote(&self, option_symbol: &str) -> Result<crate::options::Quote, crate::error::TradeNovaError> {
            Err(crate::error::TradeNovaError::DataUnavailable { symbol: option_symbol.into(), reason: "stub".into() })
        }
    }

    struct NullBroker;
    #[async_trait]
    impl BrokerAdapter for NullBroker {
        async fn execute_market_order(&self, _symbol: &str, _qty: u32, _side: crate::broker::OrderSide, _is_option: bool) -> Result<crate::broker::Order, crate::error::TradeNovaError> {
            unimplemented!()
        }
        async fn execute_limit_order(&self, _symbol: &str, _qty: u32, _side: crate::broker::OrderSide, _price: f64, _is_option: bool) -> Result<crate::broker::Order, crate::error::TradeNovaError> {
            unimplemented!()
        }
        async fn execute_bracket_order(&self, _symbol: &str, _qty: u32, _side: crate::broker::OrderSide, _entry: f64, _tp: f64, _sl: f64, _is_option: bool) -> Result<crate::broker::Order, crate::error::TradeNovaError> {
            unimplemented!()
        }
        async fn cancel_stale_orders(&self, _older_than: Duration) -> Result<(), crate::error::TradeNovaError> {
            Ok(())
        }
        async fn get_account(&self) -> Result<crate::broker::Account, crate::error::TradeNovaError> {
            unimplemented!()
        }
        async fn list_positions(&self) -> Result<Vec<crate::broker::BrokerPosition>, crate::error::TradeNovaError> {
            Ok(vec![])
        }
    }

    fn state() -> AppState {
        AppState::new(EngineConfig::default(), Arc::new(NullDataAdapter), Arc::new(NullBroker))
    }

    #[test]
    fn new_state_has_five_agents() {
        assert_eq!(state().agents.len(), 5);
    }

    #[test]
    fn push_decision_increments_version() {
        let s = state();
        let before = s.current_state_version();
        s.push_decision(DecisionEnvelope::allow("AAPL", crate::types::Direction::Long, "trend_agent"));
        assert!(s.current_state_version() > before);
        assert_eq!(s.recent_decisions.read().len(), 1);
    }

    #[test]
    fn push_error_caps_ring_buffer() {
        let s = state();
        for i in 0..(MAX_RECENT_ERRORS + 5) {
            s.push_error(format!("error {i}"));
        }
        assert_eq!(s.recent_errors.read().len(), MAX_RECENT_ERRORS);
    }

    #[test]
    fn peak_equity_tracks_maximum() {
        let s = state();
        s.observe_equity(100_000.0);
        s.observe_equity(95_000.0);
        s.observe_equity(105_000.0);
        assert_eq!(s.peak_equity(), 105_000.0);
    }
}
