// =============================================================================
// Risk Stack — six ordered layers protecting capital and the options book
// =============================================================================
//
// Directly generalizes the donor's `RiskEngine` (four circuit breakers behind
// one `RwLock<Inner>`, short-circuiting `can_trade`) into six ordered layers,
// one struct/file per layer, composed by a `RiskStack` that walks them in
// order and stops at the first non-allowed decision. The shared mutable
// state (trade counters, IV history, daily equity returns) stays centralized
// behind a single `RwLock<Inner>` exactly as the donor's `Inner` does.

pub mod gap_risk;
pub mod greeks_caps;
pub mod iv_regime;
pub mod liquidity_layer;
pub mod trade_budget;
pub mod uvar;

use std::collections::{HashMap, VecDeque};

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::options::OptionContract;
use crate::options::contract::Greeks;
use crate::types::Direction;

pub use gap_risk::{EventCalendar, GapRiskLevel, GapRiskMonitor, NoEventCalendar};
pub use greeks_caps::PortfolioGreeksCaps;
pub use iv_regime::IvRegimeFilter;
pub use liquidity_layer::LiquidityGatekeeper;
pub use trade_budget::DailyTradeBudget;
pub use uvar::UvarLayer;

/// How severe the most restrictive layer verdict was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    Safe,
    Warning,
    Danger,
    Blocked,
}

impl Default for RiskLevel {
    fn default() -> Self {
        Self::Safe
    }
}

/// Verdict returned by a single layer, or the composed `RiskStack`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskDecision {
    pub allowed: bool,
    pub reason: Option<String>,
    pub level: RiskLevel,
    /// Multiplicative size adjustment contributed by this layer (1.0 = no change).
    pub size_multiplier: f64,
    /// Set when the underlying must be force-exited regardless of PnL.
    pub force_exit: bool,
    pub projected_greeks: Option<Greeks>,
    pub current_greeks: Option<Greeks>,
    /// Symbols to reduce, populated only on a hard Greeks-cap violation.
    pub forced_reductions: Option<Vec<String>>,
}

impl RiskDecision {
    pub fn pass() -> Self {
        Self {
            allowed: true,
            size_multiplier: 1.0,
            ..Default::default()
        }
    }

    pub fn pass_with(level: RiskLevel, reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: Some(reason.into()),
            level,
            size_multiplier: 1.0,
            ..Default::default()
        }
    }

    pub fn pass_sized(size_multiplier: f64, reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: Some(reason.into()),
            level: RiskLevel::Warning,
            size_multiplier,
            ..Default::default()
        }
    }

    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            level: RiskLevel::Blocked,
            size_multiplier: 1.0,
            ..Default::default()
        }
    }
}

/// Everything a layer needs to evaluate one candidate trade. Every field is
/// `Copy` so the manager can clone-and-override `iv_history` per call.
#[derive(Clone, Copy)]
pub struct RiskContext<'a> {
    pub symbol: &'a str,
    pub underlying: &'a str,
    pub direction: Direction,
    pub candidate_contract: &'a OptionContract,
    pub current_greeks: Greeks,
    pub candidate_greeks: Greeks,
    pub candidate_quantity: f64,
    pub portfolio_daily_returns: &'a [f64],
    pub portfolio_equity: f64,
    pub today: chrono::NaiveDate,
    /// Trailing IV samples for `underlying`, most recent last, *not*
    /// including the candidate's own IV.
    pub iv_history: &'a [f64],
}

pub trait RiskLayer: Send + Sync {
    fn name(&self) -> &'static str;
    fn evaluate(&self, ctx: &RiskContext) -> RiskDecision;
}

/// Ordered composition of the six layers. Walks them in order and
/// short-circuits on the first non-allowed decision (spec invariant: no
/// layer runs after a non-pass layer).
pub struct RiskStack {
    layers: Vec<Box<dyn RiskLayer>>,
}

impl RiskStack {
    pub fn new(layers: Vec<Box<dyn RiskLayer>>) -> Self {
        Self { layers }
    }

    pub fn evaluate(&self, ctx: &RiskContext) -> RiskDecision {
        let mut size_multiplier = 1.0;
        let mut level = RiskLevel::Safe;
        let mut reasons = Vec::new();

        for layer in &self.layers {
            let decision = layer.evaluate(ctx);
            size_multiplier *= decision.size_multiplier;
            level = level.max(decision.level);
            if let Some(reason) = &decision.reason {
                reasons.push(format!("{}: {reason}", layer.name()));
            }

            if !decision.allowed {
                return RiskDecision {
                    allowed: false,
                    reason: Some(reasons.join("; ")),
                    level,
                    size_multiplier,
                    force_exit: decision.force_exit,
                    projected_greeks: decision.projected_greeks,
                    current_greeks: decision.current_greeks,
                    forced_reductions: decision.forced_reductions,
                };
            }
        }

        RiskDecision {
            allowed: true,
            reason: if reasons.is_empty() { None } else { Some(reasons.join("; ")) },
            level,
            size_multiplier,
            force_exit: false,
            projected_greeks: None,
            current_greeks: None,
            forced_reductions: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Shared mutable risk state
// ---------------------------------------------------------------------------

struct Inner {
    trades_today: u32,
    current_date: String,
    portfolio_greeks: Greeks,
    iv_history: HashMap<String, VecDeque<f64>>,
    daily_returns: VecDeque<f64>,
    killed: bool,
}

/// Owns the Risk Stack's shared mutable state and the stack itself, mirroring
/// the donor's single `RwLock<Inner>` + config-fields `RiskEngine` shape.
pub struct RiskManager {
    state: RwLock<Inner>,
    stack: RiskStack,
    trade_budget: std::sync::Arc<DailyTradeBudget>,
    daily_trade_limit: u32,
    iv_rank_lookback_days: usize,
}

impl RiskManager {
    pub fn new(stack: RiskStack, trade_budget: std::sync::Arc<DailyTradeBudget>, daily_trade_limit: u32, iv_rank_lookback_days: usize) -> Self {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let iv_rank_lookback_days = iv_rank_lookback_days.clamp(1, 252);
        info!(daily_trade_limit, iv_rank_lookback_days, "RiskManager initialised");
        Self {
            state: RwLock::new(Inner {
                trades_today: 0,
                current_date: today,
                portfolio_greeks: Greeks::default(),
                iv_history: HashMap::new(),
                daily_returns: VecDeque::new(),
                killed: false,
            }),
            stack,
            trade_budget,
            daily_trade_limit,
            iv_rank_lookback_days: iv_rank_lookback_days.max(1),
        }
    }

    pub fn with_default_stack(daily_trade_limit: u32, iv_rank_lookback_days: usize) -> Self {
        let trade_budget = std::sync::Arc::new(DailyTradeBudget::new(daily_trade_limit));
        let stack = RiskStack::new(vec![
            Box::new(GapRiskMonitor::new(std::sync::Arc::new(NoEventCalendar))),
            Box::new(LiquidityGatekeeper),
            Box::new(IvRegimeFilter::new(iv_rank_lookback_days)),
            Box::new(PortfolioGreeksCaps::default()),
            Box::new(UvarLayer::default()),
            Box::new(trade_budget.clone()),
        ]);
        Self::new(stack, trade_budget, daily_trade_limit, iv_rank_lookback_days)
    }

    fn maybe_reset_daily(&self) {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        {
            let s = self.state.read();
            if s.current_date == today {
                return;
            }
        }
        let mut s = self.state.write();
        if s.current_date != today {
            s.trades_today = 0;
            s.current_date = today;
            self.trade_budget.set_trades_today(0);
        }
    }

    pub fn record_trade(&self) {
        self.maybe_reset_daily();
        let mut s = self.state.write();
        s.trades_today += 1;
        self.trade_budget.set_trades_today(s.trades_today);
    }

    pub fn trades_today(&self) -> u32 {
        self.maybe_reset_daily();
        self.state.read().trades_today
    }

    pub fn record_iv_sample(&self, underlying: &str, iv: f64) {
        let mut s = self.state.write();
        let history = s.iv_history.entry(underlying.to_string()).or_default();
        history.push_back(iv);
        while history.len() > self.iv_rank_lookback_days {
            history.pop_front();
        }
    }

    pub fn iv_history(&self, underlying: &str) -> Vec<f64> {
        self.state.read().iv_history.get(underlying).map(|h| h.iter().copied().collect()).unwrap_or_default()
    }

    pub fn record_daily_return(&self, r: f64) {
        let mut s = self.state.write();
        s.daily_returns.push_back(r);
        while s.daily_returns.len() > 90 {
            s.daily_returns.pop_front();
        }
    }

    pub fn daily_returns(&self) -> Vec<f64> {
        self.state.read().daily_returns.iter().copied().collect()
    }

    pub fn set_portfolio_greeks(&self, greeks: Greeks) {
        self.state.write().portfolio_greeks = greeks;
    }

    pub fn portfolio_greeks(&self) -> Greeks {
        self.state.read().portfolio_greeks
    }

    pub fn kill(&self) {
        self.state.write().killed = true;
    }

    pub fn is_killed(&self) -> bool {
        self.state.read().killed
    }

    pub fn daily_trade_limit(&self) -> u32 {
        self.daily_trade_limit
    }

    /// Evaluates a candidate trade through the full Risk Stack. The IV
    /// Regime Filter sees the trailing history *before* the candidate's own
    /// IV is recorded into it; the candidate's sample is then appended so
    /// future cycles see it.
    pub fn evaluate(&self, ctx: &RiskContext) -> RiskDecision {
        self.maybe_reset_daily();
        if self.is_killed() {
            return RiskDecision::block("kill switch active");
        }
        let history = self.iv_history(ctx.underlying);
        let ctx_with_history = RiskContext { iv_history: &history, ..*ctx };
        let decision = self.stack.evaluate(&ctx_with_history);
        self.record_iv_sample(ctx.underlying, ctx.candidate_contract.implied_volatility);
        decision
    }
}

impl std::fmt::Debug for RiskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiskManager")
            .field("daily_trade_limit", &self.daily_trade_limit)
            .field("iv_rank_lookback_days", &self.iv_rank_lookback_days)
            .finish()
    }
}
