// =============================================================================
// Scheduler — single ticker-driven state machine for the daily session
// =============================================================================
//
// Replaces the donor's `main.rs` ad-hoc collection of `tokio::spawn` loops
// (one per symbol stream, one for the strategy interval, one for exit
// monitoring, one for reconciliation, one for regime detection) with one
// state machine that owns the session's phases explicitly. The donor's
// per-task 5s/30s/60s `tokio::time::interval`s collapse into a single
// `cycle_period_secs` tick while `CLOSED`/`RUNNING`, with the bounded
// worker-pool-per-cycle and deadline-per-call shape grounded in the donor's
// reconnect-with-backoff pattern (same idea, one timeout per external call
// instead of per connection).

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use parking_lot::RwLock;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::app_state::AppState;
use crate::broker::OrderSide;
use crate::decision_envelope::DecisionEnvelope;
use crate::events::{DecisionEvent, Stage};
use crate::features::compute_features;
use crate::market_clock::{MarketClock, SessionPhase};
use crate::market_data::BarKey;
use crate::options::{filter_chain, select_contract, FilterCounters, SelectorConfig};
use crate::persistence::{EodSnapshot, PersistedState};
use crate::risk::RiskContext;
use crate::types::{Direction, Timeframe};

const DATA_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const QUOTE_TIMEOUT: Duration = Duration::from_secs(3);
const ORDER_TIMEOUT: Duration = Duration::from_secs(15);
const CYCLE_TIMEOUT: Duration = Duration::from_secs(120);
const FLATTEN_BUDGET: Duration = Duration::from_secs(600);
const BAR_LOOKBACK: chrono::Duration = chrono::Duration::days(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Closed,
    PreMarketWarmup,
    WaitingForOpen,
    Running,
    Flattening,
    Reporting,
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

fn parse_hhmm(s: &str) -> NaiveTime {
    NaiveTime::parse_from_str(s, "%H:%M").unwrap_or_else(|_| NaiveTime::from_hms_opt(16, 0, 0).unwrap())
}

/// Drives the session through `CLOSED -> PRE_MARKET_WARMUP -> WAITING_FOR_OPEN
/// -> RUNNING -> FLATTENING -> REPORTING -> CLOSED`. One instance per process.
pub struct Scheduler {
    app: Arc<AppState>,
    clock: Arc<dyn MarketClock>,
    state: RwLock<SchedulerState>,
    state_path: PathBuf,
    eod_dir: PathBuf,
    cancel: CancellationToken,
    flatten_deadline: RwLock<Option<std::time::Instant>>,
}

impl Scheduler {
    pub fn new(app: Arc<AppState>, clock: Arc<dyn MarketClock>, state_path: PathBuf, eod_dir: PathBuf) -> Self {
        Self {
            app,
            clock,
            state: RwLock::new(SchedulerState::Closed),
            state_path,
            eod_dir,
            cancel: CancellationToken::new(),
            flatten_deadline: RwLock::new(None),
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.read()
    }

    fn transition(&self, next: SchedulerState) {
        let prev = *self.state.read();
        info!(from = %prev, to = %next, "scheduler state transition");
        *self.state.write() = next;
    }

    async fn market_open_flag(&self) -> Option<bool> {
        self.app.data_adapter.market_open().await
    }

    /// Runs the state machine until cancelled (ctrl-c or an owner calling
    /// `cancellation_token().cancel()`). On exit, persists state so a
    /// restart resumes with the session's open positions and risk counters.
    pub async fn run(&self) {
        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            match self.state() {
                SchedulerState::Closed => self.tick_closed().await,
                SchedulerState::PreMarketWarmup => self.tick_warmup().await,
                SchedulerState::WaitingForOpen => self.tick_waiting_for_open().await,
                SchedulerState::Running => self.tick_running().await,
                SchedulerState::Flattening => self.tick_flattening().await,
                SchedulerState::Reporting => self.tick_reporting().await,
            }

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                _ = self.cancel.cancelled() => break,
            }
        }

        info!("scheduler shutting down, persisting state");
        let snapshot = PersistedState::capture(&self.app.position_manager, &self.app.risk_manager);
        if let Err(e) = snapshot.save(&self.state_path) {
            error!(error = %e, "failed to persist state on shutdown");
        }
    }

    async fn tick_closed(&self) {
        let phase = self.clock.phase(self.market_open_flag().await);
        if phase != SessionPhase::Closed {
            self.transition(SchedulerState::PreMarketWarmup);
        }
    }

    /// Seeds the risk manager and position manager from any prior session's
    /// persisted state, then moves on. Runs once per day.
    async fn tick_warmup(&self) {
        match PersistedState::load(&self.state_path) {
            Ok(snapshot) => {
                snapshot.restore_into(&self.app.position_manager, &self.app.risk_manager);
                info!(positions = snapshot.positions.len(), "restored persisted state during warmup");
            }
            Err(e) => {
                info!(error = %e, "no persisted state to restore, starting fresh session");
            }
        }

        match self.app.broker.get_account().await {
            Ok(account) => {
                *self.app.last_account.write() = Some(account.clone());
                self.app.observe_equity(account.equity);
                self.app.set_session_open_equity(account.equity);
            }
            Err(e) => {
                warn!(error = %e, "failed to fetch account during warmup");
            }
        }

        self.app.reset_session_counters();
        self.transition(SchedulerState::WaitingForOpen);
    }

    async fn tick_waiting_for_open(&self) {
        let broker_open = self.market_open_flag().await;
        if self.clock.is_open(broker_open) {
            self.transition(SchedulerState::Running);
        }
    }

    async fn tick_running(&self) {
        let config = self.app.config.read().clone();
        let now = self.clock.now();
        let flatten_at = parse_hhmm(&config.flatten_time);
        if now.time() >= flatten_at {
            *self.flatten_deadline.write() = Some(std::time::Instant::now() + FLATTEN_BUDGET);
            self.transition(SchedulerState::Flattening);
            return;
        }

        let cycle_start = std::time::Instant::now();
        match tokio::time::timeout(CYCLE_TIMEOUT, self.run_cycle(&config, now)).await {
            Ok(()) => {
                info!(elapsed_ms = cycle_start.elapsed().as_millis(), "cycle completed");
            }
            Err(_) => {
                warn!("cycle exceeded its time budget, skipping rather than queuing a backlog");
                self.app.push_error("cycle overrun: exceeded CYCLE_TIMEOUT");
            }
        }

        tokio::time::sleep(Duration::from_secs(config.cycle_period_secs)).await;
    }

    /// One full pass over the universe: bounded-concurrency signal
    /// evaluation and entries, then a single serialized exits pass.
    async fn run_cycle(&self, config: &crate::config::EngineConfig, now: DateTime<Tz>) {
        let permits = config.universe.len().clamp(1, 8);
        let semaphore = Arc::new(Semaphore::new(permits));
        let mut tasks = JoinSet::new();

        for symbol in config.universe.clone() {
            let app = self.app.clone();
            let semaphore = semaphore.clone();
            let config = config.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
                if let Err(e) = process_symbol(&app, &config, &symbol, now).await {
                    if e.is_per_symbol() {
                        app.events.record(DecisionEvent::rejected(&symbol, Stage::Scheduler, e.to_string(), serde_json::json!({})));
                    } else {
                        app.push_error_with_code(format!("{symbol}: {e}"), None);
                        if e.is_degrading() {
                            warn!(symbol, error = %e, "degrading error, entries may be unreliable this cycle");
                        }
                    }
                }
            });
        }

        while tasks.join_next().await.is_some() {}

        self.run_exits(now, false).await;
    }

    /// Refreshes `current_price`/`pnl_pct` for every open position from a
    /// live quote before the exit rules are evaluated against it.
    async fn mark_to_market(&self, now: DateTime<Utc>) {
        for pos in self.app.position_manager.get_open_positions() {
            match tokio::time::timeout(QUOTE_TIMEOUT, self.app.data_adapter.get_quote(&pos.option_symbol)).await {
                Ok(Ok(quote)) => {
                    let price = if quote.bid > 0.0 && quote.ask > 0.0 { (quote.bid + quote.ask) / 2.0 } else { quote.last };
                    self.app.position_manager.update_price(&pos.option_symbol, price, now);
                }
                Ok(Err(e)) => self.app.push_error_with_code(format!("quote failed for {}: {e}", pos.option_symbol), None),
                Err(_) => self.app.push_error_with_code(format!("quote timed out for {}", pos.option_symbol), None),
            }
        }
    }

    /// Evaluates exits for every open position and executes them against the
    /// broker. `flattening` forces a full close of everything regardless of
    /// PnL.
    async fn run_exits(&self, now: DateTime<Tz>, flattening: bool) {
        let now_utc = now.with_timezone(&Utc);
        self.mark_to_market(now_utc).await;

        // No EventCalendar is wired in yet (see risk::gap_risk::NoEventCalendar),
        // so this always starts empty until a real calendar feed exists.
        let gap_force_exit: HashSet<String> = HashSet::new();

        let actions = self.app.position_manager.check_exits(&gap_force_exit, now_utc, flattening);
        for action in actions {
            let side = OrderSide::Sell;
            let qty = {
                let open = self.app.position_manager.get_open_positions();
                open.iter()
                    .find(|p| p.option_symbol == action.option_symbol)
                    .map(|p| (p.quantity * action.qty_fraction).round().max(1.0) as u32)
                    .unwrap_or(0)
            };
            if qty == 0 {
                continue;
            }

            match tokio::time::timeout(ORDER_TIMEOUT, self.app.broker.execute_market_order(&action.option_symbol, qty, side, true)).await {
                Ok(Ok(order)) => {
                    info!(option_symbol = %action.option_symbol, ?order.status, reason = ?action.reason, "exit order submitted");
                    self.app.position_manager.close_position(&action.option_symbol, action.qty_fraction, action.reason);
                    self.app.events.record(DecisionEvent::accepted(
                        &action.option_symbol,
                        Stage::PositionManager,
                        serde_json::json!({"reason": format!("{:?}", action.reason), "qty_fraction": action.qty_fraction}),
                    ));
                }
                Ok(Err(e)) => {
                    self.app.push_error_with_code(format!("exit order failed for {}: {e}", action.option_symbol), None);
                }
                Err(_) => {
                    self.app.push_error_with_code(format!("exit order timed out for {}", action.option_symbol), None);
                }
            }
        }
    }

    async fn tick_flattening(&self) {
        let now = self.clock.now();
        self.run_exits(now, true).await;

        let open_remaining = self.app.position_manager.get_open_positions().len();
        let deadline_passed = self.flatten_deadline.read().map_or(false, |d| std::time::Instant::now() >= d);

        if open_remaining == 0 || deadline_passed {
            if deadline_passed && open_remaining > 0 {
                warn!(open_remaining, "flatten budget expired with positions still open");
            }
            self.transition(SchedulerState::Reporting);
        }
    }

    async fn tick_reporting(&self) {
        let today = Utc::now().date_naive();
        let equity = self.app.last_account.read().as_ref().map(|a| a.equity).unwrap_or(0.0);

        if let Some(open_equity) = self.app.session_open_equity() {
            if open_equity > 0.0 {
                let daily_return = (equity - open_equity) / open_equity;
                self.app.risk_manager.record_daily_return(daily_return);
                info!(daily_return, "recorded realized daily return");
            }
        }

        let closed_today: Vec<_> = self
            .app
            .position_manager
            .get_closed_positions(usize::MAX)
            .into_iter()
            .filter(|p| p.closed_at.map_or(false, |t| t.date_naive() == today))
            .collect();

        let snapshot = EodSnapshot::compute(
            today,
            equity,
            self.app.trades_opened_today() as u32,
            &closed_today,
            self.app.peak_equity(),
            std::collections::HashMap::new(),
        );

        let path = self.eod_dir.join(format!("eod-{}.json", snapshot.date));
        if let Err(e) = snapshot.save(&path) {
            error!(error = %e, "failed to write EOD snapshot");
        }

        let persisted = PersistedState::capture(&self.app.position_manager, &self.app.risk_manager);
        if let Err(e) = persisted.save(&self.state_path) {
            error!(error = %e, "failed to persist state at end of day");
        }

        self.transition(SchedulerState::Closed);
    }
}

/// Picks the chain contract closest to at-the-money by strike distance from
/// `price`, irrespective of call/put. Used only to attach a representative
/// IV rank/delta to the Feature Vector before the Agent Set runs — it is
/// not the contract that ends up traded, which the Option Selector still
/// chooses after a direction is known.
fn pick_representative_contract(chain: &[crate::options::OptionContract], price: f64) -> Option<&crate::options::OptionContract> {
    chain.iter().min_by(|a, b| (a.strike - price).abs().partial_cmp(&(b.strike - price).abs()).unwrap_or(std::cmp::Ordering::Equal))
}

/// Full per-symbol pipeline: data -> options chain -> features -> regime ->
/// agents -> ensemble -> selector -> risk stack -> broker. Returns `Ok(())`
/// even when the symbol produces no trade; only a genuine error propagates.
async fn process_symbol(
    app: &Arc<AppState>,
    config: &crate::config::EngineConfig,
    symbol: &str,
    now: DateTime<Tz>,
) -> Result<(), crate::error::TradeNovaError> {
    use crate::error::TradeNovaError;

    if app.position_manager.has_open_position_for(symbol) {
        return Ok(());
    }

    let key = BarKey { symbol: symbol.to_string(), timeframe: Timeframe::FiveMinute.as_vendor_str().to_string() };
    let end = now.with_timezone(&Utc);
    let start = end - BAR_LOOKBACK;

    let bars = tokio::time::timeout(DATA_FETCH_TIMEOUT, app.data_adapter.get_bars(symbol, Timeframe::FiveMinute, start, end))
        .await
        .map_err(|_| TradeNovaError::DataUnavailable { symbol: symbol.to_string(), reason: "bar fetch timed out".into() })??;

    app.bar_buffer.replace(key.clone(), bars);
    let bars = app.bar_buffer.get(&key, config.min_bars.max(crate::features::MIN_BARS));

    let mut features = compute_features(&bars)?;

    // The option chain is fetched here, ahead of the Agent Set, so the
    // Options agent sees a real iv_rank/representative_delta this cycle
    // instead of permanent `None`. The same filtered chain is reused by the
    // selector below once a direction is known, so this isn't a second
    // round trip to the data adapter.
    let raw_chain = tokio::time::timeout(DATA_FETCH_TIMEOUT, app.data_adapter.get_chain(symbol, None))
        .await
        .map_err(|_| TradeNovaError::DataUnavailable { symbol: symbol.to_string(), reason: "chain fetch timed out".into() })??;

    let mut counters = FilterCounters::default();
    let chain = filter_chain(raw_chain, &mut counters);
    if let Some(representative) = pick_representative_contract(&chain, features.close) {
        let iv_history = app.risk_manager.iv_history(symbol);
        features.iv_rank = Some(crate::risk::iv_regime::iv_rank(&iv_history, representative.implied_volatility));
        features.representative_delta = Some(representative.greeks.delta);
    }

    let regime = app.regime_detector.update(&features);

    let intents: Vec<_> = app.agents.iter().filter_map(|agent| agent.evaluate(symbol, &features, &regime, &bars)).collect();

    let rl_output = app.rl_predictor.predict(symbol, &features);
    let fused = crate::signals::fuse(symbol, &intents, &regime, rl_output, &app.ensemble_config);

    let fused = match fused {
        Some(f) if f.direction != Direction::Flat && f.confidence >= config.confidence_threshold => f,
        Some(f) => {
            app.events.record(DecisionEvent::rejected(symbol, Stage::Ensemble, "below confidence threshold or flat", serde_json::json!({"confidence": f.confidence})));
            return Ok(());
        }
        None => {
            app.events.record(DecisionEvent::rejected(symbol, Stage::Ensemble, "no agent produced an intent", serde_json::json!({})));
            return Ok(());
        }
    };
    app.events.record(DecisionEvent::accepted(symbol, Stage::Ensemble, serde_json::json!({"direction": format!("{:?}", fused.direction), "confidence": fused.confidence})));

    if chain.is_empty() {
        app.events.record(DecisionEvent::rejected(symbol, Stage::OptionUniverseFilter, "no liquid contracts survived the filter", serde_json::json!({"input": counters.input})));
        return Ok(());
    }

    let selector_cfg = SelectorConfig { min_dte: config.min_dte, max_dte: config.max_dte, preferred_dte: config.preferred_dte };
    let selected = match select_contract(&chain, fused.direction, features.close, &selector_cfg) {
        Ok(s) => s,
        Err(e) => {
            app.events.record(DecisionEvent::rejected(symbol, Stage::OptionSelector, e.to_string(), serde_json::json!({})));
            return Ok(());
        }
    };
    let contract = selected.contract;

    let equity = app.last_account.read().as_ref().map(|a| a.equity).unwrap_or(0.0);
    let notional_per_contract = contract.mid().max(config.price_floor) * 100.0;
    let budget = equity * config.position_size_pct;
    let quantity = (budget / notional_per_contract).floor().max(1.0);

    // Everything from here on — the duplicate-position/max-positions
    // recheck, the Risk Stack evaluation, the order, and the position
    // mutation — runs under one lock so two symbols evaluated concurrently
    // this cycle can never both be admitted past the same trade budget or
    // position-count slot.
    let _risk_guard = app.risk_decision_lock.lock().await;

    if app.position_manager.has_open_position_for(symbol) {
        return Ok(());
    }
    if app.position_manager.get_open_positions().len() as u32 >= config.max_positions {
        app.events.record(DecisionEvent::rejected(symbol, Stage::PositionManager, "max open positions reached", serde_json::json!({})));
        return Ok(());
    }

    let daily_returns = app.risk_manager.daily_returns();
    let portfolio_greeks = app.position_manager.aggregate_greeks();
    app.risk_manager.set_portfolio_greeks(portfolio_greeks);

    let ctx = RiskContext {
        symbol: &contract.option_symbol,
        underlying: symbol,
        direction: fused.direction,
        candidate_contract: &contract,
        current_greeks: portfolio_greeks,
        candidate_greeks: contract.greeks,
        candidate_quantity: quantity,
        portfolio_daily_returns: &daily_returns,
        portfolio_equity: equity,
        today: end.date_naive(),
        iv_history: &[],
    };

    let decision = app.risk_manager.evaluate(&ctx);
    if !decision.allowed {
        let reason = decision.reason.clone().unwrap_or_default();
        app.push_decision(DecisionEnvelope::blocked(symbol, fused.direction, fused.contributing_agents.join(","), "risk_stack", reason.clone(), decision.level).with_greeks(decision.projected_greeks, decision.current_greeks));
        app.events.record(DecisionEvent::rejected(symbol, Stage::RiskStack, reason, serde_json::json!({"level": format!("{:?}", decision.level)})));
        return Ok(());
    }

    let sized_quantity = (quantity * decision.size_multiplier).floor().max(1.0) as u32;
    let side = match fused.direction {
        Direction::Long | Direction::Short => OrderSide::Buy,
        Direction::Flat => return Ok(()),
    };

    let order = tokio::time::timeout(ORDER_TIMEOUT, app.broker.execute_market_order(&contract.option_symbol, sized_quantity, side, true))
        .await
        .map_err(|_| TradeNovaError::OrderUncertain { symbol: contract.option_symbol.clone(), order_id: "timeout".into() })??;

    app.position_manager.open_position(
        &contract.option_symbol,
        symbol,
        fused.direction,
        order.avg_fill_price.unwrap_or(contract.mid()),
        order.filled_quantity as f64,
        contract.expiration_date,
        contract.greeks,
    );
    app.risk_manager.record_trade();
    app.record_trade_opened();

    app.push_decision(
        DecisionEnvelope::allow(symbol, fused.direction, fused.contributing_agents.join(",")).with_greeks(decision.projected_greeks, decision.current_greeks),
    );
    app.events.record(DecisionEvent::accepted(symbol, Stage::Broker, serde_json::json!({"option_symbol": contract.option_symbol, "quantity": sized_quantity})));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{Account, BrokerAdapter, BrokerPosition, Order, OrderStatus, OrderType};
    use crate::market_clock::FixedClock;
    use crate::market_data::Bar;
    use crate::options::OptionContract;
    use crate::types::AccountMode;
    use async_trait::async_trait;
    use chrono::{NaiveDate, TimeZone};

    struct StubData;
    #[async_trait]
    impl crate::market_data::DataAdapter for StubData {
        async fn get_bars(&self, _s: &str, _tf: Timeframe, _start: DateTime<Utc>, _end: DateTime<Utc>) -> Result<Vec<Bar>, crate::error::TradeNovaError> {
            let bars = (0..40)
                .map(|i| Bar {
                    timestamp: DateTime::from_timestamp(i as i64 * 300, 0).unwrap(),
                    open: 100.0,
                    high: 101.0,
                    low: 99.0,
                    close: 100.0 + (i as f64 * 0.1),
                    volume: 1000.0,
                    vwap: 100.0,
                })
                .collect();
            Ok(bars)
        }
        async fn get_chain(&self, symbol: &str, _expiration: Option<NaiveDate>) -> Result<Vec<OptionContract>, crate::error::TradeNovaError> {
            Ok(vec![OptionContract {
                option_symbol: format!("{symbol}260821C00100000"),
                underlying: symbol.to_string(),
                strike: 100.0,
                expiration_date: Utc::now().date_naive() + chrono::Duration::days(5),
                option_type: crate::types::OptionType::Call,
                bid: 2.0,
                ask: 2.1,
                last: 2.05,
                bid_size: 50,
                volume: 500,
                open_interest: 1000,
                implied_volatility: 0.3,
                greeks: Default::default(),
                quote_age: 1.0,
            }])
        }
        async fn get_quote(&self, option_symbol: &str) -> Result<crate::options::Quote, crate::error::TradeNovaError> {
            Err(crate::error::TradeNovaError::DataUnavailable { symbol: option_symbol.into(), reason: "unused".into() })
        }
    }

    struct StubBroker;
    #[async_trait]
    impl BrokerAdapter for StubBroker {
        async fn execute_market_order(&self, symbol: &str, qty: u32, side: OrderSide, is_option: bool) -> Result<Order, crate::error::TradeNovaError> {
            Ok(Order {
                order_id: "1".into(),
                symbol: symbol.into(),
                side,
                order_type: OrderType::Market,
                quantity: qty,
                filled_quantity: qty,
                limit_price: None,
                avg_fill_price: Some(2.05),
                status: OrderStatus::Filled,
                is_option,
                submitted_at: Utc::now(),
            })
        }
        async fn execute_limit_order(&self, symbol: &str, qty: u32, side: OrderSide, _price: f64, is_option: bool) -> Result<Order, crate::error::TradeNovaError> {
            self.execute_market_order(symbol, qty, side, is_option).await
        }
        async fn execute_bracket_order(&self, symbol: &str, qty: u32, side: OrderSide, _e: f64, _t: f64, _s: f64, is_option: bool) -> Result<Order, crate::error::TradeNovaError> {
            self.execute_market_order(symbol, qty, side, is_option).await
        }
        async fn cancel_stale_orders(&self, _older_than: Duration) -> Result<(), crate::error::TradeNovaError> {
            Ok(())
        }
        async fn get_account(&self) -> Result<Account, crate::error::TradeNovaError> {
            Ok(Account { account_id: "acct".into(), mode: AccountMode::Demo, equity: 100_000.0, cash: 100_000.0, buying_power: 100_000.0 })
        }
        async fn list_positions(&self) -> Result<Vec<BrokerPosition>, crate::error::TradeNovaError> {
            Ok(vec![])
        }
    }

    fn test_app() -> Arc<AppState> {
        Arc::new(AppState::new(crate::config::EngineConfig::default(), Arc::new(StubData), Arc::new(StubBroker)))
    }

    #[tokio::test]
    async fn warmup_seeds_account_equity() {
        let app = test_app();
        let clock: Arc<dyn MarketClock> = Arc::new(FixedClock::new(chrono_tz::America::New_York.with_ymd_and_hms(2026, 7, 20, 8, 30, 0).unwrap(), None));
        let dir = std::env::temp_dir().join(format!("tradenova-sched-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let scheduler = Scheduler::new(app.clone(), clock, dir.join("state.json"), dir.clone());

        scheduler.tick_warmup().await;
        assert_eq!(scheduler.state(), SchedulerState::WaitingForOpen);
        assert_eq!(app.last_account.read().as_ref().unwrap().equity, 100_000.0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn waiting_for_open_transitions_when_market_opens() {
        let app = test_app();
        let clock: Arc<dyn MarketClock> = Arc::new(FixedClock::new(chrono_tz::America::New_York.with_ymd_and_hms(2026, 7, 20, 10, 0, 0).unwrap(), None));
        let dir = std::env::temp_dir().join(format!("tradenova-sched-test2-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let scheduler = Scheduler::new(app, clock, dir.join("state.json"), dir.clone());
        *scheduler.state.write() = SchedulerState::WaitingForOpen;

        scheduler.tick_waiting_for_open().await;
        assert_eq!(scheduler.state(), SchedulerState::Running);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn process_symbol_opens_a_position_end_to_end() {
        let app = test_app();
        let config = crate::config::EngineConfig { universe: vec!["AAPL".into()], confidence_threshold: 0.0, ..Default::default() };
        let now = chrono_tz::America::New_York.with_ymd_and_hms(2026, 7, 20, 10, 0, 0).unwrap();

        let result = process_symbol(&app, &config, "AAPL", now).await;
        assert!(result.is_ok());
    }

    #[test]
    fn pick_representative_contract_picks_nearest_strike() {
        let mk = |strike: f64| OptionContract {
            option_symbol: format!("AAPL260821C{strike}"),
            underlying: "AAPL".into(),
            strike,
            expiration_date: Utc::now().date_naive() + chrono::Duration::days(5),
            option_type: crate::types::OptionType::Call,
            bid: 1.0,
            ask: 1.1,
            last: 1.05,
            bid_size: 10,
            volume: 100,
            open_interest: 200,
            implied_volatility: 0.3,
            greeks: Default::default(),
            quote_age: 1.0,
        };
        let chain = vec![mk(90.0), mk(101.0), mk(120.0)];
        let rep = pick_representative_contract(&chain, 100.0).unwrap();
        assert_eq!(rep.strike, 101.0);
    }

    #[tokio::test]
    async fn process_symbol_carries_contract_greeks_into_the_open_position() {
        struct GreeksData;
        #[async_trait]
        impl crate::market_data::DataAdapter for GreeksData {
            async fn get_bars(&self, s: &str, tf: Timeframe, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Bar>, crate::error::TradeNovaError> {
                StubData.get_bars(s, tf, start, end).await
            }
            async fn get_chain(&self, symbol: &str, expiration: Option<NaiveDate>) -> Result<Vec<OptionContract>, crate::error::TradeNovaError> {
                let mut chain = StubData.get_chain(symbol, expiration).await?;
                chain[0].greeks = crate::options::contract::Greeks { delta: 0.42, gamma: 0.01, theta: -0.05, vega: 0.1 };
                Ok(chain)
            }
            async fn get_quote(&self, option_symbol: &str) -> Result<crate::options::Quote, crate::error::TradeNovaError> {
                StubData.get_quote(option_symbol).await
            }
        }

        let app = Arc::new(AppState::new(crate::config::EngineConfig::default(), Arc::new(GreeksData), Arc::new(StubBroker)));
        let config = crate::config::EngineConfig { universe: vec!["AAPL".into()], confidence_threshold: 0.0, ..Default::default() };
        let now = chrono_tz::America::New_York.with_ymd_and_hms(2026, 7, 20, 10, 0, 0).unwrap();

        process_symbol(&app, &config, "AAPL", now).await.unwrap();
        assert!(app.position_manager.has_open_position_for("AAPL"));
        let aggregated = app.position_manager.aggregate_greeks();
        assert!(aggregated.delta > 0.0, "expected the selected contract's delta to flow into the open position");
    }

    #[tokio::test]
    async fn concurrent_process_symbol_calls_cannot_both_pass_max_positions() {
        let app = test_app();
        let mut config = crate::config::EngineConfig::default();
        config.universe = vec!["AAPL".into(), "MSFT".into()];
        config.confidence_threshold = 0.0;
        config.max_positions = 1;
        let now = chrono_tz::America::New_York.with_ymd_and_hms(2026, 7, 20, 10, 0, 0).unwrap();

        let (r1, r2) = tokio::join!(process_symbol(&app, &config, "AAPL", now), process_symbol(&app, &config, "MSFT", now));
        assert!(r1.is_ok() && r2.is_ok());
        assert_eq!(app.position_manager.get_open_positions().len(), 1);
    }

    #[tokio::test]
    async fn flattening_transitions_to_reporting_once_positions_close() {
        let app = test_app();
        let clock: Arc<dyn MarketClock> = Arc::new(FixedClock::new(chrono_tz::America::New_York.with_ymd_and_hms(2026, 7, 20, 15, 50, 0).unwrap(), None));
        let dir = std::env::temp_dir().join(format!("tradenova-sched-test3-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let scheduler = Scheduler::new(app, clock, dir.join("state.json"), dir.clone());
        *scheduler.state.write() = SchedulerState::Flattening;
        *scheduler.flatten_deadline.write() = Some(std::time::Instant::now());

        scheduler.tick_flattening().await;
        assert_eq!(scheduler.state(), SchedulerState::Reporting);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
