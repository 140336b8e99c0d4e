// =============================================================================
// Position Engine — 5-tier take-profit ladder, trailing stop, DTE/gap/EOD exits
// =============================================================================
//
// Directly grounded in the donor's `position_engine.rs` (`Position`,
// `PositionStatus`, in-place mutation via `parking_lot::RwLock`, `check_exits`
// scanning open positions in priority order, `close_position` moving a
// position into the closed list while accumulating realised PnL). The
// donor's 2-tier TP60/SL0.5% ladder is replaced by the 5-tier
// TP40/60/100/150/200 ladder plus DTE exits, gap-force-exit, and EOD
// flatten.
//
// Every position here is a *long* option purchase (the SHORT -> PUT default
// still buys a put, it never sells premium), so `pnl_pct` is always simply
// `(current - entry) / entry` regardless of the underlying directional
// thesis recorded in `direction`.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::options::contract::Greeks;
use crate::types::Direction;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const STOP_LOSS_PCT: f64 = -0.20;
pub const TP1_PCT: f64 = 0.40;
pub const TP2_PCT: f64 = 0.60;
pub const TP3_PCT: f64 = 1.00;
pub const TP4_PCT: f64 = 1.50;
pub const TP5_PCT: f64 = 2.00;
pub const TP1_CLOSE_FRACTION: f64 = 0.50;
pub const TP2_CLOSE_FRACTION: f64 = 0.20;
pub const TP3_CLOSE_FRACTION: f64 = 0.10;
pub const TP4_CLOSE_FRACTION: f64 = 0.10;
pub const TRAILING_ARM_LOCK_PCT: f64 = 1.00;
pub const DTE_EXIT_NEAR: i64 = 3;
pub const DTE_EXIT_NEAR_MAX_PNL: f64 = 0.20;
pub const DTE_EXIT_IMMINENT: i64 = 1;
pub const DTE_EXIT_IMMINENT_MAX_PNL: f64 = 0.50;

fn trailing_pullback_pct(highest_profit_pct: f64) -> f64 {
    if highest_profit_pct < 1.5 {
        0.10
    } else if highest_profit_pct < 2.5 {
        0.14
    } else {
        0.18
    }
}

// ---------------------------------------------------------------------------
// Position model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    PartiallyClosed,
    Closed,
}

impl std::fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "Open"),
            Self::PartiallyClosed => write!(f, "PartiallyClosed"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    TakeProfit1,
    TakeProfit2,
    TakeProfit3,
    TakeProfit4,
    TakeProfit5,
    TrailingStop,
    DteExit,
    GapForceExit,
    EndOfDayFlatten,
    Manual,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// A single tracked option position. Always a long purchase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub option_symbol: String,
    pub underlying: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub quantity: f64,
    pub original_quantity: f64,
    /// Greeks of the contract at entry, used to aggregate the portfolio book.
    #[serde(default)]
    pub greeks: Greeks,
    #[serde(default)]
    pub current_price: f64,
    #[serde(default)]
    pub pnl_pct: f64,
    #[serde(default)]
    pub highest_profit_pct: f64,
    pub expiration_date: NaiveDate,
    #[serde(default)]
    pub tp1_fired: bool,
    #[serde(default)]
    pub tp2_fired: bool,
    #[serde(default)]
    pub tp3_fired: bool,
    #[serde(default)]
    pub tp4_fired: bool,
    #[serde(default)]
    pub trailing_armed: bool,
    pub status: PositionStatus,
    pub opened_at: DateTime<Utc>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub close_reason: Option<ExitReason>,
    #[serde(default)]
    pub realized_pnl: f64,
}

impl Position {
    fn dte(&self, today: NaiveDate) -> i64 {
        (self.expiration_date - today).num_days()
    }
}

/// One exit/reduction to carry out against the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitAction {
    pub position_id: String,
    pub option_symbol: String,
    /// Fraction of the position's *current remaining* quantity to close.
    pub qty_fraction: f64,
    pub reason: ExitReason,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedPosition {
    pub position: Position,
    pub total_realized_pnl: f64,
}

// ---------------------------------------------------------------------------
// Position Manager
// ---------------------------------------------------------------------------

pub struct PositionManager {
    open: RwLock<Vec<Position>>,
    closed: RwLock<Vec<Position>>,
}

impl PositionManager {
    pub fn new() -> Self {
        Self {
            open: RwLock::new(Vec::new()),
            closed: RwLock::new(Vec::new()),
        }
    }

    /// One open position per underlying at a time (spec's duplicate policy).
    pub fn has_open_position_for(&self, underlying: &str) -> bool {
        self.open.read().iter().any(|p| p.underlying == underlying)
    }

    pub fn open_position(
        &self,
        option_symbol: &str,
        underlying: &str,
        direction: Direction,
        entry_price: f64,
        quantity: f64,
        expiration_date: NaiveDate,
        greeks: Greeks,
    ) -> Position {
        let now = Utc::now();
        let pos = Position {
            id: Uuid::new_v4().to_string(),
            option_symbol: option_symbol.to_string(),
            underlying: underlying.to_string(),
            direction,
            entry_price,
            quantity,
            original_quantity: quantity,
            greeks,
            current_price: entry_price,
            pnl_pct: 0.0,
            highest_profit_pct: 0.0,
            expiration_date,
            tp1_fired: false,
            tp2_fired: false,
            tp3_fired: false,
            tp4_fired: false,
            trailing_armed: false,
            status: PositionStatus::Open,
            opened_at: now,
            closed_at: None,
            close_reason: None,
            realized_pnl: 0.0,
        };

        info!(
            id = %pos.id,
            option_symbol,
            underlying,
            %direction,
            entry_price,
            quantity,
            "position opened"
        );

        self.open.write().push(pos.clone());
        pos
    }

    /// Marks every open position on `option_symbol` to `price`. Callers are
    /// responsible for resolving the mark-to-market fallback ordering (live
    /// quote -> chain close -> last known last price) before calling this.
    pub fn update_price(&self, option_symbol: &str, price: f64, _now: DateTime<Utc>) {
        let mut positions = self.open.write();
        for pos in positions.iter_mut().filter(|p| p.option_symbol == option_symbol) {
            pos.current_price = price;
            pos.pnl_pct = if pos.entry_price > 0.0 {
                (price - pos.entry_price) / pos.entry_price
            } else {
                0.0
            };
            if pos.pnl_pct > pos.highest_profit_pct {
                pos.highest_profit_pct = pos.pnl_pct;
            }
        }
    }

    /// Evaluates every open position against the exit rules and applies any
    /// partial closes in place. Returns the exit/reduction actions to send
    /// to the broker this cycle; full closes are left open here and must be
    /// finalized via `close_position` once the broker confirms the fill.
    /// `flattening` is set by the Scheduler once it transitions into its
    /// end-of-day flatten state.
    pub fn check_exits(&self, gap_force_exit: &HashSet<String>, now: DateTime<Utc>, flattening: bool) -> Vec<ExitAction> {
        let today = now.date_naive();
        let mut actions = Vec::new();
        let mut positions = self.open.write();

        for pos in positions.iter_mut() {
            if pos.status == PositionStatus::Closed {
                continue;
            }

            if flattening {
                actions.push(ExitAction {
                    position_id: pos.id.clone(),
                    option_symbol: pos.option_symbol.clone(),
                    qty_fraction: 1.0,
                    reason: ExitReason::EndOfDayFlatten,
                });
                continue;
            }

            if gap_force_exit.contains(&pos.underlying) {
                actions.push(ExitAction {
                    position_id: pos.id.clone(),
                    option_symbol: pos.option_symbol.clone(),
                    qty_fraction: 1.0,
                    reason: ExitReason::GapForceExit,
                });
                continue;
            }

            if pos.pnl_pct <= STOP_LOSS_PCT {
                actions.push(ExitAction {
                    position_id: pos.id.clone(),
                    option_symbol: pos.option_symbol.clone(),
                    qty_fraction: 1.0,
                    reason: ExitReason::StopLoss,
                });
                continue;
            }

            let mut fully_closed = false;

            if !pos.tp1_fired && pos.pnl_pct >= TP1_PCT {
                pos.tp1_fired = true;
                pos.status = PositionStatus::PartiallyClosed;
                actions.push(ExitAction {
                    position_id: pos.id.clone(),
                    option_symbol: pos.option_symbol.clone(),
                    qty_fraction: TP1_CLOSE_FRACTION,
                    reason: ExitReason::TakeProfit1,
                });
                debug!(id = %pos.id, pnl_pct = pos.pnl_pct, "TP1 hit");
            }
            if !pos.tp2_fired && pos.pnl_pct >= TP2_PCT {
                pos.tp2_fired = true;
                actions.push(ExitAction {
                    position_id: pos.id.clone(),
                    option_symbol: pos.option_symbol.clone(),
                    qty_fraction: TP2_CLOSE_FRACTION,
                    reason: ExitReason::TakeProfit2,
                });
                debug!(id = %pos.id, pnl_pct = pos.pnl_pct, "TP2 hit");
            }
            if !pos.tp3_fired && pos.pnl_pct >= TP3_PCT {
                pos.tp3_fired = true;
                actions.push(ExitAction {
                    position_id: pos.id.clone(),
                    option_symbol: pos.option_symbol.clone(),
                    qty_fraction: TP3_CLOSE_FRACTION,
                    reason: ExitReason::TakeProfit3,
                });
                debug!(id = %pos.id, pnl_pct = pos.pnl_pct, "TP3 hit");
            }
            if !pos.tp4_fired && pos.pnl_pct >= TP4_PCT {
                pos.tp4_fired = true;
                pos.trailing_armed = true;
                actions.push(ExitAction {
                    position_id: pos.id.clone(),
                    option_symbol: pos.option_symbol.clone(),
                    qty_fraction: TP4_CLOSE_FRACTION,
                    reason: ExitReason::TakeProfit4,
                });
                info!(id = %pos.id, pnl_pct = pos.pnl_pct, lock = TRAILING_ARM_LOCK_PCT, "TP4 hit, trailing stop armed");
            }
            if pos.pnl_pct >= TP5_PCT {
                actions.push(ExitAction {
                    position_id: pos.id.clone(),
                    option_symbol: pos.option_symbol.clone(),
                    qty_fraction: 1.0,
                    reason: ExitReason::TakeProfit5,
                });
                fully_closed = true;
            }

            if fully_closed {
                continue;
            }

            if pos.trailing_armed {
                let pullback = trailing_pullback_pct(pos.highest_profit_pct);
                if pos.pnl_pct <= pos.highest_profit_pct - pullback {
                    actions.push(ExitAction {
                        position_id: pos.id.clone(),
                        option_symbol: pos.option_symbol.clone(),
                        qty_fraction: 1.0,
                        reason: ExitReason::TrailingStop,
                    });
                    warn!(id = %pos.id, pullback, "trailing stop hit");
                    continue;
                }
            }

            let dte = pos.dte(today);
            if dte <= DTE_EXIT_IMMINENT && pos.pnl_pct < DTE_EXIT_IMMINENT_MAX_PNL {
                actions.push(ExitAction {
                    position_id: pos.id.clone(),
                    option_symbol: pos.option_symbol.clone(),
                    qty_fraction: 1.0,
                    reason: ExitReason::DteExit,
                });
            } else if dte <= DTE_EXIT_NEAR && pos.pnl_pct < DTE_EXIT_NEAR_MAX_PNL {
                actions.push(ExitAction {
                    position_id: pos.id.clone(),
                    option_symbol: pos.option_symbol.clone(),
                    qty_fraction: 1.0,
                    reason: ExitReason::DteExit,
                });
            }
        }

        actions
    }

    /// Closes `qty_fraction` of the position's *current remaining*
    /// quantity. A fraction of `1.0` moves the position to the closed list.
    pub fn close_position(&self, option_symbol: &str, qty_fraction: f64, reason: ExitReason) -> Option<ClosedPosition> {
        let mut open = self.open.write();
        let idx = open.iter().position(|p| p.option_symbol == option_symbol)?;

        let qty_fraction = qty_fraction.clamp(0.0, 1.0);
        let close_qty = open[idx].quantity * qty_fraction;
        let realized = (open[idx].current_price - open[idx].entry_price) * close_qty;
        open[idx].quantity -= close_qty;
        open[idx].realized_pnl += realized;

        if open[idx].quantity <= f64::EPSILON || qty_fraction >= 1.0 {
            let mut pos = open.remove(idx);
            pos.quantity = 0.0;
            pos.status = PositionStatus::Closed;
            pos.closed_at = Some(Utc::now());
            pos.close_reason = Some(reason);
            let total = pos.realized_pnl;

            info!(id = %pos.id, option_symbol, %reason, realized_pnl = total, "position closed");

            self.closed.write().push(pos.clone());
            Some(ClosedPosition { position: pos, total_realized_pnl: total })
        } else {
            open[idx].status = PositionStatus::PartiallyClosed;
            info!(
                id = %open[idx].id,
                option_symbol,
                %reason,
                close_qty,
                remaining = open[idx].quantity,
                "position partially closed"
            );
            None
        }
    }

    /// Re-inserts a position exactly as captured by a prior session's
    /// persisted snapshot (TP flags, trailing-armed state, id preserved).
    /// Used only at startup, before any cycle runs.
    pub fn restore_position(&self, pos: Position) {
        info!(id = %pos.id, option_symbol = %pos.option_symbol, "position restored from persisted state");
        self.open.write().push(pos);
    }

    pub fn get_open_positions(&self) -> Vec<Position> {
        self.open.read().clone()
    }

    /// Sums each open position's Greeks scaled by its remaining quantity and
    /// the standard 100-share option multiplier, for the Portfolio Greeks
    /// Caps layer's `current_greeks`.
    pub fn aggregate_greeks(&self) -> Greeks {
        self.open.read().iter().fold(Greeks::default(), |acc, p| Greeks {
            delta: acc.delta + p.greeks.delta * p.quantity * 100.0,
            gamma: acc.gamma + p.greeks.gamma * p.quantity * 100.0,
            theta: acc.theta + p.greeks.theta * p.quantity * 100.0,
            vega: acc.vega + p.greeks.vega * p.quantity * 100.0,
        })
    }

    pub fn get_closed_positions(&self, count: usize) -> Vec<Position> {
        let closed = self.closed.read();
        closed.iter().rev().take(count).cloned().collect()
    }
}

impl Default for PositionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PositionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PositionManager")
            .field("open_positions", &self.open.read().len())
            .field("closed_positions", &self.closed.read().len())
            .finish()
    }
}
