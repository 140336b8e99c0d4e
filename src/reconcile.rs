// =============================================================================
// Reconciliation — compare internal positions against the broker's book
// =============================================================================
//
// SAFETY POLICY: this module logs warnings for any drift it discovers but
// will **never** automatically close positions or cancel orders itself. A
// human operator or the Scheduler's own flatten logic resolves discrepancies.
//
// Grounded in the donor's `reconcile.rs` (fetch exchange state, diff against
// internal positions, warn on orphans/drift, refresh a shared balance
// cache) generalized from spot balances to the `BrokerAdapter` trait's
// `Account`/`BrokerPosition` types.

use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::broker::{Account, BrokerAdapter};
use crate::position_engine::PositionManager;

/// Summary of a single reconciliation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileResult {
    pub positions_matched: u32,
    pub orphan_positions: u32,
    pub equity_drift: bool,
    pub timestamp: String,
}

/// Run one reconciliation cycle against the broker.
pub async fn reconcile_once(
    broker: &dyn BrokerAdapter,
    position_manager: &PositionManager,
    last_account: &RwLock<Option<Account>>,
) -> Result<ReconcileResult> {
    let now = Utc::now().to_rfc3339();
    info!(timestamp = %now, "reconciliation cycle started");

    let broker_positions = broker.list_positions().await.context("reconcile: failed to list broker positions")?;
    let broker_symbols: std::collections::HashSet<String> = broker_positions.iter().map(|p| p.symbol.clone()).collect();

    let open_positions = position_manager.get_open_positions();
    let mut matched: u32 = 0;
    let mut orphans: u32 = 0;

    for pos in &open_positions {
        if broker_symbols.contains(&pos.option_symbol) {
            matched += 1;
            debug!(position_id = %pos.id, option_symbol = %pos.option_symbol, "position matched with broker");
        } else {
            orphans += 1;
            warn!(
                position_id = %pos.id,
                option_symbol = %pos.option_symbol,
                "internal position has NO matching broker position — possible drift"
            );
        }
    }

    let internal_symbols: std::collections::HashSet<String> = open_positions.iter().map(|p| p.option_symbol.clone()).collect();
    for bp in &broker_positions {
        if !internal_symbols.contains(&bp.symbol) {
            warn!(symbol = %bp.symbol, "broker reports a position with no matching internal record — possible drift");
        }
    }

    let equity_drift = refresh_account(broker, last_account).await?;

    let result = ReconcileResult {
        positions_matched: matched,
        orphan_positions: orphans,
        equity_drift,
        timestamp: now.clone(),
    };

    info!(
        positions_matched = matched,
        orphan_positions = orphans,
        equity_drift,
        timestamp = %now,
        "reconciliation cycle completed"
    );

    Ok(result)
}

/// Fetch the account snapshot and update the shared cache. Returns `true`
/// if equity changed by more than 0.01% relative to the previous snapshot.
async fn refresh_account(broker: &dyn BrokerAdapter, last_account: &RwLock<Option<Account>>) -> Result<bool> {
    let account = broker.get_account().await.context("reconcile: failed to fetch account")?;

    let drift = {
        let prev = last_account.read();
        match prev.as_ref() {
            Some(p) if p.equity > 0.0 => ((account.equity - p.equity) / p.equity).abs() > 0.0001,
            Some(_) => account.equity > 0.0,
            None => false,
        }
    };

    if drift {
        warn!(equity = account.equity, "account equity drift detected during reconciliation");
    } else {
        debug!(equity = account.equity, "account refreshed — no significant drift");
    }

    *last_account.write() = Some(account);
    Ok(drift)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    use crate::broker::{BrokerPosition, Order, OrderSide, OrderStatus, OrderType};
    use crate::error::TradeNovaError;
    use crate::types::AccountMode;

    struct StubBroker {
        positions: Vec<BrokerPosition>,
        equity: f64,
    }

    #[async_trait]
    impl BrokerAdapter for StubBroker {
        async fn execute_market_order(&self, symbol: &str, qty: u32, side: OrderSide, is_option: bool) -> Result<Order, TradeNovaError> {
            Ok(Order {
                order_id: "1".into(),
                symbol: symbol.into(),
                side,
                order_type: OrderType::Market,
                quantity: qty,
                filled_quantity: qty,
                limit_price: None,
                avg_fill_price: Some(1.0),
                status: OrderStatus::Filled,
                is_option,
                submitted_at: Utc::now(),
            })
        }
        async fn execute_limit_order(&self, symbol: &str, qty: u32, side: OrderSide, _price: f64, is_option: bool) -> Result<Order, TradeNovaError> {
            self.execute_market_order(symbol, qty, side, is_option).await
        }
        async fn execute_bracket_order(
            &self,
            symbol: &str,
            qty: u32,
            side: OrderSide,
            _entry: f64,
            _take_profit: f64,
            _stop_loss: f64,
            is_option: bool,
        ) -> Result<Order, TradeNovaError> {
            self.execute_market_order(symbol, qty, side, is_option).await
        }
        async fn cancel_stale_orders(&self, _older_than: Duration) -> Result<(), TradeNovaError> {
            Ok(())
        }
        async fn get_account(&self) -> Result<Account, TradeNovaError> {
            Ok(Account {
                account_id: "acct".into(),
                mode: AccountMode::Demo,
                equity: self.equity,
                cash: self.equity,
                buying_power: self.equity,
            })
        }
        async fn list_positions(&self) -> Result<Vec<BrokerPosition>, TradeNovaError> {
            Ok(self.positions.clone())
        }
    }

    #[tokio::test]
    async fn matches_positions_present_on_both_sides() {
        let pm = PositionManager::new();
        let expiration = Utc::now().date_naive() + chrono::Duration::days(20);
        pm.open_position("AAPL260821C00150000", "AAPL", crate::types::Direction::Long, 1.0, 10.0, expiration, Default::default());

        let broker = StubBroker {
            positions: vec![BrokerPosition {
                symbol: "AAPL260821C00150000".into(),
                quantity: 10.0,
                avg_entry_price: 1.0,
                market_value: 1000.0,
                unrealized_pnl: 0.0,
                is_option: true,
            }],
            equity: 100_000.0,
        };

        let last_account = RwLock::new(None);
        let result = reconcile_once(&broker, &pm, &last_account).await.unwrap();
        assert_eq!(result.positions_matched, 1);
        assert_eq!(result.orphan_positions, 0);
        assert!(!result.equity_drift);
    }

    #[tokio::test]
    async fn detects_orphan_internal_position() {
        let pm = PositionManager::new();
        let expiration = Utc::now().date_naive() + chrono::Duration::days(20);
        pm.open_position("AAPL260821C00150000", "AAPL", crate::types::Direction::Long, 1.0, 10.0, expiration, Default::default());

        let broker = StubBroker { positions: vec![], equity: 100_000.0 };
        let last_account = RwLock::new(None);
        let result = reconcile_once(&broker, &pm, &last_account).await.unwrap();
        assert_eq!(result.orphan_positions, 1);
    }

    #[tokio::test]
    async fn detects_equity_drift() {
        let pm = PositionManager::new();
        let broker = StubBroker { positions: vec![], equity: 50_000.0 };
        let last_account = RwLock::new(Some(Account {
            account_id: "acct".into(),
            mode: AccountMode::Demo,
            equity: 100_000.0,
            cash: 100_000.0,
            buying_power: 100_000.0,
        }));
        let result = reconcile_once(&broker, &pm, &last_account).await.unwrap();
        assert!(result.equity_drift);
    }
}
