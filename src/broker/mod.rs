// =============================================================================
// Broker Adapter — vendor-agnostic order execution, options + equities
// =============================================================================
//
// Grounded in the donor's `BinanceClient` (`backend/src/binance/client.rs`):
// HMAC-SHA256 signed requests, `X-MBX-APIKEY`-style header auth, a
// `signed_query` helper appending timestamp/recvWindow/signature, typed
// `serde_json` response parsing, and a manually-redacted `Debug` impl. The
// donor's single BUY/SELL spot-market surface is generalized to equities vs.
// options endpoints, market/limit/bracket order types, and an explicit
// `retry::with_backoff` wrapper (the donor retries only at the websocket
// reconnect level, with a fixed 5s delay in `main.rs`).

pub mod retry;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, instrument, warn};

use crate::error::TradeNovaError;
use crate::types::AccountMode;

type HmacSha256 = Hmac<Sha256>;

// ---------------------------------------------------------------------------
// Order / account / position model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    fn as_vendor_str(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
    Bracket,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Filled,
    PartiallyFilled,
    Cancelled,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: u32,
    pub filled_quantity: u32,
    pub limit_price: Option<f64>,
    pub avg_fill_price: Option<f64>,
    pub status: OrderStatus,
    pub is_option: bool,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub account_id: String,
    pub mode: AccountMode,
    pub equity: f64,
    pub cash: f64,
    pub buying_power: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerPosition {
    pub symbol: String,
    pub quantity: f64,
    pub avg_entry_price: f64,
    pub market_value: f64,
    pub unrealized_pnl: f64,
    pub is_option: bool,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    async fn execute_market_order(&self, symbol: &str, qty: u32, side: OrderSide, is_option: bool) -> Result<Order, TradeNovaError>;

    async fn execute_limit_order(&self, symbol: &str, qty: u32, side: OrderSide, price: f64, is_option: bool) -> Result<Order, TradeNovaError>;

    async fn execute_bracket_order(
        &self,
        symbol: &str,
        qty: u32,
        side: OrderSide,
        entry: f64,
        take_profit: f64,
        stop_loss: f64,
        is_option: bool,
    ) -> Result<Order, TradeNovaError>;

    async fn cancel_stale_orders(&self, older_than: Duration) -> Result<(), TradeNovaError>;

    async fn get_account(&self) -> Result<Account, TradeNovaError>;

    async fn list_positions(&self) -> Result<Vec<BrokerPosition>, TradeNovaError>;
}

// ---------------------------------------------------------------------------
// Vendor implementation
// ---------------------------------------------------------------------------

/// HMAC-signed REST client against a single brokerage, split across
/// equities and options endpoints.
pub struct VendorBrokerAdapter {
    http: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
}

impl VendorBrokerAdapter {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    fn sign(&self, query: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes()).expect("HMAC accepts any key length");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn signed_query(&self, params: &[(&str, String)]) -> String {
        let ts = Utc::now().timestamp_millis();
        let mut base: String = params.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("&");
        if !base.is_empty() {
            base.push('&');
        }
        base.push_str(&format!("timestamp={ts}&recvWindow=5000"));
        let signature = self.sign(&base);
        format!("{base}&signature={signature}")
    }

    fn order_endpoint(&self, is_option: bool) -> &'static str {
        if is_option {
            "/v2/options/orders"
        } else {
            "/v2/equities/orders"
        }
    }

    async fn submit(&self, url: String, is_option: bool) -> Result<Order, TradeNovaError> {
        let resp = self
            .http
            .post(&url)
            .header("X-API-KEY", &self.api_key)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| TradeNovaError::BrokerTransient(e.to_string()))?;

        let status = resp.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(TradeNovaError::BrokerTransient(format!("broker returned {status}")));
        }
        if !status.is_success() {
            return Err(TradeNovaError::BrokerPermanent(format!("broker rejected order with {status}")));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| TradeNovaError::BrokerTransient(format!("malformed order response: {e}")))?;

        parse_order(&body, is_option)
    }
}

fn parse_order(body: &serde_json::Value, is_option: bool) -> Result<Order, TradeNovaError> {
    let order_id = body["order_id"].as_str().unwrap_or_default().to_string();
    let symbol = body["symbol"].as_str().unwrap_or_default().to_string();
    if order_id.is_empty() || symbol.is_empty() {
        return Err(TradeNovaError::OrderUncertain { symbol, order_id });
    }

    let side = match body["side"].as_str().unwrap_or("BUY") {
        "SELL" => OrderSide::Sell,
        _ => OrderSide::Buy,
    };
    let order_type = match body["type"].as_str().unwrap_or("MARKET") {
        "LIMIT" => OrderType::Limit,
        "BRACKET" => OrderType::Bracket,
        _ => OrderType::Market,
    };
    let status = match body["status"].as_str().unwrap_or("PENDING") {
        "FILLED" => OrderStatus::Filled,
        "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
        "CANCELLED" => OrderStatus::Cancelled,
        "REJECTED" => OrderStatus::Rejected,
        _ => OrderStatus::Pending,
    };

    Ok(Order {
        order_id,
        symbol,
        side,
        order_type,
        quantity: body["quantity"].as_u64().unwrap_or(0) as u32,
        filled_quantity: body["filled_quantity"].as_u64().unwrap_or(0) as u32,
        limit_price: body["price"].as_f64(),
        avg_fill_price: body["avg_fill_price"].as_f64(),
        status,
        is_option,
        submitted_at: Utc::now(),
    })
}

impl std::fmt::Debug for VendorBrokerAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VendorBrokerAdapter")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl BrokerAdapter for VendorBrokerAdapter {
    #[instrument(skip(self), name = "broker::execute_market_order")]
    async fn execute_market_order(&self, symbol: &str, qty: u32, side: OrderSide, is_option: bool) -> Result<Order, TradeNovaError> {
        retry::with_backoff("execute_market_order", || async {
            let query = self.signed_query(&[
                ("symbol", symbol.to_string()),
                ("side", side.as_vendor_str().to_string()),
                ("type", "MARKET".to_string()),
                ("quantity", qty.to_string()),
            ]);
            let url = format!("{}{}?{}", self.base_url, self.order_endpoint(is_option), query);
            debug!(symbol, qty, side = side.as_vendor_str(), is_option, "submitting market order");
            self.submit(url, is_option).await
        })
        .await
    }

    #[instrument(skip(self), name = "broker::execute_limit_order")]
    async fn execute_limit_order(&self, symbol: &str, qty: u32, side: OrderSide, price: f64, is_option: bool) -> Result<Order, TradeNovaError> {
        retry::with_backoff("execute_limit_order", || async {
            let query = self.signed_query(&[
                ("symbol", symbol.to_string()),
                ("side", side.as_vendor_str().to_string()),
                ("type", "LIMIT".to_string()),
                ("quantity", qty.to_string()),
                ("price", price.to_string()),
                ("timeInForce", "GTC".to_string()),
            ]);
            let url = format!("{}{}?{}", self.base_url, self.order_endpoint(is_option), query);
            debug!(symbol, qty, price, is_option, "submitting limit order");
            self.submit(url, is_option).await
        })
        .await
    }

    #[instrument(skip(self), name = "broker::execute_bracket_order")]
    async fn execute_bracket_order(
        &self,
        symbol: &str,
        qty: u32,
        side: OrderSide,
        entry: f64,
        take_profit: f64,
        stop_loss: f64,
        is_option: bool,
    ) -> Result<Order, TradeNovaError> {
        retry::with_backoff("execute_bracket_order", || async {
            let query = self.signed_query(&[
                ("symbol", symbol.to_string()),
                ("side", side.as_vendor_str().to_string()),
                ("type", "BRACKET".to_string()),
                ("quantity", qty.to_string()),
                ("entryPrice", entry.to_string()),
                ("takeProfitPrice", take_profit.to_string()),
                ("stopLossPrice", stop_loss.to_string()),
            ]);
            let url = format!("{}{}?{}", self.base_url, self.order_endpoint(is_option), query);
            debug!(symbol, qty, entry, take_profit, stop_loss, is_option, "submitting bracket order");
            self.submit(url, is_option).await
        })
        .await
    }

    #[instrument(skip(self), name = "broker::cancel_stale_orders")]
    async fn cancel_stale_orders(&self, older_than: Duration) -> Result<(), TradeNovaError> {
        retry::with_backoff("cancel_stale_orders", || async {
            let query = self.signed_query(&[("olderThanMs", older_than.as_millis().to_string())]);
            let url = format!("{}/v2/orders/cancel-stale?{}", self.base_url, query);

            let resp = self
                .http
                .post(&url)
                .header("X-API-KEY", &self.api_key)
                .timeout(Duration::from_secs(10))
                .send()
                .await
                .map_err(|e| TradeNovaError::BrokerTransient(e.to_string()))?;

            let status = resp.status();
            if status.is_server_error() || status.as_u16() == 429 {
                return Err(TradeNovaError::BrokerTransient(format!("broker returned {status}")));
            }
            if !status.is_success() {
                return Err(TradeNovaError::BrokerPermanent(format!("cancel-stale rejected with {status}")));
            }
            Ok(())
        })
        .await
    }

    #[instrument(skip(self), name = "broker::get_account")]
    async fn get_account(&self) -> Result<Account, TradeNovaError> {
        retry::with_backoff("get_account", || async {
            let query = self.signed_query(&[]);
            let url = format!("{}/v2/account?{}", self.base_url, query);

            let resp = self
                .http
                .get(&url)
                .header("X-API-KEY", &self.api_key)
                .timeout(Duration::from_secs(10))
                .send()
                .await
                .map_err(|e| TradeNovaError::BrokerTransient(e.to_string()))?;

            let status = resp.status();
            if status.is_server_error() {
                return Err(TradeNovaError::BrokerTransient(format!("broker returned {status}")));
            }
            if !status.is_success() {
                return Err(TradeNovaError::BrokerPermanent(format!("get_account rejected with {status}")));
            }

            let body: serde_json::Value = resp
                .json()
                .await
                .map_err(|e| TradeNovaError::BrokerTransient(format!("malformed account response: {e}")))?;

            let mode = match body["mode"].as_str().unwrap_or("demo") {
                "live" => AccountMode::Live,
                _ => AccountMode::Demo,
            };

            Ok(Account {
                account_id: body["account_id"].as_str().unwrap_or_default().to_string(),
                mode,
                equity: body["equity"].as_f64().unwrap_or(0.0),
                cash: body["cash"].as_f64().unwrap_or(0.0),
                buying_power: body["buying_power"].as_f64().unwrap_or(0.0),
            })
        })
        .await
    }

    #[instrument(skip(self), name = "broker::list_positions")]
    async fn list_positions(&self) -> Result<Vec<BrokerPosition>, TradeNovaError> {
        retry::with_backoff("list_positions", || async {
            let query = self.signed_query(&[]);
            let url = format!("{}/v2/positions?{}", self.base_url, query);

            let resp = self
                .http
                .get(&url)
                .header("X-API-KEY", &self.api_key)
                .timeout(Duration::from_secs(10))
                .send()
                .await
                .map_err(|e| TradeNovaError::BrokerTransient(e.to_string()))?;

            let status = resp.status();
            if status.is_server_error() {
                return Err(TradeNovaError::BrokerTransient(format!("broker returned {status}")));
            }
            if !status.is_success() {
                return Err(TradeNovaError::BrokerPermanent(format!("list_positions rejected with {status}")));
            }

            let body: serde_json::Value = resp
                .json()
                .await
                .map_err(|e| TradeNovaError::BrokerTransient(format!("malformed positions response: {e}")))?;

            let raw = body.as_array().cloned().unwrap_or_default();
            let mut positions = Vec::with_capacity(raw.len());
            for p in raw {
                positions.push(BrokerPosition {
                    symbol: p["symbol"].as_str().unwrap_or_default().to_string(),
                    quantity: p["quantity"].as_f64().unwrap_or(0.0),
                    avg_entry_price: p["avg_entry_price"].as_f64().unwrap_or(0.0),
                    market_value: p["market_value"].as_f64().unwrap_or(0.0),
                    unrealized_pnl: p["unrealized_pnl"].as_f64().unwrap_or(0.0),
                    is_option: p["is_option"].as_bool().unwrap_or(false),
                });
            }

            debug!(count = positions.len(), "positions retrieved");
            Ok(positions)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_order_requires_id_and_symbol() {
        let body = serde_json::json!({"order_id": "", "symbol": ""});
        let result = parse_order(&body, false);
        assert!(matches!(result, Err(TradeNovaError::OrderUncertain { .. })));
    }

    #[test]
    fn parse_order_extracts_fields() {
        let body = serde_json::json!({
            "order_id": "abc123",
            "symbol": "AAPL260821C00150000",
            "side": "BUY",
            "type": "MARKET",
            "status": "FILLED",
            "quantity": 5,
            "filled_quantity": 5,
            "avg_fill_price": 2.15,
        });
        let order = parse_order(&body, true).unwrap();
        assert_eq!(order.order_id, "abc123");
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.filled_quantity, 5);
        assert!(order.is_option);
    }

    #[test]
    fn debug_redacts_secrets() {
        let adapter = VendorBrokerAdapter::new("https://broker.example", "key123", "secret456");
        let dbg = format!("{adapter:?}");
        assert!(!dbg.contains("key123"));
        assert!(!dbg.contains("secret456"));
    }

    #[test]
    fn order_side_vendor_strings() {
        assert_eq!(OrderSide::Buy.as_vendor_str(), "BUY");
        assert_eq!(OrderSide::Sell.as_vendor_str(), "SELL");
    }
}
