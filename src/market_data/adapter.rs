// =============================================================================
// Data Adapter — historical bars + options chains, vendor-agnostic
// =============================================================================
//
// Grounded in the donor's `BinanceClient` (HMAC-signed REST client over
// `reqwest`, typed response parsing, manual redacted `Debug`), generalised
// to a vendor-agnostic trait. `O:` prefix stripping happens once, here,
// before any contract leaves the module.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use sha2::Sha256;
use tracing::{debug, warn};

use crate::error::TradeNovaError;
use crate::market_data::Bar;
use crate::options::contract::{OptionContract, Quote};
use crate::types::Timeframe;

type HmacSha256 = Hmac<Sha256>;

#[async_trait]
pub trait DataAdapter: Send + Sync {
    async fn get_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, TradeNovaError>;

    async fn get_chain(
        &self,
        symbol: &str,
        expiration: Option<NaiveDate>,
    ) -> Result<Vec<OptionContract>, TradeNovaError>;

    async fn get_quote(&self, option_symbol: &str) -> Result<Quote, TradeNovaError>;

    /// Whether the vendor's own market-clock flag reports the session open,
    /// when the vendor exposes one.
    async fn market_open(&self) -> Option<bool> {
        None
    }
}

/// Minimum number of bars a window must contain before the Feature Engine
/// will accept it.
pub const MIN_BARS: usize = 30;

/// HMAC-signed REST client against a single market-data vendor.
pub struct VendorDataAdapter {
    http: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
}

impl VendorDataAdapter {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    fn sign(&self, query: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn signed_query(&self, params: &[(&str, String)]) -> String {
        let base: String = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        let signature = self.sign(&base);
        format!("{base}&signature={signature}")
    }

    /// Strip any vendor-specific `O:` options prefix before the contract
    /// leaves this module.
    fn normalize_symbol(raw: &str) -> String {
        raw.strip_prefix("O:").unwrap_or(raw).to_string()
    }
}

impl std::fmt::Debug for VendorDataAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VendorDataAdapter")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl DataAdapter for VendorDataAdapter {
    async fn get_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, TradeNovaError> {
        let query = self.signed_query(&[
            ("symbol", symbol.to_string()),
            ("interval", timeframe.as_vendor_str().to_string()),
            ("startTime", start.timestamp_millis().to_string()),
            ("endTime", end.timestamp_millis().to_string()),
            ("apiKey", self.api_key.clone()),
        ]);
        let url = format!("{}/v2/bars?{query}", self.base_url);

        let resp = self
            .http
            .get(&url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| TradeNovaError::BrokerTransient(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(TradeNovaError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: format!("vendor returned status {}", resp.status()),
            });
        }

        let payload: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| TradeNovaError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: format!("malformed bars response: {e}"),
            })?;

        let raw_bars = payload["bars"].as_array().ok_or_else(|| TradeNovaError::DataUnavailable {
            symbol: symbol.to_string(),
            reason: "response missing 'bars' array".to_string(),
        })?;

        let mut bars = Vec::with_capacity(raw_bars.len());
        for b in raw_bars {
            let ts_ms = b["t"].as_i64().unwrap_or(0);
            bars.push(Bar {
                timestamp: DateTime::from_timestamp_millis(ts_ms).unwrap_or_else(Utc::now),
                open: b["o"].as_f64().unwrap_or(0.0),
                high: b["h"].as_f64().unwrap_or(0.0),
                low: b["l"].as_f64().unwrap_or(0.0),
                close: b["c"].as_f64().unwrap_or(0.0),
                volume: b["v"].as_f64().unwrap_or(0.0),
                vwap: b["vw"].as_f64().unwrap_or(0.0),
            });
        }

        if bars.len() < MIN_BARS {
            return Err(TradeNovaError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: format!("only {} bars returned, need {}", bars.len(), MIN_BARS),
            });
        }

        debug!(symbol, bars = bars.len(), "fetched bars from vendor");
        Ok(bars)
    }

    async fn get_chain(
        &self,
        symbol: &str,
        expiration: Option<NaiveDate>,
    ) -> Result<Vec<OptionContract>, TradeNovaError> {
        let mut params = vec![("symbol", symbol.to_string()), ("apiKey", self.api_key.clone())];
        if let Some(exp) = expiration {
            params.push(("expiration", exp.format("%Y-%m-%d").to_string()));
        }
        let query = self.signed_query(&params);
        let url = format!("{}/v2/options/chain?{query}", self.base_url);

        let resp = self
            .http
            .get(&url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| TradeNovaError::BrokerTransient(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(TradeNovaError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: format!("vendor returned status {}", resp.status()),
            });
        }

        let payload: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| TradeNovaError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: format!("malformed chain response: {e}"),
            })?;

        let raw = payload["contracts"].as_array().ok_or_else(|| TradeNovaError::DataUnavailable {
            symbol: symbol.to_string(),
            reason: "response missing 'contracts' array".to_string(),
        })?;

        if raw.is_empty() {
            return Err(TradeNovaError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: "empty options chain".to_string(),
            });
        }

        let mut contracts = Vec::with_capacity(raw.len());
        for c in raw {
            let option_symbol = Self::normalize_symbol(c["ticker"].as_str().unwrap_or(""));
            let option_type = match c["option_type"].as_str().unwrap_or("call") {
                "put" | "P" => crate::types::OptionType::Put,
                _ => crate::types::OptionType::Call,
            };
            let expiration_date = c["expiration"]
                .as_str()
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
                .unwrap_or_else(|| Utc::now().date_naive());

            contracts.push(OptionContract {
                option_symbol,
                underlying: symbol.to_string(),
                strike: c["strike"].as_f64().unwrap_or(0.0),
                expiration_date,
                option_type,
                bid: c["bid"].as_f64().unwrap_or(0.0),
                ask: c["ask"].as_f64().unwrap_or(0.0),
                last: c["last"].as_f64().unwrap_or(0.0),
                bid_size: c["bid_size"].as_u64().unwrap_or(0),
                volume: c["volume"].as_u64().unwrap_or(0),
                open_interest: c["open_interest"].as_u64().unwrap_or(0),
                implied_volatility: c["implied_volatility"].as_f64().unwrap_or(0.0),
                greeks: crate::options::contract::Greeks {
                    delta: c["greeks"]["delta"].as_f64().unwrap_or(0.0),
                    gamma: c["greeks"]["gamma"].as_f64().unwrap_or(0.0),
                    theta: c["greeks"]["theta"].as_f64().unwrap_or(0.0),
                    vega: c["greeks"]["vega"].as_f64().unwrap_or(0.0),
                },
                quote_age: c["quote_age"].as_f64().unwrap_or(0.0),
            });
        }

        Ok(contracts)
    }

    async fn get_quote(&self, option_symbol: &str) -> Result<Quote, TradeNovaError> {
        let normalized = Self::normalize_symbol(option_symbol);
        let query = self.signed_query(&[("symbol", normalized.clone()), ("apiKey", self.api_key.clone())]);
        let url = format!("{}/v2/options/quote?{query}", self.base_url);

        let resp = self
            .http
            .get(&url)
            .timeout(Duration::from_secs(3))
            .send()
            .await
            .map_err(|e| TradeNovaError::BrokerTransient(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(TradeNovaError::DataUnavailable {
                symbol: normalized,
                reason: format!("vendor returned status {}", resp.status()),
            });
        }

        let payload: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| TradeNovaError::DataUnavailable {
                symbol: normalized.clone(),
                reason: format!("malformed quote response: {e}"),
            })?;

        Ok(Quote {
            option_symbol: normalized,
            bid: payload["bid"].as_f64().unwrap_or(0.0),
            ask: payload["ask"].as_f64().unwrap_or(0.0),
            last: payload["last"].as_f64().unwrap_or(0.0),
            bid_size: payload["bid_size"].as_u64().unwrap_or(0),
            quote_age: payload["quote_age"].as_f64().unwrap_or(0.0),
        })
    }

    async fn market_open(&self) -> Option<bool> {
        let url = format!("{}/v2/clock", self.base_url);
        let resp = self.http.get(&url).timeout(Duration::from_secs(3)).send().await.ok()?;
        let payload: serde_json::Value = resp.json().await.ok()?;
        payload["is_open"].as_bool()
    }
}

/// Tries the primary adapter, falling back to the secondary on empty result
/// or error within a short budget, per the Data Adapter component design.
pub struct FallbackDataAdapter {
    primary: Box<dyn DataAdapter>,
    secondary: Box<dyn DataAdapter>,
}

impl FallbackDataAdapter {
    pub fn new(primary: Box<dyn DataAdapter>, secondary: Box<dyn DataAdapter>) -> Self {
        Self { primary, secondary }
    }
}

#[async_trait]
impl DataAdapter for FallbackDataAdapter {
    async fn get_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, TradeNovaError> {
        match self.primary.get_bars(symbol, timeframe, start, end).await {
            Ok(bars) if !bars.is_empty() => Ok(bars),
            Ok(_) | Err(_) => {
                warn!(symbol, "primary data source empty/failed, trying fallback");
                self.secondary.get_bars(symbol, timeframe, start, end).await
            }
        }
    }

    async fn get_chain(
        &self,
        symbol: &str,
        expiration: Option<NaiveDate>,
    ) -> Result<Vec<OptionContract>, TradeNovaError> {
        match self.primary.get_chain(symbol, expiration).await {
            Ok(chain) if !chain.is_empty() => Ok(chain),
            Ok(_) | Err(_) => {
                warn!(symbol, "primary chain source empty/failed, trying fallback");
                self.secondary.get_chain(symbol, expiration).await
            }
        }
    }

    async fn get_quote(&self, option_symbol: &str) -> Result<Quote, TradeNovaError> {
        match self.primary.get_quote(option_symbol).await {
            Ok(q) => Ok(q),
            Err(_) => self.secondary.get_quote(option_symbol).await,
        }
    }

    async fn market_open(&self) -> Option<bool> {
        match self.primary.market_open().await {
            Some(v) => Some(v),
            None => self.secondary.market_open().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_prefix() {
        assert_eq!(VendorDataAdapter::normalize_symbol("O:AAPL260821C00150000"), "AAPL260821C00150000");
        assert_eq!(VendorDataAdapter::normalize_symbol("AAPL260821C00150000"), "AAPL260821C00150000");
    }

    #[test]
    fn debug_redacts_secrets() {
        let adapter = VendorDataAdapter::new("https://vendor.example", "key123", "secret456");
        let dbg = format!("{adapter:?}");
        assert!(!dbg.contains("key123"));
        assert!(!dbg.contains("secret456"));
    }
}
