// =============================================================================
// Option Contract, Liquidity Stamp, Greeks
// =============================================================================
//
// No donor equivalent exists (a spot-crypto bot never sees options chains);
// field names are grounded in the wider example corpus's options-indicator
// code (bid/ask/open_interest/implied_volatility/greeks naming). The Greeks
// here are an approximation, not a full Black-Scholes engine — see
// DESIGN.md.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::types::OptionType;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Greeks {
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionContract {
    pub option_symbol: String,
    pub underlying: String,
    pub strike: f64,
    pub expiration_date: NaiveDate,
    pub option_type: OptionType,
    pub bid: f64,
    pub ask: f64,
    pub last: f64,
    pub bid_size: u64,
    pub volume: u64,
    pub open_interest: u64,
    pub implied_volatility: f64,
    pub greeks: Greeks,
    /// Age of the last quote, in seconds.
    pub quote_age: f64,
}

impl OptionContract {
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    pub fn spread_pct(&self) -> Option<f64> {
        let mid = self.mid();
        if mid <= 0.0 {
            return None;
        }
        Some((self.ask - self.bid) / mid)
    }

    pub fn dte(&self, today: NaiveDate) -> i64 {
        (self.expiration_date - today).num_days()
    }

    pub fn is_well_formed(&self) -> bool {
        self.expiration_date >= Utc::now().date_naive()
            && self.bid <= self.ask
            && self.implied_volatility >= 0.0
    }
}

/// `{passes_bid, passes_spread_pct, passes_size, passes_age}`. Tradable iff
/// all four are true.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LiquidityStamp {
    pub passes_bid: bool,
    pub passes_spread_pct: bool,
    pub passes_size: bool,
    pub passes_age: bool,
}

impl LiquidityStamp {
    pub fn tradable(&self) -> bool {
        self.passes_bid && self.passes_spread_pct && self.passes_size && self.passes_age
    }
}

/// A fresh top-of-book quote for a single option symbol, returned by
/// `DataAdapter::get_quote`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub option_symbol: String,
    pub bid: f64,
    pub ask: f64,
    pub last: f64,
    pub bid_size: u64,
    pub quote_age: f64,
}
