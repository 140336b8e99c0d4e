// =============================================================================
// Option Universe Filter — liquidity screen applied to a raw chain
// =============================================================================
//
// No donor equivalent; the counting/rejection-reason pattern is grounded in
// the donor's `decision_envelope.rs` (tracking *why* something was excluded,
// not just whether it was). Truncation order (strike ascending, then
// expiration ascending) bounds downstream selector cost on wide chains.

use crate::options::contract::{LiquidityStamp, OptionContract};

pub const MAX_CHAIN_SIZE: usize = 2000;
pub const MIN_BID: f64 = 0.01;
pub const MAX_SPREAD_PCT: f64 = 0.20;
pub const MIN_BID_SIZE: u64 = 1;
pub const MAX_QUOTE_AGE_SECS: f64 = 5.0;

/// Tracks how many contracts were dropped by each predicate, for logging.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterCounters {
    pub input: usize,
    pub rejected_bid: usize,
    pub rejected_spread: usize,
    pub rejected_size: usize,
    pub rejected_age: usize,
    pub truncated: usize,
    pub output: usize,
}

pub fn liquidity_stamp(contract: &OptionContract) -> LiquidityStamp {
    LiquidityStamp {
        passes_bid: contract.bid > MIN_BID,
        passes_spread_pct: contract.spread_pct().map_or(false, |s| s <= MAX_SPREAD_PCT),
        passes_size: contract.bid_size >= MIN_BID_SIZE,
        passes_age: contract.quote_age < MAX_QUOTE_AGE_SECS,
    }
}

/// Apply the liquidity screen to a raw chain, then cap the surviving set to
/// `MAX_CHAIN_SIZE`, ordered strike ascending then expiration ascending.
pub fn filter_chain(chain: Vec<OptionContract>, counters: &mut FilterCounters) -> Vec<OptionContract> {
    counters.input = chain.len();

    let mut survivors: Vec<OptionContract> = Vec::with_capacity(chain.len());
    for contract in chain {
        let stamp = liquidity_stamp(&contract);
        if !stamp.passes_bid {
            counters.rejected_bid += 1;
            continue;
        }
        if !stamp.passes_spread_pct {
            counters.rejected_spread += 1;
            continue;
        }
        if !stamp.passes_size {
            counters.rejected_size += 1;
            continue;
        }
        if !stamp.passes_age {
            counters.rejected_age += 1;
            continue;
        }
        survivors.push(contract);
    }

    survivors.sort_by(|a, b| {
        a.strike
            .partial_cmp(&b.strike)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.expiration_date.cmp(&b.expiration_date))
    });

    if survivors.len() > MAX_CHAIN_SIZE {
        counters.truncated = survivors.len() - MAX_CHAIN_SIZE;
        survivors.truncate(MAX_CHAIN_SIZE);
    }

    counters.output = survivors.len();
    survivors
}
