// =============================================================================
// Liquidity Gatekeeper — redundant liquidity recheck on the selected contract
// =============================================================================
//
// The Option Selector already screened the chain through the Option Universe
// Filter's liquidity predicate (§4.8); this layer re-runs the exact same
// predicate against the contract's freshest quote in case it aged between
// selection and risk evaluation.

use crate::options::universe_filter::liquidity_stamp;

use super::{RiskContext, RiskDecision, RiskLayer};

pub struct LiquidityGatekeeper;

impl RiskLayer for LiquidityGatekeeper {
    fn name(&self) -> &'static str {
        "liquidity_gatekeeper"
    }

    fn evaluate(&self, ctx: &RiskContext) -> RiskDecision {
        let stamp = liquidity_stamp(ctx.candidate_contract);
        if stamp.tradable() {
            RiskDecision::pass()
        } else {
            RiskDecision::block(format!(
                "quote aged or illiquid: bid={} spread={} size={} age={}",
                stamp.passes_bid, stamp.passes_spread_pct, stamp.passes_size, stamp.passes_age
            ))
        }
    }
}
