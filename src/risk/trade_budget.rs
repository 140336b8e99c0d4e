// =============================================================================
// Daily Trade Budget — deny once the daily trade cap is reached
// =============================================================================
//
// `RiskManager` owns the actual `trades_today` counter and its market-open
// reset; this layer is a stateless predicate evaluated against a count
// passed in via `RiskContext`-adjacent state held by the caller. Since the
// Risk Stack's `RiskLayer` trait only sees a `RiskContext`, the counter is
// captured at construction time by whoever rebuilds the stack per cycle —
// mirroring the donor's `can_trade`'s final "Trade Limit" breaker check.

use super::{RiskContext, RiskDecision, RiskLayer};

pub struct DailyTradeBudget {
    limit: u32,
    trades_today: std::sync::atomic::AtomicU32,
}

impl DailyTradeBudget {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            trades_today: std::sync::atomic::AtomicU32::new(0),
        }
    }

    pub fn set_trades_today(&self, count: u32) {
        self.trades_today.store(count, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn trades_today(&self) -> u32 {
        self.trades_today.load(std::sync::atomic::Ordering::Relaxed)
    }
}

impl RiskLayer for DailyTradeBudget {
    fn name(&self) -> &'static str {
        "daily_trade_budget"
    }

    fn evaluate(&self, _ctx: &RiskContext) -> RiskDecision {
        let count = self.trades_today();
        if count >= self.limit {
            RiskDecision::block(format!("{count} trades today, limit {}", self.limit))
        } else {
            RiskDecision::pass()
        }
    }
}

impl RiskLayer for std::sync::Arc<DailyTradeBudget> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn evaluate(&self, ctx: &RiskContext) -> RiskDecision {
        (**self).evaluate(ctx)
    }
}
