// =============================================================================
// UVaR — ultra-short historical-simulation Value-at-Risk
// =============================================================================
//
// Historical simulation over the trailing 60-90 days of portfolio daily
// returns, 1-day horizon, 99th-percentile loss. The *incremental* UVaR with
// the candidate contract added is approximated by scaling the historical
// loss distribution by the candidate's notional share of current equity —
// a simplification of a full revaluation-based incremental VaR, documented
// in DESIGN.md as an approximation pending a proper options-aware pricer.

use super::{RiskContext, RiskDecision, RiskLayer, RiskLevel};

pub const MAX_UVAR_PCT: f64 = 0.05;
const WARN_FRACTION: f64 = 0.8;
const CONFIDENCE: f64 = 0.99;

/// 99th-percentile loss magnitude (as a positive fraction) from a trailing
/// daily-return series. Returns 0.0 when there isn't enough history.
pub fn historical_var_pct(daily_returns: &[f64], confidence: f64) -> f64 {
    if daily_returns.len() < 2 {
        return 0.0;
    }
    let mut sorted: Vec<f64> = daily_returns.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let idx = (((1.0 - confidence) * sorted.len() as f64).floor() as usize).min(sorted.len() - 1);
    sorted[idx].min(0.0).abs()
}

pub struct UvarLayer {
    max_uvar_pct: f64,
}

impl Default for UvarLayer {
    fn default() -> Self {
        Self { max_uvar_pct: MAX_UVAR_PCT }
    }
}

impl RiskLayer for UvarLayer {
    fn name(&self) -> &'static str {
        "uvar"
    }

    fn evaluate(&self, ctx: &RiskContext) -> RiskDecision {
        let base_var_pct = historical_var_pct(ctx.portfolio_daily_returns, CONFIDENCE);

        let candidate_notional = ctx.candidate_contract.mid() * ctx.candidate_quantity * 100.0;
        let exposure_share = if ctx.portfolio_equity > 0.0 {
            candidate_notional / ctx.portfolio_equity
        } else {
            0.0
        };
        let incremental_var_pct = base_var_pct * (1.0 + exposure_share);

        if incremental_var_pct > self.max_uvar_pct {
            RiskDecision::block(format!(
                "incremental UVaR {:.2}% exceeds cap {:.2}%",
                incremental_var_pct * 100.0,
                self.max_uvar_pct * 100.0
            ))
        } else if incremental_var_pct > self.max_uvar_pct * WARN_FRACTION {
            RiskDecision::pass_with(
                RiskLevel::Warning,
                format!("incremental UVaR {:.2}% near cap {:.2}%", incremental_var_pct * 100.0, self.max_uvar_pct * 100.0),
            )
        } else {
            RiskDecision::pass()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::OptionContract;
    use crate::types::{Direction, OptionType};
    use chrono::{Duration, Utc};

    fn contract() -> OptionContract {
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
            implied_volatility: 0.35,
            greeks: Default::default(),
            quote_age: 1.0,
        }
    }

    fn ctx<'a>(contract: &'a OptionContract, returns: &'a [f64], equity: f64) -> RiskContext<'a> {
        RiskContext {
            symbol: "AAPL260821C00150000",
            underlying: "AAPL",
            direction: Direction::Long,
            candidate_contract: contract,
            current_greeks: Default::default(),
            candidate_greeks: Default::default(),
            candidate_quantity: 1.0,
            portfolio_daily_returns: returns,
            portfolio_equity: equity,
            today: Utc::now().date_naive(),
            iv_history: &[],
        }
    }

    #[test]
    fn no_history_yields_zero_var_and_passes() {
        let layer = UvarLayer::default();
        let c = contract();
        let decision = layer.evaluate(&ctx(&c, &[], 100_000.0));
        assert!(decision.allowed);
    }

    #[test]
    fn severe_losses_block() {
        let layer = UvarLayer::default();
        let c = contract();
        let returns: Vec<f64> = (0..60).map(|i| if i == 0 { -0.20 } else { 0.001 }).collect();
        let decision = layer.evaluate(&ctx(&c, &returns, 100_000.0));
        assert!(!decision.allowed);
    }

    #[test]
    fn historical_var_picks_tail_loss() {
        let returns: Vec<f64> = (0..100).map(|i| if i == 0 { -0.10 } else { 0.0 }).collect();
        let var = historical_var_pct(&returns, 0.99);
        assert!(var > 0.0);
    }
}
