// =============================================================================
// Portfolio Greeks Caps — projected post-trade book must stay within limits
// =============================================================================

use crate::options::contract::Greeks;

use super::{RiskContext, RiskDecision, RiskLayer, RiskLevel};

pub const MAX_DELTA: f64 = 500.0;
pub const MAX_GAMMA: f64 = 25.0;
pub const MAX_THETA_PER_DAY: f64 = -300.0;
pub const MAX_VEGA: f64 = 300.0;

const SOFT_VIOLATION_RATIO: f64 = 1.0;
const HARD_VIOLATION_RATIO: f64 = 1.5;

fn project(current: Greeks, candidate: Greeks, quantity: f64) -> Greeks {
    Greeks {
        delta: current.delta + candidate.delta * quantity,
        gamma: current.gamma + candidate.gamma * quantity,
        theta: current.theta + candidate.theta * quantity,
        vega: current.vega + candidate.vega * quantity,
    }
}

fn worst_violation_ratio(projected: &Greeks) -> f64 {
    let delta_ratio = projected.delta.abs() / MAX_DELTA;
    let gamma_ratio = projected.gamma.abs() / MAX_GAMMA;
    let theta_ratio = if projected.theta < MAX_THETA_PER_DAY {
        projected.theta.abs() / MAX_THETA_PER_DAY.abs()
    } else {
        0.0
    };
    let vega_ratio = projected.vega.abs() / MAX_VEGA;

    [delta_ratio, gamma_ratio, theta_ratio, vega_ratio].into_iter().fold(0.0, f64::max)
}

pub struct PortfolioGreeksCaps {
    max_delta: f64,
    max_gamma: f64,
    max_theta_per_day: f64,
    max_vega: f64,
}

impl Default for PortfolioGreeksCaps {
    fn default() -> Self {
        Self {
            max_delta: MAX_DELTA,
            max_gamma: MAX_GAMMA,
            max_theta_per_day: MAX_THETA_PER_DAY,
            max_vega: MAX_VEGA,
        }
    }
}

impl RiskLayer for PortfolioGreeksCaps {
    fn name(&self) -> &'static str {
        "portfolio_greeks_caps"
    }

    fn evaluate(&self, ctx: &RiskContext) -> RiskDecision {
        let projected = project(ctx.current_greeks, ctx.candidate_greeks, ctx.candidate_quantity);
        let ratio = worst_violation_ratio(&projected);

        if ratio <= SOFT_VIOLATION_RATIO {
            return RiskDecision {
                projected_greeks: Some(projected),
                current_greeks: Some(ctx.current_greeks),
                ..RiskDecision::pass()
            };
        }

        if ratio <= HARD_VIOLATION_RATIO {
            return RiskDecision {
                level: RiskLevel::Danger,
                projected_greeks: Some(projected),
                current_greeks: Some(ctx.current_greeks),
                ..RiskDecision::block(format!(
                    "projected Greeks {ratio:.2}x over cap (delta {:.0}/{}, gamma {:.1}/{}, theta {:.0}/{}, vega {:.0}/{})",
                    projected.delta, self.max_delta, projected.gamma, self.max_gamma, projected.theta, self.max_theta_per_day, projected.vega, self.max_vega
                ))
            };
        }

        RiskDecision {
            level: RiskLevel::Blocked,
            projected_greeks: Some(projected),
            current_greeks: Some(ctx.current_greeks),
            forced_reductions: Some(vec![ctx.underlying.to_string()]),
            ..RiskDecision::block(format!("projected Greeks {ratio:.2}x over cap, hard violation, forced reduction required"))
        }
    }
}
