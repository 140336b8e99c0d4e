// =============================================================================
// Signal Pipeline — Agent Set, RL Predictor, Ensemble
// =============================================================================
//
// No direct donor equivalent (the donor scores order-flow microstructure via
// `WeightedScorer`/`VPINCalculator`); the trait-per-producer shape and the
// "None when out of regime" convention are grounded in the donor's
// `signal_decay.rs` decay-then-score pipeline structure. Agents evaluate a
// Feature Vector + Regime + bar window and emit an optional directional
// `Intent`; the Ensemble fuses them.

pub mod ema_agent;
pub mod ensemble;
pub mod mean_reversion_agent;
pub mod options_agent;
pub mod rl_predictor;
pub mod trend_agent;
pub mod volatility_agent;

use serde::{Deserialize, Serialize};

use crate::features::Features;
use crate::market_data::Bar;
use crate::regime::Regime;
use crate::types::Direction;

pub use ensemble::{fuse, EnsembleConfig};
pub use rl_predictor::RlPredictor;

/// A directional intent produced by one agent for one symbol this cycle.
/// `FLAT` carries no confidence weight regardless of the stored value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    pub symbol: String,
    pub direction: Direction,
    pub confidence: f64,
    pub agent_id: &'static str,
    pub reasoning: String,
}

impl Intent {
    pub fn new(
        symbol: impl Into<String>,
        direction: Direction,
        confidence: f64,
        agent_id: &'static str,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            direction,
            confidence: confidence.clamp(0.0, 1.0),
            agent_id,
            reasoning: reasoning.into(),
        }
    }
}

/// Shared contract for every rule-based agent in the Agent Set.
pub trait SignalProducer: Send + Sync {
    fn agent_id(&self) -> &'static str;

    /// Evaluate this cycle's features/regime/bars for `symbol`. Agents gated
    /// to a specific regime return `None` outside it.
    fn evaluate(&self, symbol: &str, features: &Features, regime: &Regime, bars: &[Bar]) -> Option<Intent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_clamps_confidence() {
        let intent = Intent::new("AAPL", Direction::Long, 1.5, "test", "over-confident");
        assert_eq!(intent.confidence, 1.0);
    }
}
