// =============================================================================
// OptionsAgent — gates on IV rank and a representative contract's delta
// =============================================================================
//
// Fires in any regime with a non-NEUTRAL bias, provided the Options pipeline
// has already attached `iv_rank`/`representative_delta` to the Feature
// Vector for this symbol this cycle.

use crate::features::Features;
use crate::market_data::Bar;
use crate::regime::{Bias, Regime};
use crate::types::Direction;

use super::{Intent, SignalProducer};

const MIN_CONFIDENCE: f64 = 0.65;
const MAX_IV_RANK: f64 = 80.0;
const MIN_ABS_DELTA: f64 = 0.30;

pub struct OptionsAgent;

impl SignalProducer for OptionsAgent {
    fn agent_id(&self) -> &'static str {
        "options_agent"
    }

    fn evaluate(&self, symbol: &str, features: &Features, regime: &Regime, _bars: &[Bar]) -> Option<Intent> {
        if regime.bias == Bias::Neutral {
            return None;
        }

        let iv_rank = features.iv_rank?;
        let delta = features.representative_delta?;
        if iv_rank >= MAX_IV_RANK || delta.abs() < MIN_ABS_DELTA {
            return None;
        }

        let direction = match regime.bias {
            Bias::Bullish => Direction::Long,
            Bias::Bearish => Direction::Short,
            Bias::Neutral => unreachable!("checked above"),
        };

        let iv_headroom = ((MAX_IV_RANK - iv_rank) / MAX_IV_RANK).clamp(0.0, 1.0);
        let delta_strength = (delta.abs() / 1.0).clamp(0.0, 1.0);
        let confidence = MIN_CONFIDENCE + (iv_headroom * 0.5 + delta_strength * 0.5) * (1.0 - MIN_CONFIDENCE);

        Some(Intent::new(
            symbol,
            direction,
            confidence,
            self.agent_id(),
            format!("IV rank {iv_rank:.0} below cap, |delta| {:.2} above floor", delta.abs()),
        ))
    }
}
