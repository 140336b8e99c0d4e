// =============================================================================
// TrendAgent — EMA9/EMA21 cross confirmed by ADX and VWAP, TREND regime only
// =============================================================================

use crate::features::Features;
use crate::market_data::Bar;
use crate::regime::{Regime, RegimeKind};
use crate::types::Direction;

use super::{Intent, SignalProducer};

const MIN_CONFIDENCE: f64 = 0.6;
const MAX_CONFIDENCE: f64 = 1.0;
const ADX_CONFIRM_THRESHOLD: f64 = 25.0;

pub struct TrendAgent;

impl SignalProducer for TrendAgent {
    fn agent_id(&self) -> &'static str {
        "trend_agent"
    }

    fn evaluate(&self, symbol: &str, features: &Features, regime: &Regime, _bars: &[Bar]) -> Option<Intent> {
        if regime.kind != RegimeKind::Trend {
            return None;
        }

        let ema9 = features.ema_fast?;
        let ema21 = features.ema_slow?;
        let adx = features.adx_14?;
        let vwap = features.vwap_20?;

        if adx <= ADX_CONFIRM_THRESHOLD {
            return None;
        }

        let direction = if ema9 > ema21 && features.close > vwap {
            Direction::Long
        } else if ema9 < ema21 && features.close < vwap {
            Direction::Short
        } else {
            return None;
        };

        let adx_strength = ((adx - ADX_CONFIRM_THRESHOLD) / ADX_CONFIRM_THRESHOLD).min(1.0);
        let confidence = MIN_CONFIDENCE + adx_strength * (MAX_CONFIDENCE - MIN_CONFIDENCE);

        Some(Intent::new(
            symbol,
            direction,
            confidence,
            self.agent_id(),
            format!("EMA9/EMA21 cross confirmed by ADX {adx:.1} and VWAP"),
        ))
    }
}
