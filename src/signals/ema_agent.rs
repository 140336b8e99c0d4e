// =============================================================================
// EMAAgent — always-active directional bias from price vs EMA9
// =============================================================================

use crate::features::Features;
use crate::market_data::Bar;
use crate::regime::Regime;
use crate::types::Direction;

use super::{Intent, SignalProducer};

const MIN_CONFIDENCE: f64 = 0.6;
const MAX_CONFIDENCE: f64 = 0.8;
/// Gap, as a fraction of price, that saturates confidence at `MAX_CONFIDENCE`.
const SATURATING_GAP_PCT: f64 = 0.01;

pub struct EmaAgent;

impl SignalProducer for EmaAgent {
    fn agent_id(&self) -> &'static str {
        "ema_agent"
    }

    fn evaluate(&self, symbol: &str, features: &Features, _regime: &Regime, _bars: &[Bar]) -> Option<Intent> {
        let ema9 = features.ema_fast?;
        if features.close == ema9 {
            return None;
        }

        let gap_pct = ((features.close - ema9) / ema9).abs();
        let scaled = (gap_pct / SATURATING_GAP_PCT).min(1.0);
        let confidence = MIN_CONFIDENCE + scaled * (MAX_CONFIDENCE - MIN_CONFIDENCE);

        let direction = if features.close > ema9 { Direction::Long } else { Direction::Short };

        Some(Intent::new(
            symbol,
            direction,
            confidence,
            self.agent_id(),
            format!("price {:.2} vs EMA9 {:.2}", features.close, ema9),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regime::{Bias, RegimeDirection, RegimeKind, Volatility};

    fn features(close: f64, ema9: f64) -> Features {
        Features {
            close,
            ema_fast: Some(ema9),
            ema_slow: Some(ema9),
            rsi_14: None,
            atr_14: None,
            atr_pct: None,
            adx_14: None,
            bollinger_bandwidth: None,
            roc_10: None,
            sma_20: None,
            vwap_20: None,
            slope_20: None,
            hurst: None,
            has_bullish_fvg: false,
            has_bearish_fvg: false,
            ..Default::default()
        }
    }

    fn regime() -> Regime {
        Regime {
            kind: RegimeKind::MeanReversion,
            direction: RegimeDirection::Sideways,
            volatility: Volatility::Medium,
            bias: Bias::Neutral,
            confidence: 0.5,
        }
    }

    #[test]
    fn price_above_ema_is_long() {
        let agent = EmaAgent;
        let intent = agent.evaluate("AAPL", &features(105.0, 100.0), &regime(), &[]).unwrap();
        assert_eq!(intent.direction, Direction::Long);
        assert!(intent.confidence >= 0.6 && intent.confidence <= 0.8);
    }

    #[test]
    fn price_below_ema_is_short() {
        let agent = EmaAgent;
        let intent = agent.evaluate("AAPL", &features(95.0, 100.0), &regime(), &[]).unwrap();
        assert_eq!(intent.direction, Direction::Short);
    }

    #[test]
    fn price_equal_ema_is_none() {
        let agent = EmaAgent;
        assert!(agent.evaluate("AAPL", &features(100.0, 100.0), &regime(), &[]).is_none());
    }
}
