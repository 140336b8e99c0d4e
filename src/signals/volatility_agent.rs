// =============================================================================
// VolatilityAgent — direction of an ATR-spike-confirmed move, EXPANSION only
// =============================================================================

use crate::features::Features;
use crate::market_data::Bar;
use crate::regime::{Regime, RegimeKind};
use crate::types::Direction;

use super::{Intent, SignalProducer};

const MIN_CONFIDENCE: f64 = 0.7;

pub struct VolatilityAgent;

impl SignalProducer for VolatilityAgent {
    fn agent_id(&self) -> &'static str {
        "volatility_agent"
    }

    fn evaluate(&self, symbol: &str, features: &Features, regime: &Regime, bars: &[Bar]) -> Option<Intent> {
        if regime.kind != RegimeKind::Expansion {
            return None;
        }

        let recent = bars.last()?;
        let prior = bars.get(bars.len().checked_sub(2)?)?;
        let move_pct = (recent.close - prior.close) / prior.close;
        if move_pct == 0.0 {
            return None;
        }

        let direction = if move_pct > 0.0 { Direction::Long } else { Direction::Short };
        let atr_pct = features.atr_pct.unwrap_or(0.0) / 100.0;
        let strength = (move_pct.abs() / atr_pct.max(1e-9)).min(1.0);
        let confidence = MIN_CONFIDENCE + strength * (1.0 - MIN_CONFIDENCE);

        Some(Intent::new(
            symbol,
            direction,
            confidence,
            self.agent_id(),
            format!("ATR-spike-confirmed move of {:.2}% in expansion regime", move_pct * 100.0),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regime::{Bias, RegimeDirection, Volatility};
    use chrono::DateTime;

    fn bar(close: f64) -> Bar {
        Bar {
            timestamp: DateTime::from_timestamp(0, 0).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 100.0,
            vwap: close,
        }
    }

    fn features(atr_pct: f64) -> Features {
        Features {
            close: 0.0,
            ema_fast: None,
            ema_slow: None,
            rsi_14: None,
            atr_14: None,
            atr_pct: Some(atr_pct * 100.0),
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

    fn expansion_regime() -> Regime {
        Regime {
            kind: RegimeKind::Expansion,
            direction: RegimeDirection::Up,
            volatility: Volatility::High,
            bias: Bias::Bullish,
            confidence: 0.8,
        }
    }

    #[test]
    fn upward_spike_is_long() {
        let agent = VolatilityAgent;
        let bars = vec![bar(100.0), bar(103.0)];
        let intent = agent.evaluate("AAPL", &features(0.03), &expansion_regime(), &bars).unwrap();
        assert_eq!(intent.direction, Direction::Long);
        assert!(intent.confidence >= 0.7);
    }

    #[test]
    fn out_of_regime_is_none() {
        let agent = VolatilityAgent;
        let bars = vec![bar(100.0), bar(103.0)];
        let regime = Regime {
            kind: RegimeKind::Trend,
            ..expansion_regime()
        };
        assert!(agent.evaluate("AAPL", &features(0.03), &regime, &bars).is_none());
    }

    #[test]
    fn insufficient_bars_is_none() {
        let agent = VolatilityAgent;
        let bars = vec![bar(100.0)];
        assert!(agent.evaluate("AAPL", &features(0.03), &expansion_regime(), &bars).is_none());
    }
}
