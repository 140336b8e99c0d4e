// =============================================================================
// MeanReversionAgent — RSI extremes + VWAP deviation + unfilled FVG
// =============================================================================

use crate::features::Features;
use crate::market_data::Bar;
use crate::regime::{Regime, RegimeKind};
use crate::types::Direction;

use super::{Intent, SignalProducer};

const MIN_CONFIDENCE: f64 = 0.6;
const MAX_CONFIDENCE: f64 = 1.0;
const RSI_OVERSOLD: f64 = 30.0;
const RSI_OVERBOUGHT: f64 = 70.0;

pub struct MeanReversionAgent;

impl SignalProducer for MeanReversionAgent {
    fn agent_id(&self) -> &'static str {
        "mean_reversion_agent"
    }

    fn evaluate(&self, symbol: &str, features: &Features, regime: &Regime, _bars: &[Bar]) -> Option<Intent> {
        if regime.kind != RegimeKind::MeanReversion {
            return None;
        }

        let rsi = features.rsi_14?;
        let vwap = features.vwap_20?;
        let deviation_pct = ((features.close - vwap) / vwap).abs();

        let direction = if rsi <= RSI_OVERSOLD && features.close < vwap && features.has_bullish_fvg {
            Direction::Long
        } else if rsi >= RSI_OVERBOUGHT && features.close > vwap && features.has_bearish_fvg {
            Direction::Short
        } else {
            return None;
        };

        let rsi_extremity = match direction {
            Direction::Long => (RSI_OVERSOLD - rsi).max(0.0) / RSI_OVERSOLD,
            Direction::Short => (rsi - RSI_OVERBOUGHT).max(0.0) / (100.0 - RSI_OVERBOUGHT),
            Direction::Flat => 0.0,
        };
        let confidence = MIN_CONFIDENCE + (rsi_extremity.min(1.0) * 0.5 + deviation_pct.min(1.0) * 0.5) * (MAX_CONFIDENCE - MIN_CONFIDENCE);

        Some(Intent::new(
            symbol,
            direction,
            confidence,
            self.agent_id(),
            format!("RSI {rsi:.1} extreme, {deviation_pct:.2%} off VWAP, unfilled FVG"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regime::{Bias, RegimeDirection, Volatility};

    fn features(close: f64, rsi: f64, vwap: f64, bullish_fvg: bool, bearish_fvg: bool) -> Features {
        Features {
            close,
            ema_fast: None,
            ema_slow: None,
            rsi_14: Some(rsi),
            atr_14: None,
            atr_pct: None,
            adx_14: None,
            bollinger_bandwidth: None,
            roc_10: None,
            sma_20: None,
            vwap_20: Some(vwap),
            slope_20: None,
            hurst: None,
            has_bullish_fvg: bullish_fvg,
            has_bearish_fvg: bearish_fvg,
            ..Default::default()
        }
    }

    fn mr_regime() -> Regime {
        Regime {
            kind: RegimeKind::MeanReversion,
            direction: RegimeDirection::Sideways,
            volatility: Volatility::Medium,
            bias: Bias::Neutral,
            confidence: 0.5,
        }
    }

    #[test]
    fn oversold_with_fvg_is_long() {
        let agent = MeanReversionAgent;
        let intent = agent
            .evaluate("AAPL", &features(95.0, 20.0, 100.0, true, false), &mr_regime(), &[])
            .unwrap();
        assert_eq!(intent.direction, Direction::Long);
    }

    #[test]
    fn oversold_without_fvg_is_none() {
        let agent = MeanReversionAgent;
        assert!(agent
            .evaluate("AAPL", &features(95.0, 20.0, 100.0, false, false), &mr_regime(), &[])
            .is_none());
    }

    #[test]
    fn out_of_regime_is_none() {
        let agent = MeanReversionAgent;
        let regime = Regime {
            kind: RegimeKind::Trend,
            ..mr_regime()
        };
        assert!(agent
            .evaluate("AAPL", &features(95.0, 20.0, 100.0, true, false), &regime, &[])
            .is_none());
    }
}
