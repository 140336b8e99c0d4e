// =============================================================================
// Regime Classifier — maps a Feature Vector to a market regime
// =============================================================================
//
// Grounded in the donor's `classify()` priority chain (ADX/Bollinger-width/
// Hurst feeding a deterministic cascade) and `RegimeDetector`'s Arc+RwLock
// last-state-plus-timestamp wrapper. The donor's 5-way
// {Trending,Ranging,Volatile,Squeeze,Dead} taxonomy and its Shannon-entropy
// input are replaced with the 4-way {Trend,MeanReversion,Expansion,
// Compression} taxonomy driven by ADX/slope/ATR-to-price.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::features::Features;

pub const ADX_TREND_THRESHOLD: f64 = 25.0;
pub const SLOPE_TREND_THRESHOLD: f64 = 0.0005;
pub const EXPANSION_ATR_PCT: f64 = 0.02;
pub const COMPRESSION_ATR_PCT: f64 = 0.005;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegimeKind {
    Trend,
    MeanReversion,
    Expansion,
    Compression,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegimeDirection {
    Up,
    Down,
    Sideways,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Volatility {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bias {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Regime {
    pub kind: RegimeKind,
    pub direction: RegimeDirection,
    pub volatility: Volatility,
    pub bias: Bias,
    pub confidence: f64,
}

fn classify_volatility(atr_pct: f64) -> Volatility {
    if atr_pct > EXPANSION_ATR_PCT {
        Volatility::High
    } else if atr_pct < COMPRESSION_ATR_PCT {
        Volatility::Low
    } else {
        Volatility::Medium
    }
}

fn classify_direction(slope: f64) -> RegimeDirection {
    if slope > SLOPE_TREND_THRESHOLD {
        RegimeDirection::Up
    } else if slope < -SLOPE_TREND_THRESHOLD {
        RegimeDirection::Down
    } else {
        RegimeDirection::Sideways
    }
}

fn classify_bias(slope: f64, ema_fast: f64, ema_slow: f64) -> Bias {
    if slope > 0.0 && ema_fast > ema_slow {
        Bias::Bullish
    } else if slope < 0.0 && ema_fast < ema_slow {
        Bias::Bearish
    } else {
        Bias::Neutral
    }
}

/// Deterministic mapping from a Feature Vector to a `Regime`, per the
/// priority chain: TREND, then EXPANSION, then COMPRESSION, else
/// MEAN_REVERSION.
pub fn classify(features: &Features) -> Regime {
    let adx = features.adx_14.unwrap_or(0.0);
    let slope = features.slope_20.unwrap_or(0.0);
    let atr_pct = features.atr_pct.unwrap_or(0.0) / 100.0;
    let ema_fast = features.ema_fast.unwrap_or(features.close);
    let ema_slow = features.ema_slow.unwrap_or(features.close);

    let direction = classify_direction(slope);
    let volatility = classify_volatility(atr_pct);
    let bias = classify_bias(slope, ema_fast, ema_slow);

    if adx >= ADX_TREND_THRESHOLD && slope.abs() > SLOPE_TREND_THRESHOLD {
        let confidence = ((adx / 50.0).min(1.0) * 0.6 + (slope.abs() / (SLOPE_TREND_THRESHOLD * 4.0)).min(1.0) * 0.4).min(1.0);
        return Regime {
            kind: RegimeKind::Trend,
            direction,
            volatility,
            bias,
            confidence,
        };
    }

    if atr_pct > EXPANSION_ATR_PCT {
        let confidence = (atr_pct / (EXPANSION_ATR_PCT * 2.5)).min(1.0);
        return Regime {
            kind: RegimeKind::Expansion,
            direction,
            volatility,
            bias,
            confidence,
        };
    }

    if atr_pct < COMPRESSION_ATR_PCT {
        let confidence = ((COMPRESSION_ATR_PCT - atr_pct) / COMPRESSION_ATR_PCT).clamp(0.0, 1.0);
        return Regime {
            kind: RegimeKind::Compression,
            direction,
            volatility,
            bias,
            confidence,
        };
    }

    Regime {
        kind: RegimeKind::MeanReversion,
        direction,
        volatility,
        bias,
        confidence: 0.5,
    }
}

struct RegimeState {
    regime: Regime,
    since: Instant,
}

/// Thread-safe holder of the most recently classified regime per symbol,
/// so agents gated on regime can read a stable snapshot mid-cycle.
pub struct RegimeDetector {
    state: RwLock<Option<RegimeState>>,
}

impl RegimeDetector {
    pub fn update(&self, features: &Features) -> Regime {
        let regime = classify(features);
        let changed = self
            .state
            .read()
            .as_ref()
            .map_or(true, |s| s.regime.kind != regime.kind);
        if changed {
            *self.state.write() = Some(RegimeState {
                regime,
                since: Instant::now(),
            });
        }
        regime
    }

    pub fn current(&self) -> Option<Regime> {
        self.state.read().as_ref().map(|s| s.regime)
    }

    pub fn time_in_regime(&self) -> Option<std::time::Duration> {
        self.state.read().as_ref().map(|s| s.since.elapsed())
    }
}

impl Default for RegimeDetector {
    fn default() -> Self {
        Self {
            state: RwLock::new(None),
        }
    }
}

pub fn new_shared() -> Arc<RegimeDetector> {
    Arc::new(RegimeDetector::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(adx: f64, slope: f64, atr_pct: f64, ema_fast: f64, ema_slow: f64) -> Features {
        Features {
            close: 100.0,
            ema_fast: Some(ema_fast),
            ema_slow: Some(ema_slow),
            rsi_14: Some(50.0),
            atr_14: Some(1.0),
            atr_pct: Some(atr_pct * 100.0),
            adx_14: Some(adx),
            bollinger_bandwidth: Some(2.0),
            roc_10: Some(0.0),
            sma_20: Some(100.0),
            vwap_20: Some(100.0),
            slope_20: Some(slope),
            hurst: Some(0.5),
            has_bullish_fvg: false,
            has_bearish_fvg: false,
            ..Default::default()
        }
    }

    #[test]
    fn strong_adx_and_slope_is_trend() {
        let f = features(30.0, 0.002, 0.01, 102.0, 100.0);
        let regime = classify(&f);
        assert_eq!(regime.kind, RegimeKind::Trend);
        assert_eq!(regime.direction, RegimeDirection::Up);
        assert_eq!(regime.bias, Bias::Bullish);
    }

    #[test]
    fn high_atr_pct_is_expansion() {
        let f = features(15.0, 0.0001, 0.03, 100.0, 100.0);
        let regime = classify(&f);
        assert_eq!(regime.kind, RegimeKind::Expansion);
        assert_eq!(regime.volatility, Volatility::High);
    }

    #[test]
    fn low_atr_pct_is_compression() {
        let f = features(10.0, 0.0001, 0.002, 100.0, 100.0);
        let regime = classify(&f);
        assert_eq!(regime.kind, RegimeKind::Compression);
        assert_eq!(regime.volatility, Volatility::Low);
    }

    #[test]
    fn otherwise_mean_reversion() {
        let f = features(10.0, 0.0001, 0.01, 100.0, 100.0);
        let regime = classify(&f);
        assert_eq!(regime.kind, RegimeKind::MeanReversion);
    }

    #[test]
    fn detector_tracks_current_regime() {
        let detector = RegimeDetector::default();
        assert!(detector.current().is_none());
        let f = features(30.0, 0.002, 0.01, 102.0, 100.0);
        detector.update(&f);
        assert_eq!(detector.current().unwrap().kind, RegimeKind::Trend);
    }

    #[test]
    fn confidence_is_bounded() {
        let f = features(60.0, 0.01, 0.01, 105.0, 100.0);
        let regime = classify(&f);
        assert!(regime.confidence >= 0.0 && regime.confidence <= 1.0);
    }
}
