// =============================================================================
// Feature Engine — derives a Feature Vector from a bar window
// =============================================================================
//
// Grounded in the donor's `regime/detector.rs` (which also assembles ADX,
// Bollinger bandwidth, and Hurst from raw bars before classifying a regime)
// and the indicator modules it calls into. The Hurst exponent is computed on
// log-returns here, not raw closes — the donor's `calculate_hurst_exponent`
// itself is unchanged; only the series fed to it differs.

use serde::{Deserialize, Serialize};

use crate::error::TradeNovaError;
use crate::indicators::{adx, atr, bollinger, ema, fvg, roc, rsi, slope, sma, vwap};
use crate::market_data::Bar;
use crate::regime::hurst::calculate_hurst_exponent;

/// Minimum number of bars the Feature Engine requires to produce a result.
pub const MIN_BARS: usize = 30;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Features {
    pub close: f64,
    pub ema_fast: Option<f64>,
    pub ema_slow: Option<f64>,
    pub rsi_14: Option<f64>,
    pub atr_14: Option<f64>,
    pub atr_pct: Option<f64>,
    pub adx_14: Option<f64>,
    pub bollinger_bandwidth: Option<f64>,
    pub roc_10: Option<f64>,
    pub sma_20: Option<f64>,
    pub vwap_20: Option<f64>,
    pub slope_20: Option<f64>,
    /// Goodness-of-fit (R^2) of the same OLS window that produced `slope_20`.
    pub r_squared_20: Option<f64>,
    /// Sample standard deviation of the trailing 20 log returns.
    pub realized_vol_20: Option<f64>,
    pub hurst: Option<f64>,
    pub has_bullish_fvg: bool,
    pub has_bearish_fvg: bool,
    /// IV rank of a representative (near-ATM) contract, filled in by the
    /// Options pipeline after the Feature Engine runs — `None` until then.
    pub iv_rank: Option<f64>,
    /// Delta of that same representative contract.
    pub representative_delta: Option<f64>,
}

/// Log-return series, filtering non-positive-to-positive transitions that
/// would make `ln` undefined or non-finite.
fn log_returns(closes: &[f64]) -> Vec<f64> {
    closes
        .windows(2)
        .filter_map(|w| {
            let (prev, cur) = (w[0], w[1]);
            if prev <= 0.0 || cur <= 0.0 {
                return None;
            }
            let r = (cur / prev).ln();
            if r.is_finite() {
                Some(r)
            } else {
                None
            }
        })
        .collect()
}

fn hurst_on_returns(closes: &[f64]) -> Option<f64> {
    let returns = log_returns(closes);
    calculate_hurst_exponent(&returns)
}

/// Sample standard deviation of the trailing `period` log returns.
fn realized_volatility(closes: &[f64], period: usize) -> Option<f64> {
    let returns = log_returns(closes);
    if returns.len() < period || period < 2 {
        return None;
    }
    let window = &returns[returns.len() - period..];
    let n = window.len() as f64;
    let mean = window.iter().sum::<f64>() / n;
    let variance = window.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let vol = variance.sqrt();
    if vol.is_finite() {
        Some(vol)
    } else {
        None
    }
}

/// Every populated field must be finite; a `NaN`/`inf` anywhere means the
/// bar window fed a degenerate indicator (e.g. a zero-volume stretch) and
/// the caller should be told there isn't enough usable data rather than
/// silently carrying a poisoned value into the Agent Set.
fn all_finite(f: &Features) -> bool {
    f.close.is_finite()
        && [
            f.ema_fast,
            f.ema_slow,
            f.rsi_14,
            f.atr_14,
            f.atr_pct,
            f.adx_14,
            f.bollinger_bandwidth,
            f.roc_10,
            f.sma_20,
            f.vwap_20,
            f.slope_20,
            f.r_squared_20,
            f.realized_vol_20,
            f.hurst,
            f.iv_rank,
            f.representative_delta,
        ]
        .into_iter()
        .all(|v| v.map_or(true, |x| x.is_finite()))
}

pub fn compute_features(bars: &[Bar]) -> Result<Features, TradeNovaError> {
    if bars.len() < MIN_BARS {
        return Err(TradeNovaError::InsufficientFeatures {
            needed: MIN_BARS,
            have: bars.len(),
        });
    }

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let last_close = *closes.last().expect("checked non-empty above");

    let gaps = fvg::detect_fvgs(bars, 20);
    let has_bullish_fvg = gaps.iter().any(|g| g.direction == crate::types::Direction::Long);
    let has_bearish_fvg = gaps.iter().any(|g| g.direction == crate::types::Direction::Short);

    let slope_fit = slope::calculate_slope_fit(&closes, 20);

    let features = Features {
        close: last_close,
        ema_fast: ema::calculate_ema(&closes, 9).last().copied(),
        ema_slow: ema::calculate_ema(&closes, 21).last().copied(),
        rsi_14: rsi::current_rsi(&closes, 14).map(|(value, _)| value),
        atr_14: atr::calculate_atr(bars, 14),
        atr_pct: atr::calculate_atr_pct(bars, 14),
        adx_14: adx::calculate_adx(bars, 14),
        bollinger_bandwidth: bollinger::calculate_bollinger(&closes, 20, 2.0).map(|r| r.width),
        roc_10: roc::current_roc(&closes, 10),
        sma_20: sma::calculate_sma(&closes, 20),
        vwap_20: vwap::calculate_vwap(bars, 20),
        slope_20: slope_fit.map(|f| f.slope),
        r_squared_20: slope_fit.map(|f| f.r_squared),
        realized_vol_20: realized_volatility(&closes, 20),
        hurst: hurst_on_returns(&closes),
        iv_rank: None,
        representative_delta: None,
        has_bullish_fvg,
        has_bearish_fvg,
    };

    if !all_finite(&features) {
        return Err(TradeNovaError::InsufficientFeatures {
            needed: MIN_BARS,
            have: bars.len(),
        });
    }

    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn bar(i: usize, close: f64) -> Bar {
        Bar {
            timestamp: DateTime::from_timestamp(i as i64 * 300, 0).unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1000.0,
            vwap: close,
        }
    }

    #[test]
    fn insufficient_bars_errors() {
        let bars: Vec<Bar> = (0..10).map(|i| bar(i, 100.0 + i as f64)).collect();
        assert!(compute_features(&bars).is_err());
    }

    #[test]
    fn sufficient_bars_produce_features() {
        let bars: Vec<Bar> = (0..40).map(|i| bar(i, 100.0 + (i as f64 * 0.3).sin() * 5.0)).collect();
        let features = compute_features(&bars).unwrap();
        assert!(features.ema_fast.is_some());
        assert!(features.sma_20.is_some());
        assert!(features.vwap_20.is_some());
        assert!(features.r_squared_20.is_some());
        assert!(features.realized_vol_20.is_some());
    }

    #[test]
    fn flat_price_series_still_yields_finite_features() {
        let bars: Vec<Bar> = (0..40).map(|i| bar(i, 100.0)).collect();
        let features = compute_features(&bars).unwrap();
        assert!(features.realized_vol_20.unwrap_or(0.0).is_finite());
    }

    #[test]
    fn all_finite_rejects_nan_fields() {
        let mut features = Features { close: 100.0, ..Default::default() };
        assert!(all_finite(&features));
        features.slope_20 = Some(f64::NAN);
        assert!(!all_finite(&features));
    }

    #[test]
    fn log_returns_skip_non_positive() {
        let closes = vec![100.0, -5.0, 110.0];
        let returns = log_returns(&closes);
        assert!(returns.is_empty());
    }

    #[test]
    fn log_returns_basic() {
        let closes = vec![100.0, 110.0, 99.0];
        let returns = log_returns(&closes);
        assert_eq!(returns.len(), 2);
    }
}
