// =============================================================================
// Volume-Weighted Average Price, over a trailing bar window
// =============================================================================

use crate::market_data::Bar;

pub fn calculate_vwap(bars: &[Bar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period {
        return None;
    }
    let window = &bars[bars.len() - period..];
    let (pv_sum, vol_sum) = window.iter().fold((0.0, 0.0), |(pv, vol), b| {
        let typical = (b.high + b.low + b.close) / 3.0;
        (pv + typical * b.volume, vol + b.volume)
    });
    if vol_sum <= 0.0 {
        return None;
    }
    let vwap = pv_sum / vol_sum;
    if vwap.is_finite() {
        Some(vwap)
    } else {
        None
    }
}
