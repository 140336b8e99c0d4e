// =============================================================================
// Linear-regression slope of a trailing close window, normalized by price
// =============================================================================

/// Slope (normalized by mean price) and goodness-of-fit of the same OLS
/// regression against bar index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlopeFit {
    pub slope: f64,
    pub r_squared: f64,
}

/// OLS slope of `closes` against bar index, as a fraction of the mean price
/// so it is comparable across symbols at different price scales, plus the
/// R^2 of that same fit.
pub fn calculate_slope_fit(closes: &[f64], period: usize) -> Option<SlopeFit> {
    if period < 2 || closes.len() < period {
        return None;
    }
    let window = &closes[closes.len() - period..];
    let n = period as f64;

    let xs: Vec<f64> = (0..period).map(|i| i as f64).collect();
    let x_mean = xs.iter().sum::<f64>() / n;
    let y_mean = window.iter().sum::<f64>() / n;

    let mut num = 0.0;
    let mut den = 0.0;
    let mut ss_tot = 0.0;
    for (x, y) in xs.iter().zip(window.iter()) {
        num += (x - x_mean) * (y - y_mean);
        den += (x - x_mean).powi(2);
        ss_tot += (y - y_mean).powi(2);
    }

    if den == 0.0 || y_mean == 0.0 {
        return None;
    }

    let slope = num / den;
    let normalized = slope / y_mean;
    let r_squared = if ss_tot == 0.0 { 1.0 } else { (num * num) / (den * ss_tot) };
    if normalized.is_finite() && r_squared.is_finite() {
        Some(SlopeFit { slope: normalized, r_squared })
    } else {
        None
    }
}

/// OLS slope alone, for callers that don't need the fit quality.
pub fn calculate_slope(closes: &[f64], period: usize) -> Option<f64> {
    calculate_slope_fit(closes, period).map(|fit| fit.slope)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slope_rising_series_positive() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let slope = calculate_slope(&closes, 20).unwrap();
        assert!(slope > 0.0);
    }

    #[test]
    fn slope_falling_series_negative() {
        let closes: Vec<f64> = (0..20).map(|i| 200.0 - i as f64).collect();
        let slope = calculate_slope(&closes, 20).unwrap();
        assert!(slope < 0.0);
    }

    #[test]
    fn slope_flat_series_near_zero() {
        let closes = vec![100.0; 20];
        let slope = calculate_slope(&closes, 20).unwrap();
        assert!(slope.abs() < 1e-9);
    }

    #[test]
    fn slope_insufficient_data() {
        let closes = vec![100.0];
        assert!(calculate_slope(&closes, 5).is_none());
    }

    #[test]
    fn perfectly_linear_series_has_r_squared_near_one() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64 * 2.0).collect();
        let fit = calculate_slope_fit(&closes, 20).unwrap();
        assert!((fit.r_squared - 1.0).abs() < 1e-9);
    }

    #[test]
    fn noisy_series_has_lower_r_squared() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + (i as f64 * 0.3).sin() * 5.0).collect();
        let fit = calculate_slope_fit(&closes, 20).unwrap();
        assert!(fit.r_squared < 1.0);
        assert!(fit.r_squared >= 0.0);
    }
}
