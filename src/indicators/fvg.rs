// =============================================================================
// Fair Value Gap detection — 3-bar imbalance pattern
// =============================================================================
//
// A bullish FVG exists when bar[i-2].high < bar[i].low (the middle bar
// leaves an untraded gap below the third bar's low). A bearish FVG is the
// mirror: bar[i-2].low > bar[i].high.

use crate::market_data::Bar;
use crate::types::Direction;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FairValueGap {
    pub direction: Direction,
    pub gap_low: f64,
    pub gap_high: f64,
}

/// Scan the trailing `lookback` bars for fair value gaps, most recent first.
pub fn detect_fvgs(bars: &[Bar], lookback: usize) -> Vec<FairValueGap> {
    if bars.len() < 3 {
        return Vec::new();
    }
    let start = bars.len().saturating_sub(lookback).max(2);
    let mut gaps = Vec::new();
    for i in (start..bars.len()).rev() {
        if i < 2 {
            continue;
        }
        let left = &bars[i - 2];
        let right = &bars[i];
        if left.high < right.low {
            gaps.push(FairValueGap {
                direction: Direction::Long,
                gap_low: left.high,
                gap_high: right.low,
            });
        } else if left.low > right.high {
            gaps.push(FairValueGap {
                direction: Direction::Short,
                gap_low: right.high,
                gap_high: left.low,
            });
        }
    }
    gaps
}

/// Whether `price` currently sits inside any unfilled gap, which signals the
/// level is still acting as support/resistance.
pub fn price_in_gap(gaps: &[FairValueGap], price: f64) -> bool {
    gaps.iter().any(|g| price >= g.gap_low && price <= g.gap_high)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(high: f64, low: f64) -> Bar {
        Bar {
            timestamp: chrono::DateTime::from_timestamp(0, 0).unwrap(),
            open: (high + low) / 2.0,
            high,
            low,
            close: (high + low) / 2.0,
            volume: 100.0,
            vwap: (high + low) / 2.0,
        }
    }

    #[test]
    fn detects_bullish_gap() {
        let bars = vec![bar(101.0, 99.0), bar(103.0, 102.0), bar(106.0, 104.0)];
        let gaps = detect_fvgs(&bars, 10);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].direction, Direction::Long);
        assert!((gaps[0].gap_low - 101.0).abs() < 1e-9);
        assert!((gaps[0].gap_high - 104.0).abs() < 1e-9);
    }

    #[test]
    fn detects_bearish_gap() {
        let bars = vec![bar(106.0, 104.0), bar(103.0, 102.0), bar(101.0, 99.0)];
        let gaps = detect_fvgs(&bars, 10);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].direction, Direction::Short);
    }

    #[test]
    fn no_gap_when_overlapping() {
        let bars = vec![bar(103.0, 99.0), bar(104.0, 100.0), bar(105.0, 101.0)];
        let gaps = detect_fvgs(&bars, 10);
        assert!(gaps.is_empty());
    }

    #[test]
    fn price_in_gap_checks_range() {
        let gaps = vec![FairValueGap {
            direction: Direction::Long,
            gap_low: 100.0,
            gap_high: 102.0,
        }];
        assert!(price_in_gap(&gaps, 101.0));
        assert!(!price_in_gap(&gaps, 105.0));
    }
}
