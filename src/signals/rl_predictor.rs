// =============================================================================
// RL Predictor — optional learned-model integration contract
// =============================================================================
//
// Model training is out of scope; this module only defines the contract a
// trained model plugs into and a deterministic heuristic stand-in so the
// Ensemble has something to blend against in its absence. The raw action is
// smoothed per symbol with `α = 0.3` EMA to avoid cycle-to-cycle oscillation,
// grounded in the donor's EMA-smoothing pattern used elsewhere
// (`indicators/ema.rs`).

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::features::Features;
use crate::types::Direction;

const SMOOTHING_ALPHA: f64 = 0.3;
const SHORT_THRESHOLD: f64 = -0.2;
const LONG_THRESHOLD: f64 = 0.2;

#[derive(Debug, Clone, Copy)]
pub struct RlOutput {
    pub direction: Direction,
    pub confidence: f64,
}

/// A raw model action in `[-1, 1]`. Trained-model implementations return
/// this from inference; the heuristic stand-in computes it from features.
pub trait RawActionModel: Send + Sync {
    fn raw_action(&self, features: &Features) -> Option<f64>;
}

/// Deterministic, untrained stand-in: blends RSI deviation from midline,
/// rate-of-change, and trend slope into a bounded action scalar.
pub struct HeuristicActionModel;

impl RawActionModel for HeuristicActionModel {
    fn raw_action(&self, features: &Features) -> Option<f64> {
        let rsi_component = (features.rsi_14? - 50.0) / 50.0;
        let roc_component = (features.roc_10? / 5.0).clamp(-1.0, 1.0);
        let slope_component = (features.slope_20? / 0.002).clamp(-1.0, 1.0);

        let action = 0.4 * rsi_component + 0.3 * roc_component + 0.3 * slope_component;
        Some(action.clamp(-1.0, 1.0))
    }
}

/// Wraps a [`RawActionModel`] with per-symbol EMA smoothing and the
/// action-to-intent interpretation rule.
pub struct RlPredictor {
    model: Box<dyn RawActionModel>,
    smoothed: RwLock<HashMap<String, f64>>,
}

impl RlPredictor {
    pub fn new(model: Box<dyn RawActionModel>) -> Self {
        Self {
            model,
            smoothed: RwLock::new(HashMap::new()),
        }
    }

    pub fn heuristic() -> Self {
        Self::new(Box::new(HeuristicActionModel))
    }

    pub fn predict(&self, symbol: &str, features: &Features) -> Option<RlOutput> {
        let raw = self.model.raw_action(features)?;

        let smoothed_action = {
            let mut states = self.smoothed.write();
            let prev = states.get(symbol).copied().unwrap_or(raw);
            let next = SMOOTHING_ALPHA * raw + (1.0 - SMOOTHING_ALPHA) * prev;
            states.insert(symbol.to_string(), next);
            next
        };

        let direction = if smoothed_action < SHORT_THRESHOLD {
            Direction::Short
        } else if smoothed_action > LONG_THRESHOLD {
            Direction::Long
        } else {
            Direction::Flat
        };

        Some(RlOutput {
            direction,
            confidence: smoothed_action.abs(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(rsi: f64, roc: f64, slope: f64) -> Features {
        Features {
            rsi_14: Some(rsi),
            roc_10: Some(roc),
            slope_20: Some(slope),
            ..Default::default()
        }
    }

    #[test]
    fn strong_bullish_inputs_predict_long() {
        let predictor = RlPredictor::heuristic();
        let output = predictor.predict("AAPL", &features(90.0, 4.0, 0.002)).unwrap();
        assert_eq!(output.direction, Direction::Long);
    }

    #[test]
    fn strong_bearish_inputs_predict_short() {
        let predictor = RlPredictor::heuristic();
        let output = predictor.predict("AAPL", &features(10.0, -4.0, -0.002)).unwrap();
        assert_eq!(output.direction, Direction::Short);
    }

    #[test]
    fn neutral_inputs_predict_flat() {
        let predictor = RlPredictor::heuristic();
        let output = predictor.predict("AAPL", &features(50.0, 0.0, 0.0)).unwrap();
        assert_eq!(output.direction, Direction::Flat);
    }

    #[test]
    fn smoothing_dampens_a_single_spike() {
        let predictor = RlPredictor::heuristic();
        let first = predictor.predict("AAPL", &features(50.0, 0.0, 0.0)).unwrap();
        let second = predictor.predict("AAPL", &features(95.0, 5.0, 0.002)).unwrap();
        assert!(second.confidence < 1.0);
        assert!(second.confidence > first.confidence);
    }

    #[test]
    fn missing_inputs_returns_none() {
        let predictor = RlPredictor::heuristic();
        assert!(predictor.predict("AAPL", &Features::default()).is_none());
    }
}
