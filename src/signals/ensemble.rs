// =============================================================================
// Ensemble — two-stage fusion of Agent Set intents with the RL Predictor
// =============================================================================
//
// Stage 1 (arbitration): each agent intent is scored by
// `weight_agent * regime_confidence * (1 + volatility_bonus) * intent_confidence`.
// The highest-scoring intent wins; if the runner-up scores within 10% of the
// winner, the two are blended rather than discarding the runner-up outright.
//
// Stage 2 (RL blend): the arbitration winner is blended with the RL
// Predictor's output using fixed weights. Trend/Volatility/Mean-Reversion
// carry the weights given against RL's fixed 0.40 (0.25 + 0.15 + 0.20 + 0.40
// = 1.00); any other agent (EmaAgent, OptionsAgent) falls back to the
// `DEFAULT_AGENT_WEIGHT` below — an Open Question resolution, since only
// three agent weights are specified against RL's share.

use crate::regime::Regime;
use crate::types::Direction;

use super::rl_predictor::RlOutput;
use super::Intent;

const VOLATILITY_BONUS_HIGH: f64 = 0.1;
const RUNNER_UP_BLEND_THRESHOLD: f64 = 0.10;
const AGREEMENT_BONUS: f64 = 1.10;
const DISAGREEMENT_PENALTY: f64 = 0.80;
const RL_WEIGHT: f64 = 0.40;
const DEFAULT_AGENT_WEIGHT: f64 = 0.20;

fn agent_weight(agent_id: &str) -> f64 {
    match agent_id {
        "trend_agent" => 0.25,
        "volatility_agent" => 0.15,
        "mean_reversion_agent" => 0.20,
        _ => DEFAULT_AGENT_WEIGHT,
    }
}

fn volatility_bonus(regime: &Regime) -> f64 {
    if regime.volatility == crate::regime::Volatility::High {
        VOLATILITY_BONUS_HIGH
    } else {
        0.0
    }
}

fn score(intent: &Intent, regime: &Regime) -> f64 {
    agent_weight(intent.agent_id) * regime.confidence * (1.0 + volatility_bonus(regime)) * intent.confidence
}

#[derive(Debug, Clone)]
pub struct EnsembleConfig {
    pub runner_up_blend_threshold: f64,
    pub rl_weight: f64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            runner_up_blend_threshold: RUNNER_UP_BLEND_THRESHOLD,
            rl_weight: RL_WEIGHT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FusedSignal {
    pub symbol: String,
    pub direction: Direction,
    pub confidence: f64,
    pub contributing_agents: Vec<&'static str>,
    pub reasoning: String,
}

struct ArbitrationResult {
    direction: Direction,
    confidence: f64,
    winner_agent_id: &'static str,
    contributing_agents: Vec<&'static str>,
}

fn arbitrate(intents: &[Intent], regime: &Regime, config: &EnsembleConfig) -> Option<ArbitrationResult> {
    if intents.is_empty() {
        return None;
    }

    let mut scored: Vec<(&Intent, f64)> = intents.iter().map(|i| (i, score(i, regime))).collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let (top, top_score) = scored[0];
    let runner_up = scored.get(1);

    match runner_up {
        Some((second, second_score)) if top_score > 0.0 && (top_score - second_score) / top_score <= config.runner_up_blend_threshold => {
            if second.direction == top.direction {
                let total = top_score + second_score;
                let confidence = if total > 0.0 {
                    (top.confidence * top_score + second.confidence * second_score) / total
                } else {
                    top.confidence
                };
                Some(ArbitrationResult {
                    direction: top.direction,
                    confidence,
                    winner_agent_id: top.agent_id,
                    contributing_agents: vec![top.agent_id, second.agent_id],
                })
            } else {
                Some(ArbitrationResult {
                    direction: top.direction,
                    confidence: top.confidence * DISAGREEMENT_PENALTY,
                    winner_agent_id: top.agent_id,
                    contributing_agents: vec![top.agent_id, second.agent_id],
                })
            }
        }
        _ => Some(ArbitrationResult {
            direction: top.direction,
            confidence: top.confidence,
            winner_agent_id: top.agent_id,
            contributing_agents: vec![top.agent_id],
        }),
    }
}

/// Fuses the Agent Set's intents for one symbol with the RL Predictor's
/// output for the same cycle. Returns `None` if no agent produced an intent.
pub fn fuse(symbol: &str, intents: &[Intent], regime: &Regime, rl: Option<RlOutput>, config: &EnsembleConfig) -> Option<FusedSignal> {
    let arbitration = arbitrate(intents, regime, config)?;

    let rl_weight = config.rl_weight;
    let agent_weight = agent_weight(arbitration.winner_agent_id);
    let total_weight = agent_weight + rl_weight;

    let (direction, confidence, reasoning) = match rl {
        Some(rl_output) if rl_output.direction == arbitration.direction => {
            let blended = (agent_weight * arbitration.confidence + rl_weight * rl_output.confidence) / total_weight;
            (
                arbitration.direction,
                (blended * AGREEMENT_BONUS).clamp(0.0, 1.0),
                format!("agent/RL agree on {:?}", arbitration.direction),
            )
        }
        Some(rl_output) => {
            let agent_component = agent_weight * arbitration.confidence;
            let rl_component = rl_weight * rl_output.confidence;
            let (direction, blended) = if agent_component >= rl_component {
                (arbitration.direction, agent_component / total_weight)
            } else {
                (rl_output.direction, rl_component / total_weight)
            };
            (
                direction,
                (blended * DISAGREEMENT_PENALTY).clamp(0.0, 1.0),
                "agent/RL disagree, deferring to the stronger-weighted side".to_string(),
            )
        }
        None => (
            arbitration.direction,
            arbitration.confidence.clamp(0.0, 1.0),
            "no RL output this cycle, using agent arbitration only".to_string(),
        ),
    };

    Some(FusedSignal {
        symbol: symbol.to_string(),
        direction,
        confidence,
        contributing_agents: arbitration.contributing_agents,
        reasoning,
    })
}
