// =============================================================================
// Decision Envelope — auditable record of every trade/no-trade decision
// =============================================================================
//
// Grounded in the donor's `decision_envelope.rs` (UUID id, per-layer
// "PASS"/"FAIL" verdict strings, `allow()`/`blocked()` constructors,
// RFC3339 timestamp). The donor's crypto-scalper layer names
// (data_quality/insurance/execution_quality) are replaced with the
// ensemble + Risk Stack verdicts this control loop actually produces, and
// the risk verdict now carries the Risk Stack's own `RiskLevel` and
// projected-Greeks snapshot instead of a bare string.

use serde::Serialize;

use crate::options::Greeks;
use crate::risk::RiskLevel;
use crate::types::Direction;

/// Complete auditable record of a single symbol's decision for one cycle.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionEnvelope {
    pub id: String,
    pub symbol: String,
    pub direction: Direction,
    pub agent_id: String,

    pub ensemble_verdict: String,
    pub risk_level: RiskLevel,
    pub risk_verdict: String,

    pub final_decision: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocking_layer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projected_greeks: Option<Greeks>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_greeks: Option<Greeks>,

    pub created_at: String,
}

impl DecisionEnvelope {
    pub fn allow(symbol: impl Into<String>, direction: Direction, agent_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.into(),
            direction,
            agent_id: agent_id.into(),
            ensemble_verdict: "PASS".to_string(),
            risk_level: RiskLevel::Safe,
            risk_verdict: "PASS".to_string(),
            final_decision: "ALLOW".to_string(),
            blocking_layer: None,
            reason: None,
            projected_greeks: None,
            current_greeks: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn blocked(
        symbol: impl Into<String>,
        direction: Direction,
        agent_id: impl Into<String>,
        blocking_layer: impl Into<String>,
        reason: impl Into<String>,
        risk_level: RiskLevel,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.into(),
            direction,
            agent_id: agent_id.into(),
            ensemble_verdict: "PASS".to_string(),
            risk_level,
            risk_verdict: "FAIL".to_string(),
            final_decision: "BLOCK".to_string(),
            blocking_layer: Some(blocking_layer.into()),
            reason: Some(reason.into()),
            projected_greeks: None,
            current_greeks: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Attach the Risk Stack's projected/current Greeks snapshot, when present.
    pub fn with_greeks(mut self, projected: Option<Greeks>, current: Option<Greeks>) -> Self {
        self.projected_greeks = projected;
        self.current_greeks = current;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_sets_final_decision() {
        let env = DecisionEnvelope::allow("AAPL", Direction::Long, "trend_agent");
        assert_eq!(env.final_decision, "ALLOW");
        assert_eq!(env.risk_level, RiskLevel::Safe);
        assert!(env.blocking_layer.is_none());
    }

    #[test]
    fn blocked_sets_layer_and_reason() {
        let env = DecisionEnvelope::blocked("AAPL", Direction::Short, "rl_predictor", "uvar", "exceeds cap", RiskLevel::Blocked);
        assert_eq!(env.final_decision, "BLOCK");
        assert_eq!(env.blocking_layer.as_deref(), Some("uvar"));
        assert_eq!(env.risk_level, RiskLevel::Blocked);
    }
}
