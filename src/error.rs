// =============================================================================
// Error taxonomy for the TradeNova control plane
// =============================================================================
//
// Per-symbol variants are caught at the pipeline boundary and logged, never
// propagated to abort a cycle. `BrokerPermanent` and `OrderUncertain`
// propagate to the Scheduler, which may enter a degraded state.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TradeNovaError {
    #[error("data unavailable for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    #[error("insufficient features: need {needed} bars, have {have}")]
    InsufficientFeatures { needed: usize, have: usize },

    #[error("no liquid contract for {symbol}: {reason}")]
    NoLiquidContract { symbol: String, reason: String },

    #[error("risk blocked at layer {layer}: {reason}")]
    RiskBlocked { layer: String, reason: String },

    #[error("broker transient error: {0}")]
    BrokerTransient(String),

    #[error("broker permanent error: {0}")]
    BrokerPermanent(String),

    #[error("order outcome uncertain for {symbol}, order {order_id}")]
    OrderUncertain { symbol: String, order_id: String },

    #[error("scheduler overrun, cycle skipped")]
    SchedulerOverrun,
}

impl TradeNovaError {
    /// Whether this error is local to a single symbol's pipeline run and
    /// must not abort the rest of the cycle.
    pub fn is_per_symbol(&self) -> bool {
        matches!(
            self,
            Self::DataUnavailable { .. }
                | Self::InsufficientFeatures { .. }
                | Self::NoLiquidContract { .. }
                | Self::RiskBlocked { .. }
        )
    }

    /// Whether this error should push the scheduler into a degraded,
    /// entries-forbidden state.
    pub fn is_degrading(&self) -> bool {
        matches!(self, Self::BrokerPermanent(_) | Self::OrderUncertain { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_symbol_errors_classified() {
        let e = TradeNovaError::DataUnavailable {
            symbol: "AAPL".into(),
            reason: "timeout".into(),
        };
        assert!(e.is_per_symbol());
        assert!(!e.is_degrading());
    }

    #[test]
    fn degrading_errors_classified() {
        let e = TradeNovaError::OrderUncertain {
            symbol: "AAPL".into(),
            order_id: "123".into(),
        };
        assert!(e.is_degrading());
        assert!(!e.is_per_symbol());
    }

    #[test]
    fn scheduler_overrun_is_neither() {
        let e = TradeNovaError::SchedulerOverrun;
        assert!(!e.is_per_symbol());
        assert!(!e.is_degrading());
    }
}
