// =============================================================================
// Gap Risk Monitor — classifies scheduled-event risk from a calendar
// =============================================================================

use std::sync::Arc;

use super::{RiskContext, RiskDecision, RiskLayer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapRiskLevel {
    None,
    Low,
    Medium,
    High,
    Critical,
}

/// Source of "days until next known event" for an underlying (earnings,
/// FOMC, etc). No donor equivalent — a spot-crypto bot has no earnings
/// calendar — so this is authored fresh; `NoEventCalendar` is the default
/// no-op implementation until a real calendar feed is wired in.
pub trait EventCalendar: Send + Sync {
    fn days_to_next_event(&self, underlying: &str) -> Option<i64>;
}

pub struct NoEventCalendar;

impl EventCalendar for NoEventCalendar {
    fn days_to_next_event(&self, _underlying: &str) -> Option<i64> {
        None
    }
}

fn classify(days: Option<i64>) -> GapRiskLevel {
    match days {
        Some(d) if d <= 0 => GapRiskLevel::Critical,
        Some(1) => GapRiskLevel::High,
        Some(2..=3) => GapRiskLevel::Medium,
        Some(4..=7) => GapRiskLevel::Low,
        _ => GapRiskLevel::None,
    }
}

pub struct GapRiskMonitor {
    calendar: Arc<dyn EventCalendar>,
}

impl GapRiskMonitor {
    pub fn new(calendar: Arc<dyn EventCalendar>) -> Self {
        Self { calendar }
    }
}

impl RiskLayer for GapRiskMonitor {
    fn name(&self) -> &'static str {
        "gap_risk_monitor"
    }

    fn evaluate(&self, ctx: &RiskContext) -> RiskDecision {
        let days = self.calendar.days_to_next_event(ctx.underlying);
        match classify(days) {
            GapRiskLevel::Critical => RiskDecision {
                force_exit: true,
                ..RiskDecision::block("event today, force-exit and block new trades")
            },
            GapRiskLevel::High => RiskDecision::block("event tomorrow"),
            GapRiskLevel::Medium => RiskDecision::pass_sized(0.5, "event in 2-3 days, sizing down"),
            GapRiskLevel::Low => RiskDecision::pass_sized(0.8, "event in 4-7 days, sizing down"),
            GapRiskLevel::None => RiskDecision::pass(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedCalendar(Option<i64>);
    impl EventCalendar for FixedCalendar {
        fn days_to_next_event(&self, _underlying: &str) -> Option<i64> {
            self.0
        }
    }

    fn contract() -> crate::options::OptionContract {
        crate::options::OptionContract {
            option_symbol: "AAPL260821C00150000".into(),
            underlying: "AAPL".into(),
            strike: 150.0,
            expiration_date: chrono::Utc::now().date_naive() + chrono::Duration::days(30),
            option_type: crate::types::OptionType::Call,
            bid: 2.0,
            ask: 2.2,
            last: 2.1,
            bid_size: 25,
            volume: 500,
            open_interest: 1000,
            implied_volatility: 0.35,
            greeks: Default::default(),
            quote_age: 1.0,
        }
    }

    fn ctx<'a>(contract: &'a crate::options::OptionContract) -> RiskContext<'a> {
        RiskContext {
            symbol: "AAPL260821C00150000",
            underlying: "AAPL",
            direction: crate::types::Direction::Long,
            candidate_contract: contract,
            current_greeks: Default::default(),
            candidate_greeks: Default::default(),
            candidate_quantity: 1.0,
            portfolio_daily_returns: &[],
            portfolio_equity: 100_000.0,
            today: chrono::Utc::now().date_naive(),
            iv_history: &[],
        }
    }

    #[test]
    fn event_today_blocks_and_force_exits() {
        let monitor = GapRiskMonitor::new(Arc::new(FixedCalendar(Some(0))));
        let c = contract();
        let decision = monitor.evaluate(&ctx(&c));
        assert!(!decision.allowed);
        assert!(decision.force_exit);
    }

    #[test]
    fn event_in_five_days_sizes_down() {
        let monitor = GapRiskMonitor::new(Arc::new(FixedCalendar(Some(5))));
        let c = contract();
        let decision = monitor.evaluate(&ctx(&c));
        assert!(decision.allowed);
        assert_eq!(decision.size_multiplier, 0.8);
    }

    #[test]
    fn no_known_event_passes_through() {
        let monitor = GapRiskMonitor::new(Arc::new(NoEventCalendar));
        let c = contract();
        let decision = monitor.evaluate(&ctx(&c));
        assert!(decision.allowed);
        assert_eq!(decision.size_multiplier, 1.0);
    }
}
