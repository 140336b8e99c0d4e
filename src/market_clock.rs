// =============================================================================
// Market Clock — single authoritative source of "now" and session phase
// =============================================================================
//
// A single `now()` is sampled once per cycle by the Scheduler and threaded
// through every component; nothing downstream calls `Utc::now()` directly.
// This mirrors the donor's single warmup-delay/interval-driven timing in
// `main.rs`, generalised into an injectable clock so tests can supply a
// fixed time.

use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    PreMarket,
    Open,
    AfterHours,
    Closed,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PreMarket => write!(f, "PRE_MARKET"),
            Self::Open => write!(f, "OPEN"),
            Self::AfterHours => write!(f, "AFTER_HOURS"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}

pub trait MarketClock: Send + Sync {
    fn now(&self) -> DateTime<Tz>;
    /// `broker_market_open` is the exchange's own reported open flag, when
    /// the broker adapter has one available this cycle; it takes priority
    /// over the wall-clock session windows below.
    fn phase(&self, broker_market_open: Option<bool>) -> SessionPhase;
    fn is_open(&self, broker_market_open: Option<bool>) -> bool {
        matches!(self.phase(broker_market_open), SessionPhase::Open)
    }
}

/// Session windows, local exchange time.
pub struct SessionWindows {
    pub pre_market_warmup: NaiveTime,
    pub session_open: NaiveTime,
    pub flatten_time: NaiveTime,
    pub session_close: NaiveTime,
}

impl Default for SessionWindows {
    fn default() -> Self {
        Self {
            pre_market_warmup: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            session_open: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            flatten_time: NaiveTime::from_hms_opt(15, 50, 0).unwrap(),
            session_close: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
        }
    }
}

/// Wall-clock-backed implementation, anchored to a configured IANA timezone.
pub struct WallClock {
    tz: Tz,
    windows: SessionWindows,
}

impl WallClock {
    pub fn new(tz: Tz, windows: SessionWindows) -> Self {
        Self { tz, windows }
    }
}

impl MarketClock for WallClock {
    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.tz)
    }

    fn phase(&self, broker_market_open: Option<bool>) -> SessionPhase {
        if let Some(open) = broker_market_open {
            if open {
                return SessionPhase::Open;
            }
        }
        let t = self.now().time();
        if t < self.windows.pre_market_warmup {
            SessionPhase::Closed
        } else if t < self.windows.session_open {
            SessionPhase::PreMarket
        } else if t < self.windows.session_close {
            SessionPhase::Open
        } else {
            SessionPhase::AfterHours
        }
    }
}

/// A clock fixed at construction time — used by tests and by the Scheduler
/// to freeze `now()` for the duration of a single cycle.
pub struct FixedClock {
    at: DateTime<Tz>,
    forced_open: Option<bool>,
}

impl FixedClock {
    pub fn new(at: DateTime<Tz>, forced_open: Option<bool>) -> Self {
        Self { at, forced_open }
    }
}

impl MarketClock for FixedClock {
    fn now(&self) -> DateTime<Tz> {
        self.at
    }

    fn phase(&self, broker_market_open: Option<bool>) -> SessionPhase {
        let open = broker_market_open.or(self.forced_open);
        let windows = SessionWindows::default();
        if let Some(true) = open {
            return SessionPhase::Open;
        }
        let t = self.at.time();
        if t < windows.pre_market_warmup {
            SessionPhase::Closed
        } else if t < windows.session_open {
            SessionPhase::PreMarket
        } else if t < windows.session_close {
            SessionPhase::Open
        } else {
            SessionPhase::AfterHours
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::New_York;

    fn at(h: u32, m: u32) -> DateTime<Tz> {
        New_York
            .with_ymd_and_hms(2026, 7, 20, h, m, 0)
            .unwrap()
    }

    #[test]
    fn before_warmup_is_closed() {
        let clock = FixedClock::new(at(7, 0), None);
        assert_eq!(clock.phase(None), SessionPhase::Closed);
        assert!(!clock.is_open(None));
    }

    #[test]
    fn between_warmup_and_open_is_pre_market() {
        let clock = FixedClock::new(at(9, 0), None);
        assert_eq!(clock.phase(None), SessionPhase::PreMarket);
    }

    #[test]
    fn during_session_is_open() {
        let clock = FixedClock::new(at(10, 0), None);
        assert_eq!(clock.phase(None), SessionPhase::Open);
        assert!(clock.is_open(None));
    }

    #[test]
    fn after_close_is_after_hours() {
        let clock = FixedClock::new(at(17, 0), None);
        assert_eq!(clock.phase(None), SessionPhase::AfterHours);
    }

    #[test]
    fn broker_flag_overrides_wall_clock() {
        let clock = FixedClock::new(at(7, 0), None);
        assert_eq!(clock.phase(Some(true)), SessionPhase::Open);
    }
}
