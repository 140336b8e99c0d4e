// =============================================================================
// Structured decision events — one record per pipeline stage acceptance
// or rejection, for external observability collaborators
// =============================================================================
//
// Grounded in the donor's `app_state.rs` (`recent_decisions`/`recent_errors`
// bounded `Vec` ring buffers, capped with `while len() > MAX { remove(0) }`)
// and in `decision_envelope.rs`'s allow/blocked constructor pair. Unlike the
// envelope (one record per symbol per cycle, carrying the full Risk
// Decision), an event is emitted at *every* stage boundary — the finer-
// grained observability contract of spec.md §6.

use std::collections::VecDeque;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::info;

const MAX_EVENTS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    DataAdapter,
    FeatureEngine,
    RegimeClassifier,
    AgentSet,
    Ensemble,
    OptionUniverseFilter,
    OptionSelector,
    RiskStack,
    Broker,
    PositionManager,
    Scheduler,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verdict {
    Accepted,
    Rejected,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// `{ts, symbol, stage, verdict, reason, metrics}` — the observability
/// contract's unit record.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionEvent {
    pub ts: String,
    pub symbol: String,
    pub stage: Stage,
    pub verdict: Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub metrics: serde_json::Value,
}

impl DecisionEvent {
    pub fn accepted(symbol: impl Into<String>, stage: Stage, metrics: serde_json::Value) -> Self {
        Self {
            ts: Utc::now().to_rfc3339(),
            symbol: symbol.into(),
            stage,
            verdict: Verdict::Accepted,
            reason: None,
            metrics,
        }
    }

    pub fn rejected(symbol: impl Into<String>, stage: Stage, reason: impl Into<String>, metrics: serde_json::Value) -> Self {
        Self {
            ts: Utc::now().to_rfc3339(),
            symbol: symbol.into(),
            stage,
            verdict: Verdict::Rejected,
            reason: Some(reason.into()),
            metrics,
        }
    }

    /// Emit as a `tracing` event. Callers also push into the shared
    /// `EventLog` so a future snapshot-read API has something to read.
    pub fn emit(&self) {
        info!(
            ts = %self.ts,
            symbol = %self.symbol,
            stage = %self.stage,
            verdict = %self.verdict,
            reason = ?self.reason,
            metrics = %self.metrics,
            "decision_event"
        );
    }
}

/// Bounded ring buffer of recent decision events, same shape as the donor's
/// `recent_decisions`/`recent_errors` logs in `app_state.rs`.
pub struct EventLog {
    buffer: RwLock<VecDeque<DecisionEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self { buffer: RwLock::new(VecDeque::new()) }
    }

    /// Emits the event via `tracing` and appends it to the ring buffer,
    /// evicting the oldest entry once [`MAX_EVENTS`] is exceeded.
    pub fn record(&self, event: DecisionEvent) {
        event.emit();
        let mut buf = self.buffer.write();
        buf.push_back(event);
        while buf.len() > MAX_EVENTS {
            buf.pop_front();
        }
    }

    pub fn recent(&self, count: usize) -> Vec<DecisionEvent> {
        let buf = self.buffer.read();
        buf.iter().rev().take(count).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}
