//! Append-only history of optimization events.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger { Manual, Autonomous }

impl Trigger {
    pub fn as_str(&self) -> &'static str { match self { Trigger::Manual => "manual", Trigger::Autonomous => "autonomous" } }
}

#[derive(Debug, Clone, Serialize)]
pub struct OptimizationEvent {
    pub sequence: u64,
    pub target_label: String,
    pub timestamp: DateTime<Utc>,
    pub improvement_estimate: f64,
    pub techniques: BTreeSet<String>,
    pub trigger: Trigger,
    #[serde(skip)]
    recorded_at: Instant,
}

impl OptimizationEvent {
    pub fn age(&self) -> Duration { self.recorded_at.elapsed() }
}

#[derive(Debug, Default)]
pub struct OptimizationLedger {
    events: RwLock<Vec<OptimizationEvent>>,
}

impl OptimizationLedger {
    pub fn new() -> Self { Self::default() }

    /// Append one event. Timestamps never go backwards even if the wall clock does.
    pub fn record_event(&self, target_label: &str, techniques: BTreeSet<String>, improvement_estimate: f64, trigger: Trigger) -> OptimizationEvent {
        let mut events = self.events.write();
        let now = Utc::now();
        let timestamp = events.last().map(|last| last.timestamp.max(now)).unwrap_or(now);
        let event = OptimizationEvent {
            sequence: events.len() as u64 + 1,
            target_label: target_label.to_string(),
            timestamp,
            improvement_estimate,
            techniques,
            trigger,
            recorded_at: Instant::now(),
        };
        events.push(event.clone());
        event
    }

    /// Events recorded within the last `window`, measured on the monotonic clock.
    pub fn recent_count(&self, window: Duration) -> usize {
        // appended in order, so scan from the newest end
        self.events.read().iter().rev().take_while(|e| e.recorded_at.elapsed() <= window).count()
    }

    pub fn all(&self) -> Vec<OptimizationEvent> { self.events.read().clone() }
    pub fn len(&self) -> usize { self.events.read().len() }
    pub fn is_empty(&self) -> bool { self.events.read().is_empty() }
    pub fn last(&self) -> Option<OptimizationEvent> { self.events.read().last().cloned() }
}
