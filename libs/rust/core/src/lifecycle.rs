//! Service lifecycle finite state machine.
//!
//! Phases:
//! - Starting (config, tracing, metrics)
//! - Integrating (targets discovered and registered)
//! - Serving (accepting requests)
//! - Draining (shutdown requested)
//!
//! Tracks the duration of each completed phase and drives readiness.

use std::time::{Instant, Duration};
use serde::{Serialize, Deserialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ServicePhase { Starting, Integrating, Serving, Draining }

impl ServicePhase {
    pub fn as_str(&self) -> &'static str {
        match self { ServicePhase::Starting => "starting", ServicePhase::Integrating => "integrating", ServicePhase::Serving => "serving", ServicePhase::Draining => "draining" }
    }
}

#[derive(Debug)]
pub struct ServiceLifecycle {
    phase: ServicePhase,
    started_at: Instant,
    phase_started_at: Instant,
    phase_durations: Vec<(ServicePhase, Duration)>,
}

impl Default for ServiceLifecycle { fn default() -> Self { Self::new() } }

impl ServiceLifecycle {
    pub fn new() -> Self { Self { phase: ServicePhase::Starting, started_at: Instant::now(), phase_started_at: Instant::now(), phase_durations: Vec::new() } }
    pub fn phase(&self) -> ServicePhase { self.phase }

    /// Move to the next phase; `Draining` is terminal. Readiness follows `Serving`.
    pub fn advance(&mut self) -> ServicePhase {
        if self.phase == ServicePhase::Draining { return self.phase; }
        let now = Instant::now();
        self.phase_durations.push((self.phase, now - self.phase_started_at));
        self.phase = match self.phase { ServicePhase::Starting => ServicePhase::Integrating, ServicePhase::Integrating => ServicePhase::Serving, ServicePhase::Serving | ServicePhase::Draining => ServicePhase::Draining };
        self.phase_started_at = now;
        match self.phase { ServicePhase::Serving => crate::mark_ready(), ServicePhase::Draining => crate::clear_ready(), _ => {} }
        crate::set_status_field("phase", serde_json::json!(self.phase.as_str()));
        tracing::info!(phase = self.phase.as_str(), uptime_ms = self.started_at.elapsed().as_millis() as u64, "lifecycle_phase_changed");
        self.phase
    }

    pub fn is_serving(&self) -> bool { self.phase == ServicePhase::Serving }
    pub fn durations(&self) -> &[(ServicePhase, Duration)] { &self.phase_durations }
}
