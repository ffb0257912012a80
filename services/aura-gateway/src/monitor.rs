//! Background monitor: one cancellable task per system that records an
//! autonomous maintenance event whenever the ledger has been idle.
//!
//! Cycle: sleep `interval` (Idle), probe the target and read the ledger
//! (Check), optimize if nothing was recorded within `idle_window` (Optimize).
//! Failures never leave the task; they are logged and followed by a growing
//! back-off before cycling resumes.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use anyhow::ensure;
use aura_core::Backoff;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use crate::error::BoxError;
use crate::ledger::Trigger;
use crate::system::{OptimizationOutcome, System};
use crate::telemetry;

pub const AUTONOMOUS_LABEL: &str = "auto_maintenance";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub enabled: bool,
    pub interval_ms: u64,
    pub idle_window_ms: u64,
    pub error_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Upper bound on one Check step (probe plus optimization).
    pub cycle_timeout_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self { Self { enabled: true, interval_ms: 30_000, idle_window_ms: 30_000, error_backoff_ms: 60_000, max_backoff_ms: 300_000, cycle_timeout_ms: 10_000 } }
}

impl MonitorConfig {
    /// Cycle every `interval`, treating one interval without events as idle.
    pub fn every(interval: Duration) -> Self {
        let ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX).max(1);
        Self {
            enabled: true,
            interval_ms: ms,
            idle_window_ms: ms,
            error_backoff_ms: ms.saturating_mul(2),
            max_backoff_ms: ms.saturating_mul(10),
            cycle_timeout_ms: ms.saturating_mul(5),
        }
    }

    /// Zero durations would turn the loop into a busy spin.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.interval_ms > 0, "monitor.interval_ms must be positive");
        ensure!(self.idle_window_ms > 0, "monitor.idle_window_ms must be positive");
        ensure!(self.error_backoff_ms > 0, "monitor.error_backoff_ms must be positive");
        ensure!(self.cycle_timeout_ms > 0, "monitor.cycle_timeout_ms must be positive");
        Ok(())
    }

    pub fn interval(&self) -> Duration { Duration::from_millis(self.interval_ms.max(1)) }
    pub fn idle_window(&self) -> Duration { Duration::from_millis(self.idle_window_ms.max(1)) }
    pub fn cycle_timeout(&self) -> Duration { Duration::from_millis(self.cycle_timeout_ms.max(1)) }
    pub fn backoff(&self) -> Backoff { Backoff::new(Duration::from_millis(self.error_backoff_ms.max(1)), Duration::from_millis(self.max_backoff_ms)).with_jitter(0.1) }
}

#[derive(Debug)]
pub enum CycleOutcome {
    /// Events were recorded within the idle window; nothing to do.
    Active { recent: usize },
    Optimized(OptimizationOutcome),
}

pub struct Monitor {
    system: Arc<System>,
    cfg: MonitorConfig,
    // check still running on the blocking pool after its cycle timed out
    stalled: Option<JoinHandle<Result<CycleOutcome, BoxError>>>,
}

impl Monitor {
    pub fn new(system: Arc<System>, cfg: MonitorConfig) -> Self { Self { system, cfg, stalled: None } }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> { tokio::spawn(self.run(cancel)) }

    pub async fn run(mut self, cancel: CancellationToken) {
        let backoff = self.cfg.backoff();
        let mut failures = 0u32;
        info!(system = %self.system.name(), interval_ms = self.cfg.interval_ms, idle_window_ms = self.cfg.idle_window_ms, "monitor_started");
        loop {
            if !pause(&cancel, self.cfg.interval()).await { break; }
            let Some(result) = self.guarded_cycle(&cancel).await else { break };
            match result {
                Ok(CycleOutcome::Active { recent }) => {
                    failures = 0;
                    telemetry::record_monitor_cycle(self.system.name(), "active");
                    debug!(system = %self.system.name(), recent, "monitor_cycle_active");
                }
                Ok(CycleOutcome::Optimized(out)) => {
                    failures = 0;
                    telemetry::record_monitor_cycle(self.system.name(), "optimized");
                    info!(system = %self.system.name(), sequence = out.event.sequence, "monitor_triggered_optimization");
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    let delay = backoff.delay(failures);
                    telemetry::record_monitor_cycle(self.system.name(), "failed");
                    warn!(system = %self.system.name(), error = %e, failures, backoff_ms = delay.as_millis() as u64, "monitor_cycle_failed");
                    if !pause(&cancel, delay).await { break; }
                }
            }
        }
        info!(system = %self.system.name(), "monitor_stopped");
    }

    /// Run one Check step on the blocking pool, bounded by `cycle_timeout`.
    /// Returns `None` when cancelled first. A check that outlives its timeout
    /// is left to finish; no new check starts until it has.
    async fn guarded_cycle(&mut self, cancel: &CancellationToken) -> Option<Result<CycleOutcome, BoxError>> {
        let mut work = match self.stalled.take() {
            Some(h) if !h.is_finished() => {
                self.stalled = Some(h);
                return Some(Err("previous monitor cycle is still running".into()));
            }
            _ => {
                let (system, idle_window) = (self.system.clone(), self.cfg.idle_window());
                tokio::task::spawn_blocking(move || cycle_on(&system, idle_window))
            }
        };
        let bound = self.cfg.cycle_timeout();
        let finished = tokio::select! {
            _ = cancel.cancelled() => None,
            res = tokio::time::timeout(bound, &mut work) => Some(res),
        };
        match finished {
            None => { self.stalled = Some(work); None }
            Some(Ok(Ok(result))) => Some(result),
            Some(Ok(Err(join_err))) => Some(Err(join_err.into())),
            Some(Err(_)) => {
                self.stalled = Some(work);
                Some(Err(format!("monitor cycle exceeded {bound:?}").into()))
            }
        }
    }

    /// One Check step on the calling thread. Panics raised by the target or
    /// policy are reported as errors.
    pub fn cycle(&self) -> Result<CycleOutcome, BoxError> { cycle_on(&self.system, self.cfg.idle_window()) }
}

fn cycle_on(system: &System, idle_window: Duration) -> Result<CycleOutcome, BoxError> {
    match std::panic::catch_unwind(AssertUnwindSafe(|| check(system, idle_window))) {
        Ok(result) => result,
        Err(panic) => {
            let msg = panic.downcast_ref::<&str>().map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".into());
            Err(format!("monitor cycle panicked: {msg}").into())
        }
    }
}

fn check(system: &System, idle_window: Duration) -> Result<CycleOutcome, BoxError> {
    system.binding().target().probe()?;
    let recent = system.ledger().recent_count(idle_window);
    if recent > 0 { return Ok(CycleOutcome::Active { recent }); }
    Ok(CycleOutcome::Optimized(system.optimize(AUTONOMOUS_LABEL, Trigger::Autonomous)?))
}

/// Sleep unless cancelled first. Returns false on cancellation.
async fn pause(cancel: &CancellationToken, d: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(d) => true,
    }
}
