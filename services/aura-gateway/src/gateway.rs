//! Transport-agnostic request handling over a [`SystemRegistry`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use crate::error::GatewayError;
use crate::invoker::Invoker;
use crate::ledger::{OptimizationEvent, Trigger};
use crate::metrics::OperationMetrics;
use crate::registry::SystemRegistry;
use crate::target::CallArgs;
use crate::telemetry;

pub const DEFAULT_OPTIMIZATION_HINT: &str = "performance";

#[derive(Debug, Clone)]
pub struct InvokeOutcome {
    pub value: Value,
    pub elapsed: Duration,
    /// Identity of the binding that served the call.
    pub binding: String,
}

#[derive(Debug, Clone)]
pub struct OptimizeReport {
    pub message: String,
    pub before_id: String,
    pub after_id: String,
    pub event: OptimizationEvent,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub operation_metrics: BTreeMap<String, OperationMetrics>,
    pub optimization_history: Vec<OptimizationEvent>,
    pub total_optimizations: usize,
    pub status: &'static str,
    pub target: String,
}

pub struct Gateway {
    registry: Arc<SystemRegistry>,
    invoker: Invoker,
    permits: Arc<Semaphore>,
}

impl Gateway {
    pub fn new(registry: Arc<SystemRegistry>, invoker: Invoker, max_in_flight: usize) -> Self {
        Self { registry, invoker, permits: Arc::new(Semaphore::new(max_in_flight.max(1))) }
    }

    pub fn registry(&self) -> &Arc<SystemRegistry> { &self.registry }

    pub async fn invoke(&self, system_name: &str, operation: &str, args: CallArgs) -> Result<InvokeOutcome, GatewayError> {
        let system = self.registry.get(system_name)?;
        // the semaphore is never closed
        let _permit = self.permits.acquire().await.ok();
        let binding = system.binding();
        match self.invoker.invoke(binding.table(), operation, args).await {
            Ok(inv) => {
                system.metrics().record(operation, inv.elapsed);
                telemetry::record_invocation(system_name, operation, "executed", Some(inv.elapsed));
                debug!(system = system_name, operation, elapsed_us = inv.elapsed.as_micros() as u64, "invocation_executed");
                Ok(InvokeOutcome { value: inv.value, elapsed: inv.elapsed, binding: binding.identity() })
            }
            Err(e) => {
                match &e {
                    GatewayError::OperationExecution { .. } | GatewayError::Timeout { .. } => {
                        system.metrics().record_failure(operation);
                        telemetry::record_invocation(system_name, operation, e.kind(), None);
                        warn!(system = system_name, operation, kind = e.kind(), error = %e, "invocation_failed");
                    }
                    _ => {
                        telemetry::record_invocation(system_name, operation, e.kind(), None);
                        debug!(system = system_name, operation, kind = e.kind(), "invocation_rejected");
                    }
                }
                Err(e)
            }
        }
    }

    pub fn optimize(&self, system_name: &str, hint: &str) -> Result<OptimizeReport, GatewayError> {
        let system = self.registry.get(system_name)?;
        let label = match hint.trim() { "" => DEFAULT_OPTIMIZATION_HINT, h => h };
        let outcome = system.optimize(label, Trigger::Manual)?;
        info!(system = system_name, label, before = %outcome.before_id, after = %outcome.after_id, "manual_optimization");
        Ok(OptimizeReport { message: format!("system optimized for: {label}"), before_id: outcome.before_id, after_id: outcome.after_id, event: outcome.event })
    }

    pub fn metrics(&self, system_name: &str) -> Result<MetricsReport, GatewayError> {
        let system = self.registry.get(system_name)?;
        let history = system.ledger().all();
        Ok(MetricsReport {
            operation_metrics: system.metrics().snapshot(),
            total_optimizations: history.len(),
            status: if history.is_empty() { "ACTIVE" } else { "OPTIMIZED" },
            optimization_history: history,
            target: system.binding().identity(),
        })
    }
}
