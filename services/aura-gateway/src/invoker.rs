//! Instrumented invocation: run one capability, time it, report the outcome.
//!
//! The invoker does no bookkeeping; callers decide where timings go.

use std::time::{Duration, Instant};
use serde_json::Value;
use crate::capability::CapabilityTable;
use crate::error::GatewayError;
use crate::target::CallArgs;

#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub value: Value,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct Invoker {
    timeout: Duration,
}

impl Default for Invoker { fn default() -> Self { Self::new(Duration::from_secs(5)) } }

impl Invoker {
    pub fn new(timeout: Duration) -> Self { Self { timeout } }
    pub fn timeout(&self) -> Duration { self.timeout }

    /// Execute `name` exactly once. The bound covers waiting for a serialized
    /// target's gate as well as the call itself; `elapsed` covers the call only.
    /// A call that outlives the bound keeps running on the blocking pool, and
    /// keeps the gate, until it returns.
    pub async fn invoke(&self, table: &CapabilityTable, name: &str, args: CallArgs) -> Result<Invocation, GatewayError> {
        let capability = table.get(name).ok_or_else(|| GatewayError::UnknownOperation { operation: name.to_string() })?;
        let call = capability.handle();
        let gate = table.gate();
        let run = async move {
            let guard = match gate { Some(g) => Some(g.lock_owned().await), None => None };
            tokio::task::spawn_blocking(move || {
                let _guard = guard;
                let start = Instant::now();
                let result = call(&args);
                (result, start.elapsed())
            }).await
        };
        match tokio::time::timeout(self.timeout, run).await {
            Err(_) => Err(GatewayError::Timeout { operation: name.to_string(), after: self.timeout }),
            Ok(Err(join_err)) => Err(GatewayError::OperationExecution { operation: name.to_string(), source: Box::new(join_err) }),
            Ok(Ok((Err(source), _))) => Err(GatewayError::OperationExecution { operation: name.to_string(), source }),
            Ok(Ok((Ok(value), elapsed))) => Ok(Invocation { value, elapsed }),
        }
    }
}
