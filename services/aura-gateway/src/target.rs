//! Targets: server-resident objects whose operations are invoked by name.
//!
//! A target only has to list its members. Discovery (see [`crate::capability`])
//! decides which of them become invocable.

use std::sync::Arc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use crate::error::{BoxError, GatewayError};

pub type OperationFn = dyn Fn(&CallArgs) -> Result<Value, BoxError> + Send + Sync;
pub type ProbeFn = dyn Fn() -> Result<(), BoxError> + Send + Sync;

/// Positional and keyword arguments of one invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallArgs {
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
}

impl CallArgs {
    pub fn positional(args: Vec<Value>) -> Self { Self { args, kwargs: Map::new() } }

    /// Decode wire arguments. Empty strings stand for `[]` and `{}`.
    pub fn decode(args_json: &str, kwargs_json: &str) -> Result<Self, GatewayError> {
        let args = match args_json.trim() {
            "" => Vec::new(),
            raw => match serde_json::from_str::<Value>(raw) {
                Ok(Value::Array(items)) => items,
                Ok(other) => return Err(GatewayError::InvalidArgument(format!("args_json must be a JSON array, got {}", json_type(&other)))),
                Err(e) => return Err(GatewayError::InvalidArgument(format!("args_json: {e}"))),
            },
        };
        let kwargs = match kwargs_json.trim() {
            "" => Map::new(),
            raw => match serde_json::from_str::<Value>(raw) {
                Ok(Value::Object(map)) => map,
                Ok(other) => return Err(GatewayError::InvalidArgument(format!("kwargs_json must be a JSON object, got {}", json_type(&other)))),
                Err(e) => return Err(GatewayError::InvalidArgument(format!("kwargs_json: {e}"))),
            },
        };
        Ok(Self { args, kwargs })
    }

    /// Keyword `name` if present, else positional `index`.
    pub fn arg(&self, index: usize, name: &str) -> Result<&Value, BoxError> {
        self.kwargs.get(name).or_else(|| self.args.get(index)).ok_or_else(|| format!("missing argument '{name}' (position {index})").into())
    }
}

fn json_type(v: &Value) -> &'static str {
    match v { Value::Null => "null", Value::Bool(_) => "bool", Value::Number(_) => "number", Value::String(_) => "string", Value::Array(_) => "array", Value::Object(_) => "object" }
}

/// Whether a target's operations may run concurrently with each other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Concurrency { #[default] Parallel, Serialized }

pub enum Member {
    Operation { name: String, call: Arc<OperationFn> },
    Attribute { name: String },
}

impl Member {
    pub fn name(&self) -> &str { match self { Member::Operation { name, .. } | Member::Attribute { name } => name } }
}

pub trait Target: Send + Sync + 'static {
    fn type_name(&self) -> &str;

    /// Every member the target exposes. Operations are bound to this instance.
    fn members(self: Arc<Self>) -> Vec<Member>;

    fn concurrency(&self) -> Concurrency { Concurrency::Parallel }

    /// Liveness check run by the background monitor.
    fn probe(&self) -> Result<(), BoxError> { Ok(()) }
}

/// Target assembled from closures.
pub struct FnTarget {
    type_name: String,
    operations: Vec<(String, Arc<OperationFn>)>,
    attributes: Vec<String>,
    concurrency: Concurrency,
    probe: Option<Arc<ProbeFn>>,
}

impl FnTarget {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self { type_name: type_name.into(), operations: Vec::new(), attributes: Vec::new(), concurrency: Concurrency::Parallel, probe: None }
    }

    pub fn operation<F>(mut self, name: impl Into<String>, call: F) -> Self
    where F: Fn(&CallArgs) -> Result<Value, BoxError> + Send + Sync + 'static {
        self.operations.push((name.into(), Arc::new(call)));
        self
    }

    pub fn attribute(mut self, name: impl Into<String>) -> Self { self.attributes.push(name.into()); self }
    pub fn serialized(mut self) -> Self { self.concurrency = Concurrency::Serialized; self }

    pub fn probe_with<F>(mut self, probe: F) -> Self
    where F: Fn() -> Result<(), BoxError> + Send + Sync + 'static {
        self.probe = Some(Arc::new(probe));
        self
    }

    pub fn into_target(self) -> Arc<dyn Target> { Arc::new(self) }
}

impl Target for FnTarget {
    fn type_name(&self) -> &str { &self.type_name }

    fn members(self: Arc<Self>) -> Vec<Member> {
        let ops = self.operations.iter().map(|(name, call)| Member::Operation { name: name.clone(), call: call.clone() });
        let attrs = self.attributes.iter().map(|name| Member::Attribute { name: name.clone() });
        ops.chain(attrs).collect()
    }

    fn concurrency(&self) -> Concurrency { self.concurrency }

    fn probe(&self) -> Result<(), BoxError> { self.probe.as_ref().map(|p| p()).unwrap_or(Ok(())) }
}
