//! Sample target registered by the server binary.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use serde_json::{json, Value};
use crate::error::BoxError;
use crate::target::{CallArgs, Member, Target};

/// `process_data(data)` upper-cases strings and squares numbers (booleans
/// count as 0 and 1), dropping anything else. `analyze_patterns(text)` counts whitespace-separated words.
#[derive(Debug, Default)]
pub struct DataProcessor {
    items_processed: AtomicU64,
}

impl DataProcessor {
    pub fn new() -> Self { Self::default() }
    pub fn into_target(self) -> Arc<dyn Target> { Arc::new(self) }
    pub fn items_processed(&self) -> u64 { self.items_processed.load(Ordering::Relaxed) }

    pub fn process_data(&self, args: &CallArgs) -> Result<Value, BoxError> {
        let data = args.arg(0, "data")?.as_array().ok_or("data must be a list")?;
        let out: Vec<Value> = data.iter().filter_map(transform).collect();
        self.items_processed.fetch_add(out.len() as u64, Ordering::Relaxed);
        Ok(Value::Array(out))
    }

    pub fn analyze_patterns(&self, args: &CallArgs) -> Result<Value, BoxError> {
        let text = args.arg(0, "text")?.as_str().ok_or("text must be a string")?;
        Ok(json!({ "word_count": text.split_whitespace().count() }))
    }
}

fn transform(item: &Value) -> Option<Value> {
    match item {
        Value::String(s) => Some(Value::String(s.to_uppercase())),
        Value::Bool(b) => Some(Value::from(i64::from(*b))),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Some(i.checked_mul(i).map(Value::from).unwrap_or_else(|| Value::from((i as f64) * (i as f64)))),
            (None, Some(f)) => Some(Value::from(f * f)),
            _ => None,
        },
        _ => None,
    }
}

impl Target for DataProcessor {
    fn type_name(&self) -> &str { "DataProcessor" }

    fn members(self: Arc<Self>) -> Vec<Member> {
        let (p, a) = (self.clone(), self);
        vec![
            Member::Operation { name: "process_data".into(), call: Arc::new(move |args: &CallArgs| p.process_data(args)) },
            Member::Operation { name: "analyze_patterns".into(), call: Arc::new(move |args: &CallArgs| a.analyze_patterns(args)) },
            Member::Attribute { name: "items_processed".into() },
        ]
    }
}
