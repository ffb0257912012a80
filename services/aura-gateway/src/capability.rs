//! Capability discovery: the table of invocable operations of one target.
//!
//! Built once per target instance and never mutated. Replacing the target means
//! running [`discover`] again.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use crate::error::GatewayError;
use crate::target::{Concurrency, Member, OperationFn, Target};

/// Executable entry point bound to a target instance.
#[derive(Clone)]
pub struct Capability {
    name: String,
    call: Arc<OperationFn>,
}

impl Capability {
    pub fn name(&self) -> &str { &self.name }
    pub(crate) fn handle(&self) -> Arc<OperationFn> { self.call.clone() }
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.debug_struct("Capability").field("name", &self.name).finish() }
}

#[derive(Clone, Debug)]
pub struct CapabilityTable {
    entries: Arc<BTreeMap<String, Capability>>,
    // held for the whole execution of each call on Serialized targets
    gate: Option<Arc<Mutex<()>>>,
}

impl CapabilityTable {
    pub fn get(&self, name: &str) -> Option<&Capability> { self.entries.get(name) }
    pub fn contains(&self, name: &str) -> bool { self.entries.contains_key(name) }
    pub fn names(&self) -> Vec<String> { self.entries.keys().cloned().collect() }
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
    pub fn is_serialized(&self) -> bool { self.gate.is_some() }
    pub(crate) fn gate(&self) -> Option<Arc<Mutex<()>>> { self.gate.clone() }
}

fn is_private(name: &str) -> bool { name.is_empty() || name.starts_with('_') }

/// Inspect `target` once and bind its public operations.
pub fn discover(target: &Arc<dyn Target>) -> Result<CapabilityTable, GatewayError> {
    let type_name = target.type_name().to_string();
    let mut entries = BTreeMap::new();
    let mut skipped = 0usize;
    for member in target.clone().members() {
        match member {
            Member::Operation { name, call } if !is_private(&name) => {
                if entries.contains_key(&name) {
                    return Err(GatewayError::Discovery { target: type_name, reason: format!("duplicate operation '{name}'") });
                }
                entries.insert(name.clone(), Capability { name, call });
            }
            _ => skipped += 1,
        }
    }
    if entries.is_empty() {
        return Err(GatewayError::Discovery { target: type_name, reason: "no public operations".into() });
    }
    let gate = match target.concurrency() { Concurrency::Serialized => Some(Arc::new(Mutex::new(()))), Concurrency::Parallel => None };
    tracing::debug!(target_type = %type_name, operations = entries.len(), skipped, serialized = gate.is_some(), "capabilities_discovered");
    Ok(CapabilityTable { entries: Arc::new(entries), gate })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::FnTarget;
    use serde_json::json;

    #[test]
    fn keeps_public_callables_only() {
        let t = FnTarget::new("Calc")
            .operation("double", |_| Ok(json!(0)))
            .operation("_helper", |_| Ok(json!(0)))
            .attribute("precision")
            .into_target();
        let table = discover(&t).unwrap();
        assert_eq!(table.names(), vec!["double".to_string()]);
        assert!(!table.contains("precision"));
        assert!(!table.is_serialized());
    }

    #[test]
    fn empty_target_fails() {
        let t = FnTarget::new("Empty").attribute("x").operation("_hidden", |_| Ok(json!(null))).into_target();
        let err = discover(&t).unwrap_err();
        assert!(matches!(err, GatewayError::Discovery { ref target, .. } if target == "Empty"));
    }

    #[test]
    fn duplicate_names_fail() {
        let t = FnTarget::new("Dup").operation("a", |_| Ok(json!(1))).operation("a", |_| Ok(json!(2))).into_target();
        assert!(matches!(discover(&t), Err(GatewayError::Discovery { .. })));
    }

    #[test]
    fn serialized_targets_get_a_gate() {
        let t = FnTarget::new("Serial").operation("a", |_| Ok(json!(1))).serialized().into_target();
        assert!(discover(&t).unwrap().is_serialized());
    }
}
