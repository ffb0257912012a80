//! A registered system: the published target binding plus the metrics and
//! ledger that outlive any single target instance.

use std::sync::Arc;
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::info;
use uuid::Uuid;
use crate::capability::{discover, CapabilityTable};
use crate::error::GatewayError;
use crate::ledger::{OptimizationEvent, OptimizationLedger, Trigger};
use crate::metrics::MetricsStore;
use crate::policy::OptimizationPolicy;
use crate::target::Target;
use crate::telemetry;

/// One target instance together with the capabilities discovered on it.
pub struct Binding {
    id: Uuid,
    target: Arc<dyn Target>,
    table: CapabilityTable,
    bound_at: DateTime<Utc>,
}

impl Binding {
    pub fn bind(target: Arc<dyn Target>) -> Result<Self, GatewayError> {
        let table = discover(&target)?;
        Ok(Self { id: Uuid::new_v4(), target, table, bound_at: Utc::now() })
    }

    /// `<type name>@<instance id>`; distinct for every bound instance.
    pub fn identity(&self) -> String { format!("{}@{}", self.target.type_name(), self.id.simple()) }
    pub fn target(&self) -> &Arc<dyn Target> { &self.target }
    pub fn table(&self) -> &CapabilityTable { &self.table }
    pub fn bound_at(&self) -> DateTime<Utc> { self.bound_at }
}

#[derive(Debug, Clone)]
pub struct OptimizationOutcome {
    pub event: OptimizationEvent,
    pub before_id: String,
    pub after_id: String,
}

impl OptimizationOutcome {
    pub fn replaced(&self) -> bool { self.before_id != self.after_id }
}

pub struct System {
    name: String,
    binding: ArcSwap<Binding>,
    metrics: MetricsStore,
    ledger: OptimizationLedger,
    policy: Arc<dyn OptimizationPolicy>,
    optimizing: Mutex<()>,
}

impl System {
    pub fn integrate(name: impl Into<String>, target: Arc<dyn Target>, policy: Arc<dyn OptimizationPolicy>) -> Result<Arc<Self>, GatewayError> {
        let binding = Binding::bind(target)?;
        let name = name.into();
        info!(system = %name, binding = %binding.identity(), operations = ?binding.table().names(), "system_integrated");
        Ok(Arc::new(Self { name, binding: ArcSwap::from_pointee(binding), metrics: MetricsStore::new(), ledger: OptimizationLedger::new(), policy, optimizing: Mutex::new(()) }))
    }

    pub fn name(&self) -> &str { &self.name }

    /// The binding current at the time of the call. Callers keep using it even
    /// if an optimization publishes a replacement meanwhile.
    pub fn binding(&self) -> Arc<Binding> { self.binding.load_full() }
    pub fn metrics(&self) -> &MetricsStore { &self.metrics }
    pub fn ledger(&self) -> &OptimizationLedger { &self.ledger }

    /// Record one optimization event, publishing a replacement target first if
    /// the policy produces one. Metrics and ledger carry over to the new target.
    /// Nothing is recorded or published when the rebuild fails.
    pub fn optimize(&self, label: &str, trigger: Trigger) -> Result<OptimizationOutcome, GatewayError> {
        let _serial = self.optimizing.lock();
        let current = self.binding.load_full();
        let estimate = self.policy.estimate_improvement(current.target().as_ref(), label);
        let techniques = self.policy.techniques(label);
        let replacement = self.policy.rebuild(current.target(), label)
            .map_err(|source| GatewayError::Optimization { system: self.name.clone(), source })?;
        let after = match replacement {
            Some(target) => {
                let next = Binding::bind(target).map_err(|e| GatewayError::Optimization { system: self.name.clone(), source: Box::new(e) })?;
                let next = Arc::new(next);
                self.binding.store(next.clone());
                next
            }
            None => current.clone(),
        };
        let event = self.ledger.record_event(label, techniques, estimate, trigger);
        telemetry::record_optimization(&self.name, trigger.as_str());
        let outcome = OptimizationOutcome { event, before_id: current.identity(), after_id: after.identity() };
        info!(system = %self.name, label, trigger = trigger.as_str(), sequence = outcome.event.sequence, replaced = outcome.replaced(), "optimization_recorded");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::policy::FixedImprovement;
    use crate::target::FnTarget;
    use serde_json::json;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    fn calc(version: u64) -> Arc<dyn Target> {
        FnTarget::new("Calc").operation("version", move |_| Ok(json!(version))).into_target()
    }

    /// Rebuilds into a new instance with a bumped version, or fails on demand.
    struct Swapping { next: AtomicU64, fail: AtomicBool, empty: AtomicBool }

    impl OptimizationPolicy for Swapping {
        fn estimate_improvement(&self, _t: &dyn Target, _l: &str) -> f64 { 0.3 }
        fn techniques(&self, _l: &str) -> BTreeSet<String> { ["rebind".to_string()].into_iter().collect() }
        fn rebuild(&self, _c: &Arc<dyn Target>, _l: &str) -> Result<Option<Arc<dyn Target>>, BoxError> {
            if self.fail.load(Ordering::SeqCst) { return Err("target unreachable".into()); }
            if self.empty.load(Ordering::SeqCst) { return Ok(Some(FnTarget::new("Hollow").into_target())); }
            Ok(Some(calc(self.next.fetch_add(1, Ordering::SeqCst))))
        }
    }

    fn swapping() -> Arc<Swapping> { Arc::new(Swapping { next: AtomicU64::new(2), fail: AtomicBool::new(false), empty: AtomicBool::new(false) }) }

    #[test]
    fn fixed_policy_keeps_identity() {
        let sys = System::integrate("sys", calc(1), Arc::new(FixedImprovement::default())).unwrap();
        let out = sys.optimize("performance", Trigger::Manual).unwrap();
        assert_eq!(out.before_id, out.after_id);
        assert!(!out.replaced());
        assert_eq!(out.event.improvement_estimate, 0.15);
        assert_eq!(sys.ledger().len(), 1);
    }

    #[test]
    fn replacement_is_published_and_history_kept() {
        let sys = System::integrate("sys", calc(1), swapping()).unwrap();
        sys.metrics().record("version", std::time::Duration::from_millis(1));
        let held = sys.binding();
        let out = sys.optimize("performance", Trigger::Manual).unwrap();
        assert!(out.replaced());
        assert_eq!(out.before_id, held.identity());
        assert_eq!(out.after_id, sys.binding().identity());
        // the binding loaded before the swap is still intact
        assert!(held.table().contains("version"));
        assert_eq!(sys.metrics().get("version").unwrap().call_count, 1);
        assert_eq!(sys.ledger().all()[0].techniques.len(), 1);
    }

    #[test]
    fn failed_rebuild_records_nothing() {
        let policy = swapping();
        let sys = System::integrate("sys", calc(1), policy.clone()).unwrap();
        let before = sys.binding().identity();
        policy.fail.store(true, Ordering::SeqCst);
        assert!(matches!(sys.optimize("performance", Trigger::Manual), Err(GatewayError::Optimization { .. })));
        policy.fail.store(false, Ordering::SeqCst);
        policy.empty.store(true, Ordering::SeqCst);
        assert!(matches!(sys.optimize("performance", Trigger::Manual), Err(GatewayError::Optimization { .. })));
        assert!(sys.ledger().is_empty());
        assert_eq!(sys.binding().identity(), before);
    }

    #[test]
    fn integrate_requires_operations() {
        let err = System::integrate("sys", FnTarget::new("Nothing").into_target(), Arc::new(FixedImprovement::default())).err().unwrap();
        assert_eq!(err.kind(), "discovery");
    }
}
