//! Optimization policy hook.
//!
//! The gateway never transforms code; a policy decides what an optimization
//! event claims and whether a fresh target instance replaces the current one.

use std::collections::BTreeSet;
use std::sync::Arc;
use serde::{Deserialize, Serialize};
use crate::error::BoxError;
use crate::target::Target;

pub trait OptimizationPolicy: Send + Sync {
    fn estimate_improvement(&self, target: &dyn Target, label: &str) -> f64;
    fn techniques(&self, label: &str) -> BTreeSet<String>;

    /// Replacement instance to publish, if any. `Ok(None)` keeps the current one.
    fn rebuild(&self, _current: &Arc<dyn Target>, _label: &str) -> Result<Option<Arc<dyn Target>>, BoxError> { Ok(None) }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationConfig {
    pub improvement_estimate: f64,
    pub techniques: Vec<String>,
}

impl Default for OptimizationConfig {
    fn default() -> Self { Self { improvement_estimate: 0.15, techniques: vec!["cache_optimization".into()] } }
}

/// Constant estimate and technique set; never replaces the target.
#[derive(Debug, Clone)]
pub struct FixedImprovement {
    improvement: f64,
    techniques: BTreeSet<String>,
}

impl Default for FixedImprovement { fn default() -> Self { Self::from(&OptimizationConfig::default()) } }

impl From<&OptimizationConfig> for FixedImprovement {
    fn from(cfg: &OptimizationConfig) -> Self { Self { improvement: cfg.improvement_estimate, techniques: cfg.techniques.iter().cloned().collect() } }
}

impl FixedImprovement {
    pub fn new(improvement: f64, techniques: impl IntoIterator<Item = String>) -> Self { Self { improvement, techniques: techniques.into_iter().collect() } }
}

impl OptimizationPolicy for FixedImprovement {
    fn estimate_improvement(&self, _target: &dyn Target, _label: &str) -> f64 { self.improvement }
    fn techniques(&self, _label: &str) -> BTreeSet<String> { self.techniques.clone() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::FnTarget;

    #[test]
    fn defaults_match_config() {
        let p = FixedImprovement::default();
        let t = FnTarget::new("T").operation("a", |_| Ok(serde_json::Value::Null)).into_target();
        assert_eq!(p.estimate_improvement(t.as_ref(), "performance"), 0.15);
        assert!(p.techniques("performance").contains("cache_optimization"));
        assert!(p.rebuild(&t, "performance").unwrap().is_none());
    }
}
