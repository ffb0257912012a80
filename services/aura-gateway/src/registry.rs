//! Process-wide table of registered systems, owned by the bootstrap and handed
//! to the gateway. Also owns the monitors it starts.

use std::collections::HashMap;
use std::sync::Arc;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use crate::error::GatewayError;
use crate::monitor::{Monitor, MonitorConfig};
use crate::policy::OptimizationPolicy;
use crate::system::System;
use crate::target::Target;

pub struct SystemRegistry {
    systems: RwLock<HashMap<String, Arc<System>>>,
    monitor: MonitorConfig,
    shutdown: CancellationToken,
    monitors: Mutex<Vec<JoinHandle<()>>>,
}

impl Default for SystemRegistry { fn default() -> Self { Self::new(MonitorConfig::default()) } }

impl SystemRegistry {
    pub fn new(monitor: MonitorConfig) -> Self {
        Self { systems: RwLock::new(HashMap::new()), monitor, shutdown: CancellationToken::new(), monitors: Mutex::new(Vec::new()) }
    }

    /// Add an already integrated system without starting a monitor for it.
    pub fn register(&self, system: Arc<System>) -> Result<(), GatewayError> {
        let mut systems = self.systems.write();
        if systems.contains_key(system.name()) {
            return Err(GatewayError::AlreadyRegistered { system: system.name().to_string() });
        }
        systems.insert(system.name().to_string(), system);
        Ok(())
    }

    /// Discover, register and start monitoring `target` under `name`.
    /// Must be called from within a tokio runtime when monitoring is enabled.
    pub fn integrate(&self, name: &str, target: Arc<dyn Target>, policy: Arc<dyn OptimizationPolicy>) -> Result<Arc<System>, GatewayError> {
        if self.systems.read().contains_key(name) {
            return Err(GatewayError::AlreadyRegistered { system: name.to_string() });
        }
        let system = System::integrate(name, target, policy)?;
        self.register(system.clone())?;
        if self.monitor.enabled {
            let handle = Monitor::new(system.clone(), self.monitor.clone()).spawn(self.shutdown.child_token());
            self.monitors.lock().push(handle);
        }
        info!(system = name, monitored = self.monitor.enabled, "system_registered");
        Ok(system)
    }

    pub fn get(&self, name: &str) -> Result<Arc<System>, GatewayError> {
        self.systems.read().get(name).cloned().ok_or_else(|| GatewayError::NotFound { system: name.to_string() })
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.systems.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize { self.systems.read().len() }
    pub fn is_empty(&self) -> bool { self.systems.read().is_empty() }
    pub fn monitor_count(&self) -> usize { self.monitors.lock().len() }

    /// Cancel every monitor and wait for them to finish.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handles = std::mem::take(&mut *self.monitors.lock());
        for h in handles {
            if let Err(e) = h.await { warn!(error = %e, "monitor task ended abnormally"); }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::FixedImprovement;
    use crate::target::FnTarget;
    use serde_json::json;

    fn target() -> Arc<dyn Target> { FnTarget::new("T").operation("a", |_| Ok(json!(1))).into_target() }
    fn policy() -> Arc<dyn OptimizationPolicy> { Arc::new(FixedImprovement::default()) }

    #[test]
    fn one_entry_per_name() {
        let reg = SystemRegistry::new(MonitorConfig { enabled: false, ..Default::default() });
        reg.integrate("sys", target(), policy()).unwrap();
        assert!(matches!(reg.integrate("sys", target(), policy()), Err(GatewayError::AlreadyRegistered { .. })));
        let other = System::integrate("sys", target(), policy()).unwrap();
        assert!(reg.register(other).is_err());
        assert_eq!(reg.names(), vec!["sys".to_string()]);
        assert_eq!(reg.monitor_count(), 0);
    }

    #[test]
    fn unknown_system_is_not_found() {
        let reg = SystemRegistry::default();
        assert!(matches!(reg.get("ghost"), Err(GatewayError::NotFound { ref system }) if system == "ghost"));
    }

    #[tokio::test]
    async fn shutdown_joins_monitors() {
        let reg = SystemRegistry::new(MonitorConfig::default());
        reg.integrate("a", target(), policy()).unwrap();
        reg.integrate("b", target(), policy()).unwrap();
        assert_eq!(reg.monitor_count(), 2);
        tokio::time::timeout(std::time::Duration::from_secs(1), reg.shutdown()).await.expect("shutdown hung");
        assert_eq!(reg.monitor_count(), 0);
    }

    #[tokio::test]
    async fn shutdown_does_not_wait_for_a_blocked_probe() {
        let reg = SystemRegistry::new(MonitorConfig::every(std::time::Duration::from_millis(10)));
        let t = FnTarget::new("Hung")
            .operation("a", |_| Ok(json!(1)))
            .probe_with(|| { std::thread::sleep(std::time::Duration::from_secs(3)); Ok(()) })
            .into_target();
        reg.integrate("hung", t, policy()).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let started = std::time::Instant::now();
        reg.shutdown().await;
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
    }
}
