use std::net::SocketAddr;
use std::time::Duration;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use crate::monitor::MonitorConfig;
use crate::policy::OptimizationConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub service_name: String,
    /// Name the sample target is registered under.
    pub system_name: String,
    pub listen_addr: String,
    pub health_port: u16,
    pub log_level: String,
    pub worker_threads: usize,
    pub max_in_flight: usize,
    pub invoke_timeout_ms: u64,
    pub monitor: MonitorConfig,
    pub optimization: OptimizationConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            service_name: "aura-gateway".into(),
            system_name: "DynamicProcessor".into(),
            listen_addr: "[::]:50051".into(),
            health_port: 8080,
            log_level: "info".into(),
            worker_threads: 10,
            max_in_flight: 256,
            invoke_timeout_ms: 5_000,
            monitor: MonitorConfig::default(),
            optimization: OptimizationConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Defaults, then `AURA_CONFIG_FILE`, then `AURA__*` environment overrides.
    pub fn load() -> Result<Self> {
        let cfg: Self = aura_core::load_config("aura-gateway")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.invoke_timeout_ms > 0, "invoke_timeout_ms must be positive");
        anyhow::ensure!(self.worker_threads > 0, "worker_threads must be positive");
        self.monitor.validate()?;
        self.listen_addr()?;
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen_addr.parse().with_context(|| format!("invalid listen_addr '{}'", self.listen_addr))
    }

    pub fn invoke_timeout(&self) -> Duration { Duration::from_millis(self.invoke_timeout_ms) }
}
