//! Aura gateway: dynamic dispatch of named operations on registered targets,
//! with per-operation instrumentation, an optimization ledger and a background
//! maintenance monitor.

use std::sync::Arc;
use anyhow::Result;
use tonic::transport::Server;
use tracing::{info, warn};

pub mod capability;
pub mod config;
pub mod error;
pub mod gateway;
pub mod grpc;
pub mod invoker;
pub mod ledger;
pub mod metrics;
pub mod monitor;
pub mod policy;
pub mod registry;
pub mod sample;
pub mod system;
pub mod target;
pub mod telemetry;

pub use capability::{discover, Capability, CapabilityTable};
pub use config::GatewayConfig;
pub use error::{BoxError, GatewayError};
pub use gateway::{Gateway, InvokeOutcome, MetricsReport, OptimizeReport};
pub use grpc::GrpcGateway;
pub use invoker::{Invocation, Invoker};
pub use ledger::{OptimizationEvent, OptimizationLedger, Trigger};
pub use metrics::{MetricsStore, OperationMetrics};
pub use monitor::{Monitor, MonitorConfig};
pub use policy::{FixedImprovement, OptimizationConfig, OptimizationPolicy};
pub use registry::SystemRegistry;
pub use sample::DataProcessor;
pub use system::{Binding, OptimizationOutcome, System};
pub use target::{CallArgs, Concurrency, FnTarget, Member, Target};

/// Serve the sample target over gRPC until Ctrl-C, then drain.
pub async fn run(cfg: GatewayConfig) -> Result<()> {
    aura_core::init_tracing(&cfg.service_name, &cfg.log_level)?;
    aura_core::init_metrics()?;
    let mut lifecycle = aura_core::ServiceLifecycle::new();
    aura_core::set_status_field("schema_version", serde_json::json!(aura_proto::SCHEMA_VERSION));
    aura_core::start_health_server(cfg.health_port).await?;

    lifecycle.advance();
    let registry = Arc::new(SystemRegistry::new(cfg.monitor.clone()));
    registry.integrate(&cfg.system_name, DataProcessor::new().into_target(), Arc::new(FixedImprovement::from(&cfg.optimization)))?;
    aura_core::set_status_field("systems", serde_json::json!(registry.names()));
    let gateway = Arc::new(Gateway::new(registry.clone(), Invoker::new(cfg.invoke_timeout()), cfg.max_in_flight));
    let addr = cfg.listen_addr()?;

    lifecycle.advance();
    info!(%addr, system = %cfg.system_name, timeout_ms = cfg.invoke_timeout_ms, "grpc_listening");
    let served = Server::builder()
        .concurrency_limit_per_connection(cfg.max_in_flight.max(1))
        .add_service(GrpcGateway::new(gateway).into_server())
        .serve_with_shutdown(addr, shutdown_signal())
        .await;

    lifecycle.advance();
    registry.shutdown().await;
    info!(phases = ?lifecycle.durations(), "shutdown_complete");
    aura_core::shutdown_tracer();
    served?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await { warn!(error = %e, "ctrl_c handler failed; shutting down"); }
    info!("shutdown_requested");
}
