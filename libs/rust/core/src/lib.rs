//! Core shared utilities for Aura services.

use anyhow::Result;
use tracing::info;
use once_cell::sync::{Lazy, OnceCell};
use parking_lot::RwLock;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{metrics::MeterProvider as SdkMeterProvider, trace as sdktrace, Resource};
use axum::{routing::get, Router, http::{StatusCode, header}, response::IntoResponse};
use prometheus::{Encoder, TextEncoder};
use serde::{Serialize, de::DeserializeOwned};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::{layer::{Layered, SubscriberExt}, util::SubscriberInitExt, EnvFilter, Layer, Registry};

pub mod backoff;
pub mod lifecycle;

pub use backoff::Backoff;
pub use lifecycle::{ServiceLifecycle, ServicePhase};

static OTEL_INIT: OnceCell<()> = OnceCell::new();
static METER_PROVIDER: OnceCell<SdkMeterProvider> = OnceCell::new();
static PROM_REGISTRY: Lazy<prometheus::Registry> = Lazy::new(prometheus::Registry::new);
static STATUS_FIELDS: Lazy<RwLock<serde_json::Map<String, serde_json::Value>>> = Lazy::new(|| RwLock::new(serde_json::Map::new()));
static NODE_LIVENESS: AtomicBool = AtomicBool::new(true);
static NODE_READINESS: AtomicBool = AtomicBool::new(false);

pub fn mark_ready() { NODE_READINESS.store(true, Ordering::SeqCst); }
pub fn clear_ready() { NODE_READINESS.store(false, Ordering::SeqCst); }
pub fn mark_not_live() { NODE_LIVENESS.store(false, Ordering::SeqCst); }
pub fn is_ready() -> bool { NODE_READINESS.load(Ordering::SeqCst) }

/// Publish a field under `/status`. Later writes to the same key replace earlier ones.
pub fn set_status_field(key: &str, value: serde_json::Value) { STATUS_FIELDS.write().insert(key.to_string(), value); }

fn env_flag(name: &str) -> bool { std::env::var(name).ok().map(|v| v=="1" || v.eq_ignore_ascii_case("true")).unwrap_or(false) }

type BaseSubscriber = Layered<EnvFilter, Registry>;

/// Install the global subscriber. `RUST_LOG` wins over `default_level`; an OTLP
/// exporter is attached only when `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
pub fn init_tracing(service: &str, default_level: &str) -> Result<()> {
    OTEL_INIT.get_or_try_init(|| -> Result<()> {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
        let fmt_layer: Box<dyn Layer<BaseSubscriber> + Send + Sync> = if env_flag("AURA_JSON_LOG") {
            tracing_subscriber::fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(false)
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_line_number(true)
                .boxed()
        };
        let otel_layer = match std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
            Ok(endpoint) => Some(tracing_opentelemetry::layer().with_tracer(otlp_tracer(service, &endpoint)?)),
            Err(_) => None,
        };
        tracing_subscriber::registry().with(env_filter).with(fmt_layer).with(otel_layer).try_init()?;
        Ok(())
    })?;
    info!(target: "aura_core", service, "tracing initialized");
    Ok(())
}

fn otlp_tracer(service: &str, endpoint: &str) -> Result<sdktrace::Tracer> {
    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(opentelemetry_otlp::new_exporter().tonic().with_endpoint(endpoint))
        .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
            KeyValue::new("service.name", service.to_string()),
        ])))
        .install_batch(opentelemetry_sdk::runtime::Tokio)?;
    Ok(tracer)
}

pub fn shutdown_tracer() { global::shutdown_tracer_provider(); }

/// Route `opentelemetry::global::meter` instruments into the Prometheus registry
/// served at `/metrics`. Instruments must be created after this call to be exported.
pub fn init_metrics() -> Result<()> {
    METER_PROVIDER.get_or_try_init(|| -> Result<SdkMeterProvider> {
        let exporter = opentelemetry_prometheus::exporter().with_registry(PROM_REGISTRY.clone()).build()?;
        let provider = SdkMeterProvider::builder().with_reader(exporter).build();
        global::set_meter_provider(provider.clone());
        Ok(provider)
    })?;
    Ok(())
}

fn status_body() -> serde_json::Value {
    let mut body = STATUS_FIELDS.read().clone();
    body.insert("live".into(), NODE_LIVENESS.load(Ordering::SeqCst).into());
    body.insert("ready".into(), NODE_READINESS.load(Ordering::SeqCst).into());
    serde_json::Value::Object(body)
}

/// Bind the health server and serve it in the background. Returns the bound
/// address so callers may pass port 0.
pub async fn start_health_server(port: u16) -> Result<SocketAddr> {
    let app = Router::new()
        .route("/live", get(|| async { axum::Json(serde_json::json!({"live": NODE_LIVENESS.load(Ordering::SeqCst)})) }))
        .route("/ready", get(|| async { axum::Json(serde_json::json!({"ready": NODE_READINESS.load(Ordering::SeqCst)})) }))
        .route("/status", get(|| async { axum::Json(status_body()) }))
        .route("/metrics", get(metrics_handler));
    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([0,0,0,0], port))).await?;
    let addr = listener.local_addr()?;
    tracing::info!(?addr, "health server listening");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error=?e, "health server failed");
        }
    });
    Ok(addr)
}

async fn metrics_handler() -> axum::response::Response {
    if METER_PROVIDER.get().is_none() {
        return (StatusCode::SERVICE_UNAVAILABLE, "metrics not initialized").into_response();
    }
    let metric_families = PROM_REGISTRY.gather();
    let mut buf = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&metric_families, &mut buf) {
        return (StatusCode::INTERNAL_SERVER_ERROR, format!("encode error: {e}")).into_response();
    }
    (StatusCode::OK, [(header::CONTENT_TYPE, "text/plain; version=0.0.4")], buf).into_response()
}

/// Layered configuration: serialized `T::default()`, then the optional file named
/// by `AURA_CONFIG_FILE`, then `AURA__*` environment variables (`__` nests).
pub fn load_config<T>(service: &str) -> Result<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    let mut builder = config::Config::builder().add_source(config::Config::try_from(&T::default())?);
    if let Ok(file) = std::env::var("AURA_CONFIG_FILE") {
        builder = builder.add_source(config::File::with_name(&file).required(false));
    }
    builder = builder.add_source(config::Environment::with_prefix("AURA").separator("__").try_parsing(true));
    let cfg: T = builder.build()?.try_deserialize()?;
    tracing::debug!(service, "configuration loaded");
    Ok(cfg)
}
