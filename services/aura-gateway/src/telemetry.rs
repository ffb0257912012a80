//! OpenTelemetry instruments for the gateway, exported through aura-core's Prometheus registry.

use std::time::Duration;
use once_cell::sync::Lazy;
use opentelemetry::{KeyValue, metrics::{Counter, Histogram, Meter, Unit}};

pub struct GatewayMetrics {
    pub invocations_total: Counter<u64>,
    pub invocation_latency_ms: Histogram<f64>,
    pub optimizations_total: Counter<u64>,
    pub monitor_cycles_total: Counter<u64>,
}

static GATEWAY_METER: Lazy<Meter> = Lazy::new(|| opentelemetry::global::meter("aura_gateway"));

pub static GATEWAY_METRICS: Lazy<GatewayMetrics> = Lazy::new(|| {
    GatewayMetrics {
        invocations_total: GATEWAY_METER.u64_counter("aura_gateway_invocations_total")
            .with_description("Invocations by system, operation and outcome")
            .init(),
        invocation_latency_ms: GATEWAY_METER.f64_histogram("aura_gateway_invocation_latency_ms")
            .with_description("Execution time of successful invocations (ms)")
            .with_unit(Unit::new("ms"))
            .init(),
        optimizations_total: GATEWAY_METER.u64_counter("aura_gateway_optimizations_total")
            .with_description("Optimization events appended to ledgers")
            .init(),
        monitor_cycles_total: GATEWAY_METER.u64_counter("aura_gateway_monitor_cycles_total")
            .with_description("Background monitor check cycles by result")
            .init(),
    }
});

pub fn record_invocation(system: &str, operation: &str, outcome: &'static str, elapsed: Option<Duration>) {
    let attrs = [KeyValue::new("system", system.to_string()), KeyValue::new("operation", operation.to_string()), KeyValue::new("outcome", outcome)];
    GATEWAY_METRICS.invocations_total.add(1, &attrs);
    if let Some(d) = elapsed { GATEWAY_METRICS.invocation_latency_ms.record(d.as_secs_f64() * 1000.0, &attrs[..2]); }
}

pub fn record_optimization(system: &str, trigger: &'static str) {
    GATEWAY_METRICS.optimizations_total.add(1, &[KeyValue::new("system", system.to_string()), KeyValue::new("trigger", trigger)]);
}

pub fn record_monitor_cycle(system: &str, result: &'static str) {
    GATEWAY_METRICS.monitor_cycles_total.add(1, &[KeyValue::new("system", system.to_string()), KeyValue::new("result", result)]);
}
