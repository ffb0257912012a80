use std::sync::Arc;
use aura_gateway::error::ERROR_KIND_HEADER;
use aura_gateway::{FixedImprovement, FnTarget, Gateway, GrpcGateway, Invoker, MonitorConfig, SystemRegistry};
use aura_proto::gateway::adaptive_gateway_client::AdaptiveGatewayClient;
use aura_proto::gateway::{InvocationStatus, InvokeRequest, MetricsRequest, OptimizeRequest};
use serde_json::{json, Value};
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::{Channel, Server};
use tonic::Code;

fn calc_registry() -> Arc<SystemRegistry> {
    let registry = Arc::new(SystemRegistry::new(MonitorConfig { enabled: false, ..Default::default() }));
    let calc = FnTarget::new("Calc")
        .operation("double", |a| Ok(json!(a.arg(0, "x")?.as_i64().ok_or("x must be an integer")? * 2)))
        .operation("upper", |a| Ok(json!(a.arg(0, "s")?.as_str().ok_or("s must be a string")?.to_uppercase())))
        .attribute("precision")
        .into_target();
    registry.integrate("sys", calc, Arc::new(FixedImprovement::default())).unwrap();
    registry
}

async fn serve(registry: Arc<SystemRegistry>) -> AdaptiveGatewayClient<Channel> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let gateway = Arc::new(Gateway::new(registry, Invoker::default(), 64));
    tokio::spawn(Server::builder().add_service(GrpcGateway::new(gateway).into_server()).serve_with_incoming(TcpListenerStream::new(listener)));
    AdaptiveGatewayClient::connect(format!("http://{addr}")).await.unwrap()
}

fn invoke(op: &str, args: &str) -> InvokeRequest {
    InvokeRequest { system_name: "sys".into(), operation_name: op.into(), args_json: args.into(), kwargs_json: String::new() }
}

async fn metrics(client: &mut AdaptiveGatewayClient<Channel>) -> Value {
    let resp = client.get_metrics(MetricsRequest { system_name: "sys".into() }).await.unwrap().into_inner();
    serde_json::from_str(&resp.metrics_json).unwrap()
}

#[tokio::test]
async fn dispatches_named_operations() {
    let mut client = serve(calc_registry()).await;
    let resp = client.invoke(invoke("double", "[21]")).await.unwrap().into_inner();
    assert_eq!(resp.result_json, "42");
    assert_eq!(resp.status, InvocationStatus::Executed as i32);
    let resp = client.invoke(InvokeRequest { kwargs_json: r#"{"s":"abc"}"#.into(), ..invoke("upper", "") }).await.unwrap().into_inner();
    assert_eq!(resp.result_json, "\"ABC\"");

    let status = client.invoke(invoke("triple", "[1]")).await.unwrap_err();
    assert_eq!(status.code(), Code::Unimplemented);
    assert_eq!(status.metadata().get(ERROR_KIND_HEADER).and_then(|v| v.to_str().ok()), Some("unknown_operation"));
    let status = client.invoke(invoke("precision", "")).await.unwrap_err();
    assert_eq!(status.code(), Code::Unimplemented);

    let m = metrics(&mut client).await;
    assert_eq!(m["operation_metrics"]["double"]["call_count"], 1);
    assert_eq!(m["operation_metrics"]["upper"]["call_count"], 1);
    assert!(m["operation_metrics"].get("triple").is_none());
    assert_eq!(m["status"], "ACTIVE");
}

#[tokio::test]
async fn operation_errors_and_bad_input() {
    let mut client = serve(calc_registry()).await;
    let status = client.invoke(invoke("double", r#"["x"]"#)).await.unwrap_err();
    assert_eq!(status.code(), Code::Internal);
    assert!(status.message().contains("x must be an integer"));
    let status = client.invoke(invoke("double", "21")).await.unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);
    let status = client.invoke(InvokeRequest { system_name: "ghost".into(), ..invoke("double", "[1]") }).await.unwrap_err();
    assert_eq!(status.code(), Code::NotFound);
    assert_eq!(status.metadata().get(ERROR_KIND_HEADER).and_then(|v| v.to_str().ok()), Some("not_found"));
    let m = metrics(&mut client).await;
    assert_eq!(m["operation_metrics"]["double"]["call_count"], 0);
    assert_eq!(m["operation_metrics"]["double"]["error_count"], 1);
}

#[tokio::test]
async fn optimize_appends_history() {
    let mut client = serve(calc_registry()).await;
    let resp = client.optimize(OptimizeRequest { system_name: "sys".into(), target_hint: "performance".into() }).await.unwrap().into_inner();
    assert_eq!(resp.message, "system optimized for: performance");
    let m = metrics(&mut client).await;
    let history = m["optimization_history"].as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["target_label"], "performance");
    assert_eq!(history[0]["improvement_estimate"], 0.15);
    assert_eq!(m["total_optimizations"], 1);
    assert_eq!(m["status"], "OPTIMIZED");

    client.optimize(OptimizeRequest { system_name: "sys".into(), target_hint: String::new() }).await.unwrap();
    let m = metrics(&mut client).await;
    assert_eq!(m["optimization_history"][1]["target_label"], "performance");
    assert_eq!(m["total_optimizations"], 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_invocations_are_all_counted() {
    let client = serve(calc_registry()).await;
    let handles: Vec<_> = (0..50).map(|i| {
        let mut c = client.clone();
        tokio::spawn(async move { c.invoke(invoke("double", &format!("[{i}]"))).await })
    }).collect();
    for (i, h) in handles.into_iter().enumerate() {
        let resp = h.await.unwrap().unwrap().into_inner();
        assert_eq!(resp.result_json, (i * 2).to_string());
    }
    let mut client = client;
    let m = metrics(&mut client).await;
    let double = &m["operation_metrics"]["double"];
    assert_eq!(double["call_count"], 50);
    let (total, avg) = (double["total_time"].as_f64().unwrap(), double["avg_time"].as_f64().unwrap());
    assert!((avg - total / 50.0).abs() < 1e-6);
}
