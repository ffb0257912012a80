//! tonic binding of [`Gateway`] to `aura.gateway.AdaptiveGateway`.

use std::sync::Arc;
use async_trait::async_trait;
use aura_proto::gateway::adaptive_gateway_server::{AdaptiveGateway, AdaptiveGatewayServer};
use aura_proto::gateway::{InvocationStatus, InvokeRequest, InvokeResponse, MetricsRequest, MetricsResponse, OptimizeRequest, OptimizeResponse};
use tonic::{Request, Response, Status};
use tracing::instrument;
use crate::gateway::Gateway;
use crate::target::CallArgs;

#[derive(Clone)]
pub struct GrpcGateway {
    gateway: Arc<Gateway>,
}

impl GrpcGateway {
    pub fn new(gateway: Arc<Gateway>) -> Self { Self { gateway } }
    pub fn into_server(self) -> AdaptiveGatewayServer<Self> { AdaptiveGatewayServer::new(self) }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, Status> {
    serde_json::to_string(value).map_err(|e| Status::internal(format!("encode error: {e}")))
}

#[async_trait]
impl AdaptiveGateway for GrpcGateway {
    #[instrument(skip(self, request), fields(system = %request.get_ref().system_name, operation = %request.get_ref().operation_name))]
    async fn invoke(&self, request: Request<InvokeRequest>) -> Result<Response<InvokeResponse>, Status> {
        let req = request.into_inner();
        let args = CallArgs::decode(&req.args_json, &req.kwargs_json)?;
        let out = self.gateway.invoke(&req.system_name, &req.operation_name, args).await?;
        Ok(Response::new(InvokeResponse {
            result_json: to_json(&out.value)?,
            status: InvocationStatus::Executed as i32,
            notes: format!("executed on {} in {:.3} ms", out.binding, out.elapsed.as_secs_f64() * 1000.0),
        }))
    }

    #[instrument(skip(self, request), fields(system = %request.get_ref().system_name, hint = %request.get_ref().target_hint))]
    async fn optimize(&self, request: Request<OptimizeRequest>) -> Result<Response<OptimizeResponse>, Status> {
        let req = request.into_inner();
        let report = self.gateway.optimize(&req.system_name, &req.target_hint)?;
        Ok(Response::new(OptimizeResponse { message: report.message, before_id: report.before_id, after_id: report.after_id }))
    }

    #[instrument(skip(self, request), fields(system = %request.get_ref().system_name))]
    async fn get_metrics(&self, request: Request<MetricsRequest>) -> Result<Response<MetricsResponse>, Status> {
        let req = request.into_inner();
        let report = self.gateway.metrics(&req.system_name).map_err(Status::from)?;
        Ok(Response::new(MetricsResponse { metrics_json: to_json(&report)? }))
    }
}
