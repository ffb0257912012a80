// Generated protobuf modules via tonic's include_proto! macro.
// Usage example:
//   use aura_proto::gateway::adaptive_gateway_server::AdaptiveGatewayServer;
//   use aura_proto::gateway::{InvokeRequest, InvokeResponse};

pub mod gateway { tonic::include_proto!("aura.gateway"); }

/// SHA-256 over every `.proto` file compiled into this crate.
pub const SCHEMA_VERSION: &str = env!("PROTO_SCHEMA_VERSION");

pub use gateway::*;
