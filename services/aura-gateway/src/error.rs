use std::time::Duration;
use thiserror::Error;
use tonic::{metadata::{MetadataMap, MetadataValue}, Code, Status};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Metadata key carrying [`GatewayError::kind`] on error responses.
pub const ERROR_KIND_HEADER: &str = "x-aura-error-kind";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("discovery failed for target '{target}': {reason}")]
    Discovery { target: String, reason: String },
    #[error("system '{system}' is not registered")]
    NotFound { system: String },
    #[error("system '{system}' is already registered")]
    AlreadyRegistered { system: String },
    #[error("unknown operation '{operation}'")]
    UnknownOperation { operation: String },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("operation '{operation}' failed: {source}")]
    OperationExecution { operation: String, #[source] source: BoxError },
    #[error("operation '{operation}' timed out after {after:?}")]
    Timeout { operation: String, after: Duration },
    #[error("optimization of '{system}' failed: {source}")]
    Optimization { system: String, #[source] source: BoxError },
}

impl GatewayError {
    /// Stable machine-readable discriminator.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Discovery { .. } => "discovery",
            GatewayError::NotFound { .. } => "not_found",
            GatewayError::AlreadyRegistered { .. } => "already_registered",
            GatewayError::UnknownOperation { .. } => "unknown_operation",
            GatewayError::InvalidArgument(_) => "invalid_argument",
            GatewayError::OperationExecution { .. } => "operation_execution",
            GatewayError::Timeout { .. } => "timeout",
            GatewayError::Optimization { .. } => "optimization",
        }
    }

    pub fn code(&self) -> Code {
        match self {
            GatewayError::Discovery { .. } | GatewayError::Optimization { .. } => Code::FailedPrecondition,
            GatewayError::NotFound { .. } => Code::NotFound,
            GatewayError::AlreadyRegistered { .. } => Code::AlreadyExists,
            GatewayError::UnknownOperation { .. } => Code::Unimplemented,
            GatewayError::InvalidArgument(_) => Code::InvalidArgument,
            GatewayError::OperationExecution { .. } => Code::Internal,
            GatewayError::Timeout { .. } => Code::DeadlineExceeded,
        }
    }
}

impl From<GatewayError> for Status {
    fn from(err: GatewayError) -> Self {
        let mut metadata = MetadataMap::new();
        metadata.insert(ERROR_KIND_HEADER, MetadataValue::from_static(err.kind()));
        Status::with_metadata(err.code(), err.to_string(), metadata)
    }
}
