//! Error types shared by the dispatcher, registries and transports.

use crate::jsonrpc::types::ErrorObject;

/// Result type for RPC operations
pub type RpcResult<T> = Result<T, RpcError>;

/// RPC error types
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("RPC error [{code}]: {message}{}", details_suffix(.details))]
    Rpc {
        code: i32,
        message: String,
        details: Option<String>,
    },

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Method name collision on '{method}': {existing} is already registered, refusing {incoming}")]
    MethodCollision {
        method: String,
        existing: String,
        incoming: String,
    },

    #[error("Timeout")]
    Timeout,

    #[error("Transport closed")]
    TransportClosed,

    #[error("Call dropped before it was answered")]
    Abandoned,
}

impl From<ErrorObject> for RpcError {
    fn from(error: ErrorObject) -> Self {
        RpcError::Rpc {
            code: error.code,
            message: error.message,
            details: error.details,
        }
    }
}

fn details_suffix(details: &Option<String>) -> String {
    details
        .as_deref()
        .map(|details| format!(": {}", details))
        .unwrap_or_default()
}
