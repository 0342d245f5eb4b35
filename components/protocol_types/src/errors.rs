// Agent protocol error type
// JSON-RPC 2.0 error codes

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error object carried by a failed [`crate::AgentResponse`]
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[error("RPC error {code}: {message}")]
pub struct RpcError {
    /// Error code (JSON-RPC standard codes)
    pub code: i32,
    /// Human-readable error message
    pub message: String,
    /// Additional error data (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(code: i32, message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    /// Parse error (-32700)
    /// Invalid JSON was received
    pub fn parse_error() -> Self {
        Self::new(-32700, "Parse error")
    }

    /// Invalid request (-32600)
    /// The JSON sent is not a valid request object
    pub fn invalid_request() -> Self {
        Self::new(-32600, "Invalid Request")
    }

    /// Method not found (-32601)
    pub fn method_not_found(method: impl Into<String>) -> Self {
        let method = method.into();
        Self::with_data(
            -32601,
            "Method not found",
            serde_json::json!({ "method": method }),
        )
    }

    /// Invalid params (-32602)
    pub fn invalid_params(details: impl Into<String>) -> Self {
        let details = details.into();
        Self::with_data(
            -32602,
            "Invalid params",
            serde_json::json!({ "details": details }),
        )
    }

    /// Internal error (-32603)
    pub fn internal_error(details: impl Into<String>) -> Self {
        let details = details.into();
        Self::with_data(
            -32603,
            "Internal error",
            serde_json::json!({ "details": details }),
        )
    }
}
