// Request/response envelope and error codes for the heapwatch agent protocol
//
// Requests name a method as "Domain.method" (e.g. "Memory.collectStats"),
// mirroring the JSON-RPC 2.0 shape.

pub mod errors;

pub use errors::RpcError;

use serde::{Deserialize, Serialize};

/// Request sent to the agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentRequest {
    /// Caller-chosen identifier echoed back in the response
    pub id: u64,
    /// Method name in format "Domain.method"
    pub method: String,
    /// Optional parameters for the method
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl AgentRequest {
    /// Build a request without parameters
    pub fn new(id: u64, method: impl Into<String>) -> Self {
        Self {
            id,
            method: method.into(),
            params: None,
        }
    }

    /// Attach parameters to the request
    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = Some(params);
        self
    }
}

/// Response to an [`AgentRequest`]
///
/// Exactly one of `result` and `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentResponse {
    /// Request ID this response corresponds to. `None` when the request
    /// could not be parsed far enough to read its id.
    pub id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl AgentResponse {
    pub fn success(id: u64, result: serde_json::Value) -> Self {
        Self {
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Option<u64>, error: RpcError) -> Self {
        Self {
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Whether this response carries an error
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
