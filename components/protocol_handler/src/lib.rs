//! Request routing and domain registry for the heapwatch agent
//!
//! Incoming requests name their target as `"Domain.method"`. The
//! [`ProtocolHandler`] looks up the registered [`DomainHandler`] for the
//! domain part and hands it the method part together with the params.

use async_trait::async_trait;
use dashmap::DashMap;
use protocol_types::{AgentRequest, AgentResponse, RpcError};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Trait that all domain handlers must implement
///
/// A domain groups related methods (e.g. `"Memory"`). Each handler is
/// responsible for the methods within its domain.
#[async_trait]
pub trait DomainHandler: Send + Sync {
    /// Returns the name of this domain (e.g. "Memory")
    fn name(&self) -> &str;

    /// Handle a method call for this domain
    ///
    /// # Arguments
    /// * `method` - The method name without the domain prefix (e.g. "collectStats")
    /// * `params` - Optional parameters for the method
    async fn handle_method(&self, method: &str, params: Option<Value>) -> Result<Value, RpcError>;
}

/// Routes requests to the registered domain handlers
pub struct ProtocolHandler {
    /// Registry of domain handlers, keyed by domain name
    domains: Arc<DashMap<String, Arc<dyn DomainHandler>>>,
}

impl ProtocolHandler {
    /// Create a new ProtocolHandler with no domains registered
    ///
    /// # Example
    /// ```
    /// use protocol_handler::ProtocolHandler;
    ///
    /// let handler = ProtocolHandler::new();
    /// assert!(handler.domain_names().is_empty());
    /// ```
    pub fn new() -> Self {
        Self {
            domains: Arc::new(DashMap::new()),
        }
    }

    /// Register a domain handler, replacing any handler with the same name
    pub fn register_domain(&self, handler: Arc<dyn DomainHandler>) {
        let name = handler.name().to_string();
        debug!("Registering domain handler: {}", name);
        self.domains.insert(name, handler);
    }

    /// Unregister a domain handler, returning it if it was registered
    pub fn unregister_domain(&self, domain_name: &str) -> Option<Arc<dyn DomainHandler>> {
        debug!("Unregistering domain handler: {}", domain_name);
        self.domains.remove(domain_name).map(|(_, v)| v)
    }

    /// Names of all registered domains, sorted
    pub fn domain_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.domains.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Handle a raw JSON request and produce a JSON response
    ///
    /// Never fails: parse and routing problems are reported inside the
    /// response's `error` object.
    ///
    /// # Example
    /// ```ignore
    /// let response = handler.handle_message(r#"{"id": 1, "method": "Memory.collectStats"}"#).await;
    /// ```
    pub async fn handle_message(&self, message: &str) -> String {
        let request = match self.parse_request(message) {
            Ok(req) => req,
            Err(error) => {
                return self.encode(AgentResponse::failure(None, error));
            }
        };

        let response = match self.route_request(&request).await {
            Ok(result) => AgentResponse::success(request.id, result),
            Err(error) => AgentResponse::failure(Some(request.id), error),
        };
        self.encode(response)
    }

    /// Call `"Domain.method"` directly, bypassing JSON encoding of the request
    pub async fn dispatch(&self, method: &str, params: Option<Value>) -> Result<Value, RpcError> {
        let (domain_name, method_name) = self.parse_method(method)?;

        let handler = self
            .domains
            .get(domain_name)
            .ok_or_else(|| {
                warn!("Domain not found: {}", domain_name);
                RpcError::method_not_found(method)
            })?
            .clone();

        handler.handle_method(method_name, params).await
    }

    fn parse_request(&self, message: &str) -> Result<AgentRequest, RpcError> {
        // Distinguish malformed JSON from well-formed JSON of the wrong shape
        let _json_check: Value = serde_json::from_str(message).map_err(|e| {
            error!("Invalid JSON: {}", e);
            RpcError::parse_error()
        })?;

        serde_json::from_str::<AgentRequest>(message).map_err(|e| {
            error!("Invalid request structure: {}", e);
            RpcError::invalid_request()
        })
    }

    async fn route_request(&self, request: &AgentRequest) -> Result<Value, RpcError> {
        if request.method.is_empty() {
            warn!("Request missing method field");
            return Err(RpcError::invalid_request());
        }

        debug!("Routing request {} to {}", request.id, request.method);
        self.dispatch(&request.method, request.params.clone()).await
    }

    /// Split "Domain.method" into its two halves
    fn parse_method<'a>(&self, method: &'a str) -> Result<(&'a str, &'a str), RpcError> {
        match method.split_once('.') {
            Some((domain, name)) if !domain.is_empty() && !name.is_empty() => Ok((domain, name)),
            _ => {
                warn!("Invalid method format (expected Domain.method): {}", method);
                Err(RpcError::invalid_request())
            }
        }
    }

    fn encode(&self, response: AgentResponse) -> String {
        serde_json::to_string(&response).unwrap_or_else(|e| {
            error!("Failed to serialize response: {}", e);
            // Minimal hand-built fallback so the caller always gets JSON
            format!(
                r#"{{"id":{},"error":{{"code":-32603,"message":"Internal error"}}}}"#,
                response.id.map_or_else(|| "null".to_string(), |id| id.to_string())
            )
        })
    }
}

impl Default for ProtocolHandler {
    fn default() -> Self {
        Self::new()
    }
}
