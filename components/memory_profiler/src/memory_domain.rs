//! MemoryDomain implementation
//!
//! Exposes the profiler over the protocol router as the `Memory` domain.

use async_trait::async_trait;
use protocol_handler::DomainHandler;
use protocol_types::RpcError;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use crate::memory_profiler::{MemoryProfiler, DEFAULT_TOP_LIMIT};

/// MemoryDomain routes `Memory.*` requests to a shared profiler
#[derive(Debug, Clone)]
pub struct MemoryDomain {
    profiler: Arc<MemoryProfiler>,
}

impl MemoryDomain {
    pub fn new(profiler: Arc<MemoryProfiler>) -> Self {
        Self { profiler }
    }

    pub fn profiler(&self) -> &Arc<MemoryProfiler> {
        &self.profiler
    }

    fn handle_enable(&self) -> Result<Value, RpcError> {
        debug!("Memory.enable called");
        self.profiler.start();
        Ok(json!({}))
    }

    fn handle_disable(&self) -> Result<Value, RpcError> {
        debug!("Memory.disable called");
        self.profiler.stop();
        Ok(json!({}))
    }

    fn handle_collect_stats(&self) -> Result<Value, RpcError> {
        debug!("Memory.collectStats called");
        to_value(&self.profiler.collect_stats())
    }

    /// A snapshot failure is still a successful response carrying
    /// `[{error, timestamp}]`
    fn handle_get_top_consumers(&self, params: Option<Value>) -> Result<Value, RpcError> {
        debug!("Memory.getTopConsumers called");

        let limit = match params.as_ref().and_then(|p| p.get("limit")) {
            None | Some(Value::Null) => DEFAULT_TOP_LIMIT,
            Some(value) => value
                .as_u64()
                .filter(|limit| *limit >= 1)
                .map(|limit| limit as usize)
                .ok_or_else(|| RpcError::invalid_params("limit must be a positive integer"))?,
        };

        match self.profiler.top_consumers(limit) {
            Ok(entries) => to_value(&entries),
            Err(info) => to_value(&[info]),
        }
    }

    fn handle_detect_leak(&self) -> Result<Value, RpcError> {
        debug!("Memory.detectLeak called");
        to_value(&self.profiler.detect_leak())
    }

    fn handle_force_collection(&self) -> Result<Value, RpcError> {
        debug!("Memory.forceCollection called");
        match self.profiler.force_collection() {
            Ok(result) => to_value(&result),
            Err(info) => to_value(&info),
        }
    }

    fn handle_get_history(&self) -> Result<Value, RpcError> {
        debug!("Memory.getHistory called");
        Ok(json!({ "samples": to_value(&self.profiler.history())? }))
    }

    fn handle_get_status(&self) -> Result<Value, RpcError> {
        debug!("Memory.getStatus called");
        to_value(&self.profiler.status())
    }
}

fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::internal_error(e.to_string()))
}

#[async_trait]
impl DomainHandler for MemoryDomain {
    fn name(&self) -> &str {
        "Memory"
    }

    async fn handle_method(&self, method: &str, params: Option<Value>) -> Result<Value, RpcError> {
        match method {
            "enable" => self.handle_enable(),
            "disable" => self.handle_disable(),
            "collectStats" => self.handle_collect_stats(),
            "getTopConsumers" => self.handle_get_top_consumers(params),
            "detectLeak" => self.handle_detect_leak(),
            "forceCollection" => self.handle_force_collection(),
            "getHistory" => self.handle_get_history(),
            "getStatus" => self.handle_get_status(),
            _ => Err(RpcError::method_not_found(format!("Memory.{}", method))),
        }
    }
}
