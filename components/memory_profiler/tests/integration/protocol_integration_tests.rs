//! Integration tests for the Memory domain
//!
//! These tests verify that MemoryDomain integrates correctly with the
//! protocol_handler routing system.

use memory_profiler::mock_host::{
    mock_source, site, CountingReclaimer, ScriptedAccounting, ScriptedTracer,
};
use memory_profiler::{HostError, MemoryDomain, MemoryProfiler, ProfilerConfig};
use protocol_handler::ProtocolHandler;
use serde_json::{json, Value};
use std::sync::Arc;

const MB: u64 = 1024 * 1024;

struct Harness {
    handler: ProtocolHandler,
    tracer: Arc<ScriptedTracer>,
    profiler: Arc<MemoryProfiler>,
}

fn harness(rss: &[u64]) -> Harness {
    let tracer = Arc::new(ScriptedTracer::new(vec![
        site("src/cache.rs:42", 6 * MB, 120),
        site("src/parser.rs:7", 2 * MB, 9),
        site("src/main.rs:3", MB, 1),
    ]));
    let source = mock_source(
        Arc::new(ScriptedAccounting::with_rss(rss)),
        tracer.clone(),
        Arc::new(CountingReclaimer::new(17)),
    );
    let profiler = Arc::new(MemoryProfiler::new(
        ProfilerConfig::new(10).unwrap(),
        source,
    ));

    let handler = ProtocolHandler::new();
    handler.register_domain(Arc::new(MemoryDomain::new(profiler.clone())));

    Harness {
        handler,
        tracer,
        profiler,
    }
}

async fn call(handler: &ProtocolHandler, id: u64, method: &str, params: Option<Value>) -> Value {
    let mut request = json!({ "id": id, "method": method });
    if let Some(params) = params {
        request["params"] = params;
    }
    let response = handler.handle_message(&request.to_string()).await;
    serde_json::from_str(&response).unwrap()
}

#[tokio::test]
async fn test_memory_domain_registration() {
    let h = harness(&[MB]);
    assert_eq!(h.handler.domain_names(), vec!["Memory".to_string()]);

    let response = call(&h.handler, 1, "Memory.enable", None).await;
    assert_eq!(response["id"], 1);
    assert!(response["result"].is_object());
    assert!(response["error"].is_null());
    assert!(h.profiler.is_running());
}

#[tokio::test]
async fn test_collect_stats_then_history() {
    let h = harness(&[MB, 2 * MB, 3 * MB]);
    for id in 0..3 {
        let response = call(&h.handler, id, "Memory.collectStats", None).await;
        assert!(response["result"]["rss"].is_u64());
    }

    let response = call(&h.handler, 10, "Memory.getHistory", None).await;
    let samples = response["result"]["samples"].as_array().unwrap();
    assert_eq!(samples.len(), 3);
    assert_eq!(samples[2]["rss"], 3 * MB);
}

#[tokio::test]
async fn test_top_consumers_over_the_wire() {
    let h = harness(&[MB]);
    let response = call(&h.handler, 2, "Memory.getTopConsumers", Some(json!({"limit": 2}))).await;

    assert_eq!(
        response["result"],
        json!([
            {"rank": 1, "siteLabel": "src/cache.rs:42", "sizeMB": 6.0, "count": 120},
            {"rank": 2, "siteLabel": "src/parser.rs:7", "sizeMB": 2.0, "count": 9}
        ])
    );
}

#[tokio::test]
async fn test_top_consumers_failure_over_the_wire() {
    let h = harness(&[MB]);
    h.tracer.fail_with(HostError::SnapshotFailed("tracer detached".to_string()));

    let response = call(&h.handler, 3, "Memory.getTopConsumers", None).await;
    assert!(response["error"].is_null());
    let result = response["result"].as_array().unwrap();
    assert_eq!(result.len(), 1);
    assert!(result[0]["error"].as_str().unwrap().contains("tracer detached"));
}

#[tokio::test]
async fn test_invalid_limit_is_invalid_params() {
    let h = harness(&[MB]);
    let response = call(&h.handler, 4, "Memory.getTopConsumers", Some(json!({"limit": "ten"}))).await;
    assert_eq!(response["error"]["code"], -32602);
}

#[tokio::test]
async fn test_force_collection_over_the_wire() {
    let h = harness(&[20 * MB, 15 * MB]);
    let response = call(&h.handler, 5, "Memory.forceCollection", None).await;

    assert_eq!(
        response["result"],
        json!({
            "objectsCollected": 17,
            "memoryFreedMB": 5.0,
            "beforeRssMB": 20.0,
            "afterRssMB": 15.0
        })
    );
    assert_eq!(h.profiler.history_len(), 2);
}

#[tokio::test]
async fn test_detect_leak_lifecycle() {
    let h = harness(&[MB]);
    let response = call(&h.handler, 6, "Memory.detectLeak", None).await;
    assert_eq!(response["result"]["status"], "insufficient_data");

    for id in 0..5 {
        call(&h.handler, 100 + id, "Memory.collectStats", None).await;
    }
    let response = call(&h.handler, 7, "Memory.detectLeak", None).await;
    assert_eq!(response["result"]["status"], "analyzed");
    assert_eq!(response["result"]["isLeakDetected"], false);
    assert_eq!(response["result"]["totalGrowthMB"], 0.0);
}

#[tokio::test]
async fn test_status_tracks_capacity() {
    let h = harness(&[MB]);
    for id in 0..15 {
        call(&h.handler, id, "Memory.collectStats", None).await;
    }
    let response = call(&h.handler, 99, "Memory.getStatus", None).await;
    assert_eq!(
        response["result"],
        json!({"running": false, "samples": 10, "capacity": 10})
    );
}

#[tokio::test]
async fn test_unknown_memory_method() {
    let h = harness(&[MB]);
    let response = call(&h.handler, 8, "Memory.takeHeapSnapshot", None).await;
    assert_eq!(response["error"]["code"], -32601);
}

#[tokio::test]
async fn test_concurrent_requests() {
    let h = Arc::new(harness(&[MB]));
    let mut tasks = Vec::new();
    for id in 0..20u64 {
        let h = h.clone();
        tasks.push(tokio::spawn(async move {
            call(&h.handler, id, "Memory.collectStats", None).await
        }));
    }
    for task in tasks {
        let response = task.await.unwrap();
        assert!(response["result"].is_object());
    }
    assert_eq!(h.profiler.history_len(), 10);
}
