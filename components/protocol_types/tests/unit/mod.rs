// Unit tests for the agent protocol envelope

use protocol_types::{AgentRequest, AgentResponse, RpcError};
use serde_json::json;

#[test]
fn test_request_deserialization_without_params() {
    let json_str = r#"{"id":1,"method":"Memory.collectStats"}"#;
    let request: AgentRequest = serde_json::from_str(json_str).unwrap();

    assert_eq!(request.id, 1);
    assert_eq!(request.method, "Memory.collectStats");
    assert!(request.params.is_none());
}

#[test]
fn test_request_with_params() {
    let json_str = r#"{
        "id": 2,
        "method": "Memory.getTopConsumers",
        "params": { "limit": 3 }
    }"#;

    let request: AgentRequest = serde_json::from_str(json_str).unwrap();
    assert_eq!(request.id, 2);
    assert_eq!(request.params.unwrap()["limit"], 3);
}

#[test]
fn test_request_builder_serializes_params() {
    let request = AgentRequest::new(5, "Memory.getTopConsumers").with_params(json!({"limit": 1}));
    let json_str = serde_json::to_string(&request).unwrap();

    assert!(json_str.contains("\"id\":5"));
    assert!(json_str.contains("\"limit\":1"));
}

#[test]
fn test_request_missing_method_is_rejected() {
    let json_str = r#"{"id":1}"#;
    assert!(serde_json::from_str::<AgentRequest>(json_str).is_err());
}

#[test]
fn test_response_roundtrip_keeps_error() {
    let response = AgentResponse::failure(None, RpcError::parse_error());
    let json_str = serde_json::to_string(&response).unwrap();
    let parsed: AgentResponse = serde_json::from_str(&json_str).unwrap();

    assert!(parsed.id.is_none());
    assert_eq!(parsed.error.unwrap().code, -32700);
    assert!(parsed.result.is_none());
}
