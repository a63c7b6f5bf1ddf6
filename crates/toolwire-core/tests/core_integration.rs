#![allow(clippy::unwrap_used, clippy::expect_used)]

use toolwire_core::*;

// ---------------------------------------------------------------------------
// 1. ToolCall -> ToolResult flow (success and error variants)
// ---------------------------------------------------------------------------

#[test]
fn tool_call_to_tool_result_flow() {
    let tool_call = ToolCall {
        id: "call_abc123".to_string(),
        name: "files__read_file".to_string(),
        arguments: serde_json::json!({"path": "/etc/hosts"}),
    };

    let success_result = ToolResult::new(
        &tool_call.id,
        "files",
        vec![ContentBlock::text("127.0.0.1 localhost")],
        false,
    );
    assert_eq!(success_result.call_id, tool_call.id);
    assert_eq!(success_result.text(), "127.0.0.1 localhost");
    assert!(!success_result.is_error);

    let error_result = ToolResult::new(
        &tool_call.id,
        "files",
        vec![ContentBlock::text("permission denied")],
        true,
    );
    assert_eq!(error_result.call_id, tool_call.id);
    assert!(error_result.is_error);

    let json = serde_json::to_string(&tool_call).unwrap();
    let deserialized: ToolCall = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized.name, "files__read_file");
    assert_eq!(
        deserialized.arguments,
        serde_json::json!({"path": "/etc/hosts"})
    );
}

// ---------------------------------------------------------------------------
// 2. Error Display and From impls
// ---------------------------------------------------------------------------

#[test]
fn error_display_and_from_impls() {
    let config_err = ToolwireError::Configuration("no transport".to_string());
    assert_eq!(config_err.to_string(), "Configuration error: no transport");

    let conn_err = ToolwireError::Connection("connection refused".to_string());
    assert_eq!(conn_err.to_string(), "Connection error: connection refused");

    let disc_err = ToolwireError::Discovery("tools/list failed".to_string());
    assert_eq!(disc_err.to_string(), "Discovery error: tools/list failed");

    let empty_err = ToolwireError::NoCapabilities("server 'docs'".to_string());
    assert_eq!(
        empty_err.to_string(),
        "No enabled tools or prompts: server 'docs'"
    );

    let timeout_err = ToolwireError::Timeout("initialize".to_string());
    assert_eq!(timeout_err.to_string(), "Timeout: initialize");

    let request_err = ToolwireError::Request("not connected".to_string());
    assert_eq!(request_err.to_string(), "Request error: not connected");

    let bad_json = serde_json::from_str::<serde_json::Value>("not json");
    let err: ToolwireError = bad_json.unwrap_err().into();
    assert!(err.to_string().starts_with("JSON error:"));

    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "binary missing");
    let err: ToolwireError = io_err.into();
    assert!(err.to_string().starts_with("IO error:"));
}

// ---------------------------------------------------------------------------
// 3. ToolResult roundtrip preserves blocks and error flag
// ---------------------------------------------------------------------------

#[test]
fn tool_result_roundtrip_preserves_blocks() {
    let result = ToolResult::new(
        "id_2",
        "files",
        vec![
            ContentBlock::text("something broke"),
            ContentBlock {
                kind: "resource".to_string(),
                text: None,
            },
        ],
        true,
    );
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["blocks"][0]["type"], "text");
    assert!(json["blocks"][1].get("text").is_none());

    let deser: ToolResult = serde_json::from_value(json).unwrap();
    assert!(deser.is_error);
    assert_eq!(deser.server_name, "files");
    assert_eq!(deser.text(), "something broke");
    assert_eq!(deser.non_text_blocks(), 1);
}
