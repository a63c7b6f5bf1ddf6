//! Shared fixtures for unit tests.

use crate::client::McpClient;
use crate::protocol::{JsonRpcError, PROTOCOL_VERSION};
use crate::transport::{InMemoryTransport, RequestHandler};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Canned server answering `tools/list` and `prompts/list` with fixed payloads.
pub(crate) struct StaticServer {
    pub tools: Result<Value, JsonRpcError>,
    pub prompts: Result<Value, JsonRpcError>,
}

impl StaticServer {
    pub fn new(tools: Value, prompts: Value) -> Self {
        Self {
            tools: Ok(tools),
            prompts: Ok(prompts),
        }
    }
}

#[async_trait]
impl RequestHandler for StaticServer {
    async fn handle(&self, method: &str, params: Option<Value>) -> Result<Value, JsonRpcError> {
        match method {
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {"tools": {}, "prompts": {}},
                "serverInfo": {"name": "static", "version": "1.0"}
            })),
            "tools/list" => self.tools.clone(),
            "prompts/list" => self.prompts.clone(),
            "tools/call" => {
                let name = params.unwrap_or_default()["name"].clone();
                Ok(json!({"content": [{"type": "text", "text": format!("ran {name}")}]}))
            }
            other => Err(JsonRpcError::method_not_found(other)),
        }
    }
}

pub(crate) async fn connect(name: &str, server: StaticServer) -> Arc<McpClient> {
    let transport = Arc::new(InMemoryTransport::new(Arc::new(server)));
    match McpClient::connect(name, transport, Duration::from_secs(5)).await {
        Ok(client) => Arc::new(client),
        Err(e) => panic!("in-memory connect failed: {e}"),
    }
}

pub(crate) async fn empty_client(name: &str) -> Arc<McpClient> {
    connect(name, StaticServer::new(json!({"tools": []}), json!({"prompts": []}))).await
}
