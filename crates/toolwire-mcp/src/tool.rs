//! A tool discovered on an MCP server, callable through its connection.

use crate::client::McpClient;
use std::sync::Arc;
use std::time::Duration;
use toolwire_core::{ContentBlock, ToolCall, ToolResult, ToolwireResult};

/// Replace every character that is not ASCII alphanumeric or `_` with `_`.
pub fn sanitize_tool_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// The process-wide name of a server's tool: `server__sanitized_tool`.
pub fn registered_tool_name(server_name: &str, tool_name: &str) -> String {
    format!("{server_name}__{}", sanitize_tool_name(tool_name))
}

/// An MCP tool bound to the connection of the server that declared it.
pub struct DiscoveredTool {
    name: String,
    server_tool_name: String,
    description: String,
    input_schema: serde_json::Value,
    server_name: String,
    timeout: Duration,
    trust: bool,
    client: Arc<McpClient>,
}

impl DiscoveredTool {
    pub fn new(
        server_name: impl Into<String>,
        server_tool_name: impl Into<String>,
        description: impl Into<String>,
        input_schema: serde_json::Value,
        timeout: Duration,
        trust: bool,
        client: Arc<McpClient>,
    ) -> Self {
        let server_name = server_name.into();
        let server_tool_name = server_tool_name.into();
        Self {
            name: registered_tool_name(&server_name, &server_tool_name),
            server_tool_name,
            description: description.into(),
            input_schema,
            server_name,
            timeout,
            trust,
            client,
        }
    }

    /// Registered, server-prefixed name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name the server knows the tool by.
    pub fn server_tool_name(&self) -> &str {
        &self.server_tool_name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn input_schema(&self) -> &serde_json::Value {
        &self.input_schema
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_trusted(&self) -> bool {
        self.trust
    }

    /// Invoke the tool on its server via `tools/call`.
    pub async fn call(&self, call: ToolCall) -> ToolwireResult<ToolResult> {
        let result = self
            .client
            .call_tool(&self.server_tool_name, call.arguments, self.timeout)
            .await?;

        let blocks = result
            .content
            .into_iter()
            .map(|c| {
                let text = (c.content_type == "text").then_some(c.text);
                ContentBlock {
                    kind: c.content_type,
                    text,
                }
            })
            .collect();

        Ok(ToolResult::new(call.id, &self.server_name, blocks, result.is_error))
    }
}

impl std::fmt::Debug for DiscoveredTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveredTool")
            .field("name", &self.name)
            .field("server_name", &self.server_name)
            .field("timeout", &self.timeout)
            .field("trust", &self.trust)
            .finish_non_exhaustive()
    }
}
