use serde::{Deserialize, Serialize};

/// A request to invoke a discovered tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Caller-assigned identifier for this invocation.
    pub id: String,
    /// Registered (server-prefixed) name of the tool.
    pub name: String,
    /// JSON arguments to pass to the tool.
    pub arguments: serde_json::Value,
}

/// One block of tool output as the server returned it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentBlock {
    /// Block type, e.g. `text`, `image`, `resource`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Present for `text` blocks only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: Some(text.into()),
        }
    }
}

/// Outcome of a [`ToolCall`] executed on an MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The ID of the [`ToolCall`] this result corresponds to.
    pub call_id: String,
    /// Server that executed the tool.
    pub server_name: String,
    pub blocks: Vec<ContentBlock>,
    /// The server flagged the output as a tool-level failure.
    pub is_error: bool,
}

impl ToolResult {
    pub fn new(
        call_id: impl Into<String>,
        server_name: impl Into<String>,
        blocks: Vec<ContentBlock>,
        is_error: bool,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            server_name: server_name.into(),
            blocks,
            is_error,
        }
    }

    /// Text blocks joined with newlines. Other block types are skipped.
    pub fn text(&self) -> String {
        self.blocks
            .iter()
            .filter_map(|b| b.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Number of blocks that carry something other than text.
    pub fn non_text_blocks(&self) -> usize {
        self.blocks.iter().filter(|b| b.text.is_none()).count()
    }
}
