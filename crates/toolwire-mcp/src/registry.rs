//! Process-wide registries of discovered tools and prompts.
//!
//! Both registries use interior locking so discovery branches running
//! concurrently can register into the same instance.

use crate::prompt::DiscoveredPrompt;
use crate::tool::DiscoveredTool;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use toolwire_core::{ToolCall, ToolResult, ToolwireError, ToolwireResult};
use tracing::{debug, info};

/// Registry of every tool discovered across all servers.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<DiscoveredTool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its server-prefixed name, replacing any previous
    /// tool of the same name.
    pub fn register_tool(&self, tool: Arc<DiscoveredTool>) {
        let name = tool.name().to_string();
        debug!(tool = %name, server = %tool.server_name(), "Registered MCP tool");
        self.tools.write().insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<DiscoveredTool>> {
        self.tools.read().get(name).cloned()
    }

    /// All registered tools, sorted by name.
    pub fn all(&self) -> Vec<Arc<DiscoveredTool>> {
        let mut tools: Vec<_> = self.tools.read().values().cloned().collect();
        tools.sort_by(|a, b| a.name().cmp(b.name()));
        tools
    }

    pub fn tools_by_server(&self, server_name: &str) -> Vec<Arc<DiscoveredTool>> {
        let mut tools: Vec<_> = self
            .tools
            .read()
            .values()
            .filter(|t| t.server_name() == server_name)
            .cloned()
            .collect();
        tools.sort_by(|a, b| a.name().cmp(b.name()));
        tools
    }

    /// Drop every tool owned by `server_name`. Returns how many were removed.
    pub fn remove_by_server(&self, server_name: &str) -> usize {
        let mut tools = self.tools.write();
        let before = tools.len();
        tools.retain(|_, t| t.server_name() != server_name);
        let removed = before - tools.len();
        if removed > 0 {
            info!(server = %server_name, removed, "Removed MCP tools");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }

    /// Execute a tool call against the tool it names.
    pub async fn execute(&self, call: ToolCall) -> ToolwireResult<ToolResult> {
        let tool = self
            .get(&call.name)
            .ok_or_else(|| ToolwireError::Request(format!("Unknown tool: {}", call.name)))?;
        tool.call(call).await
    }
}

/// Registry of every prompt discovered across all servers.
#[derive(Debug, Default)]
pub struct PromptRegistry {
    prompts: RwLock<HashMap<String, DiscoveredPrompt>>,
}

impl PromptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a prompt and return the name it was stored under.
    ///
    /// If another server already owns the name, the prompt is stored as
    /// `serverName_promptName` instead. Re-registering from the same server
    /// replaces the earlier entry.
    pub fn register_prompt(&self, mut prompt: DiscoveredPrompt) -> String {
        let mut prompts = self.prompts.write();
        let clash = prompts
            .get(&prompt.name)
            .is_some_and(|existing| existing.server_name != prompt.server_name);
        if clash {
            let renamed = format!("{}_{}", prompt.server_name, prompt.name);
            debug!(
                prompt = %prompt.name,
                server = %prompt.server_name,
                renamed = %renamed,
                "Prompt name already taken, renaming"
            );
            prompt.name = renamed;
        }
        let name = prompt.name.clone();
        prompts.insert(name.clone(), prompt);
        name
    }

    pub fn get(&self, name: &str) -> Option<DiscoveredPrompt> {
        self.prompts.read().get(name).cloned()
    }

    /// All registered prompts, sorted by name.
    pub fn all(&self) -> Vec<DiscoveredPrompt> {
        let mut prompts: Vec<_> = self.prompts.read().values().cloned().collect();
        prompts.sort_by(|a, b| a.name.cmp(&b.name));
        prompts
    }

    pub fn prompts_by_server(&self, server_name: &str) -> Vec<DiscoveredPrompt> {
        let mut prompts: Vec<_> = self
            .prompts
            .read()
            .values()
            .filter(|p| p.server_name == server_name)
            .cloned()
            .collect();
        prompts.sort_by(|a, b| a.name.cmp(&b.name));
        prompts
    }

    pub fn remove_by_server(&self, server_name: &str) -> usize {
        let mut prompts = self.prompts.write();
        let before = prompts.len();
        prompts.retain(|_, p| p.server_name != server_name);
        before - prompts.len()
    }

    pub fn len(&self) -> usize {
        self.prompts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.read().is_empty()
    }
}
