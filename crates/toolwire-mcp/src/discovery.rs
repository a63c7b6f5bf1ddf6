//! Capability discovery: list a connected server's tools and prompts and
//! turn them into registrable capabilities.

use crate::client::McpClient;
use crate::config::ServerConfig;
use crate::prompt::DiscoveredPrompt;
use crate::tool::DiscoveredTool;
use std::sync::Arc;
use toolwire_core::{ToolwireError, ToolwireResult};
use tracing::{debug, warn};

/// Decides which of a server's tools are exposed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolFilter {
    include: Option<Vec<String>>,
    exclude: Vec<String>,
}

impl ToolFilter {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            include: config.include_tools.clone(),
            exclude: config.exclude_tools.clone().unwrap_or_default(),
        }
    }

    /// Exclusion is an exact match and always wins. Otherwise a tool is
    /// enabled when no include list is set, when the list names it exactly,
    /// or when an entry has the form `name(...)`.
    pub fn is_enabled(&self, tool_name: &str) -> bool {
        if self.exclude.iter().any(|e| e == tool_name) {
            return false;
        }
        let Some(include) = &self.include else {
            return true;
        };
        include.iter().any(|entry| {
            entry == tool_name
                || entry
                    .strip_prefix(tool_name)
                    .is_some_and(|rest| rest.starts_with('('))
        })
    }
}

/// Everything usable one server exposed.
#[derive(Debug, Default)]
pub struct DiscoveredCapabilities {
    pub tools: Vec<DiscoveredTool>,
    pub prompts: Vec<DiscoveredPrompt>,
}

impl DiscoveredCapabilities {
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty() && self.prompts.is_empty()
    }
}

/// List and filter the tools of a connected server.
pub async fn discover_tools(
    server_name: &str,
    config: &ServerConfig,
    client: &Arc<McpClient>,
) -> ToolwireResult<Vec<DiscoveredTool>> {
    let filter = ToolFilter::from_config(config);
    let timeout = config.effective_timeout();

    let mut tools = Vec::new();
    for def in client.list_tools().await? {
        let Some(name) = def.name else {
            warn!(server = %server_name, "Skipping MCP tool declaration without a name");
            continue;
        };
        if !filter.is_enabled(&name) {
            debug!(server = %server_name, tool = %name, "MCP tool disabled by filter");
            continue;
        }
        tools.push(DiscoveredTool::new(
            server_name,
            name,
            def.description.unwrap_or_default(),
            def.input_schema,
            timeout,
            config.trust,
            client.clone(),
        ));
    }
    Ok(tools)
}

/// List the prompts of a connected server, dropping entries without a template.
pub async fn discover_prompts(
    server_name: &str,
    client: &McpClient,
) -> ToolwireResult<Vec<DiscoveredPrompt>> {
    let defs = client.list_prompts().await?;
    let total = defs.len();
    let prompts: Vec<_> = defs
        .iter()
        .filter_map(|def| DiscoveredPrompt::from_def(server_name, def))
        .collect();
    if prompts.len() < total {
        debug!(
            server = %server_name,
            discarded = total - prompts.len(),
            "Discarded MCP prompts without a name or template"
        );
    }
    Ok(prompts)
}

/// Discover tools, then prompts. One phase failing does not stop the other.
///
/// Fails with [`ToolwireError::Discovery`] when both listings fail, and with
/// [`ToolwireError::NoCapabilities`] when nothing usable remains.
pub async fn discover(
    server_name: &str,
    config: &ServerConfig,
    client: &Arc<McpClient>,
) -> ToolwireResult<DiscoveredCapabilities> {
    let tools = discover_tools(server_name, config, client).await;
    if let Err(e) = &tools {
        warn!(server = %server_name, error = %e, "Tool discovery failed");
    }

    let prompts = discover_prompts(server_name, client).await;
    if let Err(e) = &prompts {
        debug!(server = %server_name, error = %e, "Prompt discovery failed");
    }

    let capabilities = match (tools, prompts) {
        (Err(tools_err), Err(prompts_err)) => {
            return Err(ToolwireError::Discovery(format!(
                "server '{server_name}': tools/list failed ({tools_err}); prompts/list failed ({prompts_err})"
            )));
        }
        (tools, prompts) => DiscoveredCapabilities {
            tools: tools.unwrap_or_default(),
            prompts: prompts.unwrap_or_default(),
        },
    };

    if capabilities.is_empty() {
        return Err(ToolwireError::NoCapabilities(format!(
            "server '{server_name}'"
        )));
    }
    Ok(capabilities)
}
