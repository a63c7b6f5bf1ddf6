//! Prompts discovered on MCP servers.

use crate::protocol::McpPromptDef;
use serde::Serialize;
use std::collections::HashMap;
use toolwire_core::{ToolwireError, ToolwireResult};

/// One declared prompt parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptParameter {
    pub name: String,
    /// Declared type, `"string"` when the server gave none.
    pub kind: String,
    pub description: String,
    pub required: bool,
}

/// A prompt template exposed by an MCP server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredPrompt {
    pub name: String,
    pub description: String,
    pub template: String,
    pub parameters: Vec<PromptParameter>,
    pub server_name: String,
}

impl DiscoveredPrompt {
    /// Build a prompt from a `prompts/list` entry.
    ///
    /// Entries without a name or template are unusable and yield `None`.
    pub fn from_def(server_name: &str, def: &McpPromptDef) -> Option<Self> {
        let name = def.name.clone()?;
        let template = def.template.clone()?;
        let parameters = def
            .arguments
            .iter()
            .map(|arg| PromptParameter {
                name: arg.name.clone(),
                kind: arg.kind.clone().unwrap_or_else(|| "string".to_string()),
                description: arg.description.clone().unwrap_or_default(),
                required: arg.required,
            })
            .collect();

        Some(Self {
            name,
            description: def.description.clone().unwrap_or_default(),
            template,
            parameters,
            server_name: server_name.to_string(),
        })
    }

    pub fn required_parameters(&self) -> impl Iterator<Item = &PromptParameter> {
        self.parameters.iter().filter(|p| p.required)
    }

    pub fn optional_parameters(&self) -> impl Iterator<Item = &PromptParameter> {
        self.parameters.iter().filter(|p| !p.required)
    }

    /// Substitute `{{name}}` placeholders with the given arguments.
    ///
    /// Every required parameter must be supplied. Placeholders of optional
    /// parameters that were not supplied render as empty strings.
    pub fn render(&self, args: &HashMap<String, String>) -> ToolwireResult<String> {
        let missing: Vec<&str> = self
            .required_parameters()
            .filter(|p| !args.contains_key(&p.name))
            .map(|p| p.name.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(ToolwireError::Request(format!(
                "prompt '{}' is missing required argument(s): {}",
                self.name,
                missing.join(", ")
            )));
        }

        let mut rendered = String::with_capacity(self.template.len());
        let mut rest = self.template.as_str();
        while let Some(start) = rest.find("{{") {
            let Some(len) = rest[start + 2..].find("}}") else {
                break;
            };
            let name = &rest[start + 2..start + 2 + len];
            rendered.push_str(&rest[..start]);
            match args.get(name) {
                // Undeclared arguments still fill matching placeholders.
                Some(value) => rendered.push_str(value),
                None if self.parameters.iter().any(|p| p.name == name) => {}
                None => rendered.push_str(&rest[start..start + len + 4]),
            }
            rest = &rest[start + len + 4..];
        }
        rendered.push_str(rest);
        Ok(rendered)
    }
}
