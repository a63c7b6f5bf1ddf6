//! The `toolwire.toml` configuration file.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use toolwire_mcp::{ManagerOptions, ServerConfig};

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "toolwire.toml";

#[derive(Debug, Default, Deserialize)]
pub struct ToolwireConfig {
    #[serde(default)]
    pub discovery: DiscoverySettings,
    #[serde(default)]
    pub mcp_servers: HashMap<String, ServerConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DiscoverySettings {
    /// Log stdio servers' stderr output.
    #[serde(default)]
    pub debug: bool,
    /// Server whose loss is reported as losing the active context.
    #[serde(default)]
    pub active_context_server: Option<String>,
}

impl ToolwireConfig {
    pub fn manager_options(&self, debug_override: bool) -> ManagerOptions {
        ManagerOptions {
            debug: self.discovery.debug || debug_override,
            active_context_server: self.discovery.active_context_server.clone(),
        }
    }
}

/// Load the config at `path`, or the default file if present.
///
/// An explicitly given path must exist. A missing default file yields an
/// empty configuration.
pub async fn load(path: Option<&Path>) -> anyhow::Result<ToolwireConfig> {
    let (path, explicit) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };

    let raw = match tokio::fs::read_to_string(&path).await {
        Ok(raw) => raw,
        Err(e) if !explicit && e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(ToolwireConfig::default());
        }
        Err(e) => {
            return Err(anyhow::anyhow!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        }
    };

    toml::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("Invalid config file '{}': {}", path.display(), e))
}
