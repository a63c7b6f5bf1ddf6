//! Per-server connection configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Timeout applied to connects and requests when a server sets none (10 minutes).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Configuration for a single MCP server.
///
/// Exactly one of `command`, `url`, or `http_url` should be set. When several
/// are present the transport selector prefers `http_url`, then `url`, then
/// `command`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Executable to spawn for a stdio server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Variables overlaid on the current process environment at spawn time.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    /// Server-sent events endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Streamable HTTP endpoint.
    #[serde(default, alias = "http_url", skip_serializing_if = "Option::is_none")]
    pub http_url: Option<String>,
    /// Extra request headers for `url` / `http_url` servers.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    /// Connect and request timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// Tools from a trusted server skip the host's confirmation step.
    #[serde(default)]
    pub trust: bool,
    #[serde(
        default,
        alias = "include_tools",
        skip_serializing_if = "Option::is_none"
    )]
    pub include_tools: Option<Vec<String>>,
    #[serde(
        default,
        alias = "exclude_tools",
        skip_serializing_if = "Option::is_none"
    )]
    pub exclude_tools: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ServerConfig {
    /// A server spawned as a subprocess speaking over stdin/stdout.
    pub fn stdio(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: Some(command.into()),
            args,
            ..Default::default()
        }
    }

    /// A remote server reached over server-sent events.
    pub fn sse(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    /// A remote server reached over streamable HTTP.
    pub fn http(url: impl Into<String>) -> Self {
        Self {
            http_url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn trusted(mut self) -> Self {
        self.trust = true;
        self
    }

    pub fn with_include_tools(mut self, tools: &[&str]) -> Self {
        self.include_tools = Some(tools.iter().map(|t| (*t).to_string()).collect());
        self
    }

    pub fn with_exclude_tools(mut self, tools: &[&str]) -> Self {
        self.exclude_tools = Some(tools.iter().map(|t| (*t).to_string()).collect());
        self
    }

    /// The configured timeout, or [`DEFAULT_TIMEOUT`].
    pub fn effective_timeout(&self) -> Duration {
        self.timeout
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_TIMEOUT)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config: ServerConfig = serde_json::from_str(r#"{"command":"test"}"#).unwrap();
        assert_eq!(config.command.as_deref(), Some("test"));
        assert!(config.args.is_empty());
        assert!(config.env.is_empty());
        assert!(!config.trust);
        assert!(config.include_tools.is_none());
        assert_eq!(config.effective_timeout(), DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_config_camel_case_keys() {
        let config: ServerConfig = serde_json::from_str(
            r#"{"httpUrl":"https://mcp.example.com/mcp","headers":{"Authorization":"Bearer t"},"timeout":5000,"trust":true,"includeTools":["search"],"excludeTools":["delete"]}"#,
        )
        .unwrap();
        assert_eq!(
            config.http_url.as_deref(),
            Some("https://mcp.example.com/mcp")
        );
        assert_eq!(config.headers["Authorization"], "Bearer t");
        assert_eq!(config.effective_timeout(), Duration::from_secs(5));
        assert!(config.trust);
        assert_eq!(config.include_tools.unwrap(), vec!["search"]);
        assert_eq!(config.exclude_tools.unwrap(), vec!["delete"]);
    }

    #[test]
    fn test_config_snake_case_aliases() {
        let config: ServerConfig = toml::from_str(
            r#"
            http_url = "http://localhost:9000/mcp"
            include_tools = ["a", "b(c)"]
            "#,
        )
        .unwrap();
        assert_eq!(config.http_url.as_deref(), Some("http://localhost:9000/mcp"));
        assert_eq!(config.include_tools.unwrap().len(), 2);
    }

    #[test]
    fn test_builder_helpers() {
        let config = ServerConfig::stdio("node", vec!["server.js".into()])
            .with_env("API_KEY", "secret")
            .with_cwd("/srv")
            .with_timeout(Duration::from_millis(250))
            .trusted();
        assert_eq!(config.command.as_deref(), Some("node"));
        assert_eq!(config.env["API_KEY"], "secret");
        assert_eq!(config.cwd, Some(PathBuf::from("/srv")));
        assert_eq!(config.effective_timeout(), Duration::from_millis(250));
        assert!(config.trust);
    }
}
