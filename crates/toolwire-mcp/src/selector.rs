//! Picks and builds the transport for a server configuration.

use crate::config::ServerConfig;
use crate::transport::{SseTransport, StdioTransport, StreamableHttpTransport, Transport};
use std::sync::Arc;
use toolwire_core::{ToolwireError, ToolwireResult};

/// Knobs shared by every transport the selector builds.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransportOptions {
    /// Forward stdio servers' stderr to the debug log.
    pub debug: bool,
}

/// Build the transport for `config`.
///
/// `http_url` wins over `url`, which wins over `command`. A config with none
/// of the three is a configuration error.
pub fn select_transport(
    server_name: &str,
    config: &ServerConfig,
    options: &TransportOptions,
) -> ToolwireResult<Arc<dyn Transport>> {
    if let Some(http_url) = &config.http_url {
        return Ok(Arc::new(StreamableHttpTransport::new(
            server_name,
            http_url.clone(),
            &config.headers,
        )?));
    }

    if let Some(url) = &config.url {
        return Ok(Arc::new(SseTransport::new(
            server_name,
            url.clone(),
            &config.headers,
        )?));
    }

    if let Some(command) = &config.command {
        return Ok(Arc::new(StdioTransport::new(
            server_name,
            command.clone(),
            config.args.clone(),
            config.env.clone(),
            config.cwd.clone(),
            options.debug,
        )));
    }

    Err(ToolwireError::Configuration(format!(
        "MCP server '{server_name}' has no transport: set one of 'httpUrl', 'url', or 'command'"
    )))
}

/// Creates transports for the orchestrator.
///
/// The default goes through [`select_transport`]; tests and embedders plug in
/// their own to reach in-process servers.
pub trait TransportFactory: Send + Sync {
    fn create(
        &self,
        server_name: &str,
        config: &ServerConfig,
    ) -> ToolwireResult<Arc<dyn Transport>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTransportFactory {
    options: TransportOptions,
}

impl DefaultTransportFactory {
    pub fn new(options: TransportOptions) -> Self {
        Self { options }
    }
}

impl TransportFactory for DefaultTransportFactory {
    fn create(
        &self,
        server_name: &str,
        config: &ServerConfig,
    ) -> ToolwireResult<Arc<dyn Transport>> {
        select_transport(server_name, config, &self.options)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::transport::TransportKind;

    fn kind_of(config: &ServerConfig) -> TransportKind {
        select_transport("s", config, &TransportOptions::default())
            .unwrap()
            .kind()
    }

    #[test]
    fn test_command_selects_stdio() {
        assert_eq!(
            kind_of(&ServerConfig::stdio("node", vec!["server.js".into()])),
            TransportKind::Stdio
        );
    }

    #[test]
    fn test_url_selects_sse() {
        assert_eq!(
            kind_of(&ServerConfig::sse("http://localhost:8080/sse")),
            TransportKind::Sse
        );
    }

    #[test]
    fn test_http_url_wins_over_everything() {
        let config = ServerConfig {
            command: Some("node".into()),
            url: Some("http://localhost/sse".into()),
            http_url: Some("http://localhost/mcp".into()),
            ..Default::default()
        };
        assert_eq!(kind_of(&config), TransportKind::StreamableHttp);
    }

    #[test]
    fn test_url_wins_over_command() {
        let config = ServerConfig {
            command: Some("node".into()),
            url: Some("http://localhost/sse".into()),
            ..Default::default()
        };
        assert_eq!(kind_of(&config), TransportKind::Sse);
    }

    #[test]
    fn test_missing_transport_names_all_fields() {
        let err = select_transport("empty", &ServerConfig::default(), &TransportOptions::default())
            .err()
            .unwrap();
        let msg = err.to_string();
        assert!(matches!(err, ToolwireError::Configuration(_)));
        assert!(msg.contains("httpUrl") && msg.contains("url") && msg.contains("command"));
    }

    #[test]
    fn test_factory_delegates_to_selector() {
        let factory = DefaultTransportFactory::default();
        let transport = factory
            .create("s", &ServerConfig::http("http://localhost/mcp"))
            .unwrap();
        assert_eq!(transport.kind(), TransportKind::StreamableHttp);
    }
}
