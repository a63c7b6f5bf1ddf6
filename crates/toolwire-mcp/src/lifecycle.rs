//! Per-server connection lifecycle.
//!
//! `Disconnected -> Connecting -> Connected -> Disconnected`. A branch
//! connects, discovers, and either keeps the connection for later requests
//! or closes it. There is no automatic retry.

use crate::cancel::DiscoveryCancel;
use crate::client::McpClient;
use crate::config::ServerConfig;
use crate::discovery::{discover, DiscoveredCapabilities};
use crate::dispatcher::ConnectionMap;
use crate::protocol::LoggingMessageParams;
use crate::registry::{PromptRegistry, ToolRegistry};
use crate::selector::TransportFactory;
use crate::status::{ConnectionState, StatusRegistry};
use crate::transport::Transport;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use toolwire_core::ToolwireError;
use tracing::{debug, info, warn};

/// Called with the server name when the active-context server's connection
/// breaks.
pub type ActiveContextLostCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// How one server's lifecycle branch ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ServerOutcome {
    /// Capabilities registered; the connection stays open.
    Connected { tools: usize, prompts: usize },
    /// The server offered nothing usable and its connection was closed.
    Reclaimed,
    Failed { error: String },
    Cancelled,
}

impl ServerOutcome {
    pub fn is_connected(&self) -> bool {
        matches!(self, ServerOutcome::Connected { .. })
    }
}

/// Runs the lifecycle for single servers against shared registries.
#[derive(Clone)]
pub struct ConnectionLifecycle {
    status: Arc<StatusRegistry>,
    connections: Arc<ConnectionMap>,
    tools: Arc<ToolRegistry>,
    prompts: Arc<PromptRegistry>,
    factory: Arc<dyn TransportFactory>,
    active_context_server: Option<String>,
    on_active_context_lost: Arc<RwLock<Option<ActiveContextLostCallback>>>,
}

impl ConnectionLifecycle {
    pub fn new(
        status: Arc<StatusRegistry>,
        connections: Arc<ConnectionMap>,
        tools: Arc<ToolRegistry>,
        prompts: Arc<PromptRegistry>,
        factory: Arc<dyn TransportFactory>,
        active_context_server: Option<String>,
    ) -> Self {
        Self {
            status,
            connections,
            tools,
            prompts,
            factory,
            active_context_server,
            on_active_context_lost: Arc::new(RwLock::new(None)),
        }
    }

    pub fn set_active_context_lost(&self, callback: ActiveContextLostCallback) {
        *self.on_active_context_lost.write() = Some(callback);
    }

    /// Connect to one server, discover its capabilities, and register them.
    ///
    /// Never fails: every error is logged, reflected in the status registry,
    /// and summarized in the returned outcome.
    pub async fn connect_and_discover(
        &self,
        server_name: &str,
        config: &ServerConfig,
        cancel: &DiscoveryCancel,
    ) -> ServerOutcome {
        self.release_previous(server_name).await;
        self.status.set_status(server_name, ConnectionState::Connecting);

        let transport = match self.factory.create(server_name, config) {
            Ok(transport) => transport,
            Err(e) => {
                warn!(server = %server_name, error = %e, "Invalid MCP server configuration");
                return self.fail(server_name, &e);
            }
        };

        let timeout = config.effective_timeout();
        let connected = cancel
            .run(McpClient::connect(server_name, transport.clone(), timeout))
            .await;
        let client = match connected {
            Ok(Ok(client)) => Arc::new(client),
            Ok(Err(e)) => {
                warn!(server = %server_name, transport = %transport.kind(), error = %e, "Failed to connect MCP server");
                close_transport(server_name, transport.as_ref()).await;
                return self.fail(server_name, &e);
            }
            Err(e) => {
                close_transport(server_name, transport.as_ref()).await;
                return self.fail(server_name, &e);
            }
        };

        self.status.set_status(server_name, ConnectionState::Connected);
        self.install_handlers(server_name, &client);

        let discovered = cancel.run(discover(server_name, config, &client)).await;
        let capabilities = match discovered {
            Ok(Ok(capabilities)) if !cancel.is_cancelled() => capabilities,
            Ok(Ok(_)) => {
                return self.close_and_fail(server_name, &client, &cancelled_error()).await;
            }
            Ok(Err(e)) if e.is_empty_discovery() => {
                info!(server = %server_name, "MCP server exposed no enabled tools or prompts, closing connection");
                close_client(server_name, &client).await;
                self.status.set_status(server_name, ConnectionState::Disconnected);
                return ServerOutcome::Reclaimed;
            }
            Ok(Err(e)) => {
                warn!(server = %server_name, error = %e, "MCP capability discovery failed");
                return self.close_and_fail(server_name, &client, &e).await;
            }
            Err(e) => return self.close_and_fail(server_name, &client, &e).await,
        };

        let outcome = self.register(server_name, capabilities);
        self.connections.insert(server_name, client);
        outcome
    }

    fn register(&self, server_name: &str, capabilities: DiscoveredCapabilities) -> ServerOutcome {
        let DiscoveredCapabilities { tools, prompts } = capabilities;
        let (tool_count, prompt_count) = (tools.len(), prompts.len());

        for tool in tools {
            self.tools.register_tool(Arc::new(tool));
        }
        let prompt_names: Vec<String> = prompts
            .into_iter()
            .map(|p| self.prompts.register_prompt(p))
            .collect();
        if !prompt_names.is_empty() {
            info!(server = %server_name, prompts = ?prompt_names, "Discovered MCP prompts");
        }

        info!(
            server = %server_name,
            tools = tool_count,
            prompts = prompt_count,
            "MCP server connected"
        );
        ServerOutcome::Connected {
            tools: tool_count,
            prompts: prompt_count,
        }
    }

    /// Close any earlier connection of this server and forget what it offered.
    async fn release_previous(&self, server_name: &str) {
        if let Some(previous) = self.connections.remove(server_name) {
            debug!(server = %server_name, "Replacing existing MCP connection");
            close_client(server_name, &previous).await;
        }
        self.tools.remove_by_server(server_name);
        self.prompts.remove_by_server(server_name);
    }

    fn install_handlers(&self, server_name: &str, client: &McpClient) {
        let status = self.status.clone();
        let name = server_name.to_string();
        let is_active_context = self.active_context_server.as_deref() == Some(server_name);
        let on_lost = self.on_active_context_lost.clone();
        client.on_error(Arc::new(move |error: &ToolwireError| {
            warn!(server = %name, error = %error, "MCP connection lost");
            status.set_status(&name, ConnectionState::Disconnected);
            if is_active_context {
                let callback = on_lost.read().clone();
                if let Some(callback) = callback {
                    callback(&name);
                }
            }
        }));

        let name = server_name.to_string();
        client.set_notification_handler(
            "notifications/message",
            Arc::new(move |params| {
                let Some(params) = params else { return };
                match serde_json::from_value::<LoggingMessageParams>(params) {
                    Ok(log) => debug!(
                        server = %name,
                        level = %log.level,
                        logger = ?log.logger,
                        data = %log.data,
                        "MCP server log"
                    ),
                    Err(e) => debug!(server = %name, error = %e, "Malformed MCP log notification"),
                }
            }),
        );
    }

    fn fail(&self, server_name: &str, error: &ToolwireError) -> ServerOutcome {
        self.status.set_status(server_name, ConnectionState::Disconnected);
        match error {
            ToolwireError::Cancelled(_) => {
                debug!(server = %server_name, "MCP discovery cancelled");
                ServerOutcome::Cancelled
            }
            other => ServerOutcome::Failed {
                error: other.to_string(),
            },
        }
    }

    async fn close_and_fail(
        &self,
        server_name: &str,
        client: &McpClient,
        error: &ToolwireError,
    ) -> ServerOutcome {
        close_client(server_name, client).await;
        self.fail(server_name, error)
    }
}

fn cancelled_error() -> ToolwireError {
    ToolwireError::Cancelled("discovery was cancelled".into())
}

async fn close_client(server_name: &str, client: &McpClient) {
    if let Err(e) = client.close().await {
        debug!(server = %server_name, error = %e, "Error while closing MCP connection");
    }
}

async fn close_transport(server_name: &str, transport: &dyn Transport) {
    if let Err(e) = transport.close().await {
        debug!(server = %server_name, error = %e, "Error while closing MCP transport");
    }
}
