//! The discovery orchestrator: one instance per host, owning the status
//! registry, the live connections, and the tool and prompt registries.

use crate::adhoc::{parse_command, AD_HOC_SERVER_NAME};
use crate::cancel::DiscoveryCancel;
use crate::config::ServerConfig;
use crate::dispatcher::{ConnectionMap, RequestDispatcher, RequestError};
use crate::lifecycle::{ActiveContextLostCallback, ConnectionLifecycle, ServerOutcome};
use crate::registry::{PromptRegistry, ToolRegistry};
use crate::selector::{DefaultTransportFactory, TransportFactory, TransportOptions};
use crate::status::{ConnectionState, DiscoveryState, StatusRegistry};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::task::JoinSet;
use toolwire_core::ToolwireResult;
use tracing::{debug, error, info};

/// Host-level settings for discovery.
#[derive(Debug, Clone, Default)]
pub struct ManagerOptions {
    /// Log stdio servers' stderr output.
    pub debug: bool,
    /// Server whose loss triggers the active-context-lost callback.
    pub active_context_server: Option<String>,
}

/// Per-server result of a discovery run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiscoveryReport {
    pub outcomes: BTreeMap<String, ServerOutcome>,
}

impl DiscoveryReport {
    pub fn connected(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .filter(|(_, o)| o.is_connected())
            .map(|(name, _)| name.as_str())
    }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &str)> {
        self.outcomes.iter().filter_map(|(name, o)| match o {
            ServerOutcome::Failed { error } => Some((name.as_str(), error.as_str())),
            _ => None,
        })
    }

    pub fn outcome(&self, server_name: &str) -> Option<&ServerOutcome> {
        self.outcomes.get(server_name)
    }
}

/// Snapshot of one server for reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerStatus {
    pub name: String,
    pub state: ConnectionState,
    pub tool_count: usize,
    pub prompt_count: usize,
    pub connected_at: Option<DateTime<Utc>>,
}

/// Marks discovery `Completed` however the run ends.
struct CompletionGuard(Arc<StatusRegistry>);

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.0.advance_discovery(DiscoveryState::Completed);
    }
}

/// Discovers and connects every configured MCP server.
pub struct McpDiscoveryManager {
    status: Arc<StatusRegistry>,
    connections: Arc<ConnectionMap>,
    tools: Arc<ToolRegistry>,
    prompts: Arc<PromptRegistry>,
    lifecycle: ConnectionLifecycle,
}

impl McpDiscoveryManager {
    pub fn new(options: ManagerOptions) -> Self {
        let factory = DefaultTransportFactory::new(TransportOptions {
            debug: options.debug,
        });
        Self::with_transport_factory(options, Arc::new(factory))
    }

    /// Build a manager that creates transports through `factory`.
    pub fn with_transport_factory(
        options: ManagerOptions,
        factory: Arc<dyn TransportFactory>,
    ) -> Self {
        let status = Arc::new(StatusRegistry::new());
        let connections = Arc::new(ConnectionMap::new());
        let tools = Arc::new(ToolRegistry::new());
        let prompts = Arc::new(PromptRegistry::new());
        let lifecycle = ConnectionLifecycle::new(
            status.clone(),
            connections.clone(),
            tools.clone(),
            prompts.clone(),
            factory,
            options.active_context_server,
        );
        Self {
            status,
            connections,
            tools,
            prompts,
            lifecycle,
        }
    }

    /// Install the callback run when the active-context server disconnects.
    pub fn on_active_context_lost(&self, callback: ActiveContextLostCallback) {
        self.lifecycle.set_active_context_lost(callback);
    }

    pub fn tool_registry(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub fn prompt_registry(&self) -> &Arc<PromptRegistry> {
        &self.prompts
    }

    pub fn status(&self) -> &Arc<StatusRegistry> {
        &self.status
    }

    pub fn discovery_state(&self) -> DiscoveryState {
        self.status.discovery_state()
    }

    /// Discover every server in `configs`, plus an ad-hoc server built from
    /// `ad_hoc_command` if given.
    ///
    /// Only a malformed ad-hoc command fails the call; per-server failures
    /// are reported in the returned [`DiscoveryReport`].
    pub async fn discover_all(
        &self,
        configs: &HashMap<String, ServerConfig>,
        ad_hoc_command: Option<&str>,
    ) -> ToolwireResult<DiscoveryReport> {
        self.discover_all_with_cancel(configs, ad_hoc_command, &DiscoveryCancel::new())
            .await
    }

    /// Like [`discover_all`](Self::discover_all), stopping early once
    /// `cancel` fires. Cancelled servers end `Disconnected` with nothing
    /// registered.
    pub async fn discover_all_with_cancel(
        &self,
        configs: &HashMap<String, ServerConfig>,
        ad_hoc_command: Option<&str>,
        cancel: &DiscoveryCancel,
    ) -> ToolwireResult<DiscoveryReport> {
        self.status.advance_discovery(DiscoveryState::InProgress);
        let _completion = CompletionGuard(self.status.clone());

        let mut servers = configs.clone();
        if let Some(command) = ad_hoc_command {
            let config = parse_command(command)?;
            if servers.insert(AD_HOC_SERVER_NAME.to_string(), config).is_some() {
                debug!(server = AD_HOC_SERVER_NAME, "Ad-hoc command replaces configured server");
            }
        }

        info!(servers = servers.len(), "Starting MCP server discovery");

        let mut branches = JoinSet::new();
        let mut names = HashMap::new();
        for (name, config) in servers {
            let lifecycle = self.lifecycle.clone();
            let cancel = cancel.clone();
            let server_name = name.clone();
            let handle = branches.spawn(async move {
                let outcome = lifecycle
                    .connect_and_discover(&server_name, &config, &cancel)
                    .await;
                (server_name, outcome)
            });
            names.insert(handle.id(), name);
        }

        let mut report = DiscoveryReport::default();
        while let Some(joined) = branches.join_next_with_id().await {
            match joined {
                Ok((_, (name, outcome))) => {
                    report.outcomes.insert(name, outcome);
                }
                Err(e) => {
                    let Some(name) = names.get(&e.id()).cloned() else {
                        error!(error = %e, "MCP discovery task failed");
                        continue;
                    };
                    error!(server = %name, error = %e, "MCP discovery task failed");
                    self.status.set_status(&name, ConnectionState::Disconnected);
                    report.outcomes.insert(
                        name,
                        ServerOutcome::Failed {
                            error: format!("discovery task failed: {e}"),
                        },
                    );
                }
            }
        }

        info!(
            connected = report.connected().count(),
            total = report.outcomes.len(),
            tools = self.tools.len(),
            prompts = self.prompts.len(),
            "MCP server discovery completed"
        );
        Ok(report)
    }

    /// Connect and discover a single server, replacing any earlier
    /// connection to it.
    pub async fn connect_and_discover(
        &self,
        server_name: &str,
        config: &ServerConfig,
    ) -> ServerOutcome {
        self.lifecycle
            .connect_and_discover(server_name, config, &DiscoveryCancel::new())
            .await
    }

    pub fn dispatcher(&self) -> RequestDispatcher {
        RequestDispatcher::new(self.connections.clone())
    }

    /// Send a typed request to a connected server.
    pub async fn request<T: DeserializeOwned>(
        &self,
        server_name: &str,
        method: &str,
        params: Option<Value>,
    ) -> Result<T, RequestError> {
        self.dispatcher().request(server_name, method, params).await
    }

    /// One entry per known server, sorted by name.
    pub fn server_statuses(&self) -> Vec<ServerStatus> {
        let mut statuses: Vec<ServerStatus> = self
            .status
            .all()
            .into_iter()
            .map(|(name, state)| ServerStatus {
                tool_count: self.tools.tools_by_server(&name).len(),
                prompt_count: self.prompts.prompts_by_server(&name).len(),
                connected_at: self.connections.get(&name).map(|e| e.connected_at),
                state,
                name,
            })
            .collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    /// Close every live connection and drop the capabilities it provided.
    pub async fn shutdown(&self) {
        for (name, client) in self.connections.drain() {
            if let Err(e) = client.close().await {
                debug!(server = %name, error = %e, "Error while closing MCP connection");
            }
            self.tools.remove_by_server(&name);
            self.prompts.remove_by_server(&name);
            self.status.set_status(&name, ConnectionState::Disconnected);
        }
        info!("MCP connections shut down");
    }
}
