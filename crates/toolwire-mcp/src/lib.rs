//! MCP server discovery and connection management.
//!
//! [`McpDiscoveryManager`] connects to every configured MCP server over
//! stdio, SSE, or streamable HTTP, discovers the tools and prompts each one
//! exposes, and registers them in a [`ToolRegistry`] and [`PromptRegistry`].
//! Servers that offer nothing are disconnected again; servers that do stay
//! connected and can be queried through the [`RequestDispatcher`].

pub mod adhoc;
pub mod cancel;
pub mod client;
pub mod config;
pub mod discovery;
pub mod dispatcher;
pub mod lifecycle;
pub mod manager;
pub mod prompt;
pub mod protocol;
pub mod registry;
pub mod selector;
pub mod status;
pub mod tool;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use adhoc::AD_HOC_SERVER_NAME;
pub use cancel::DiscoveryCancel;
pub use client::McpClient;
pub use config::{ServerConfig, DEFAULT_TIMEOUT};
pub use discovery::{DiscoveredCapabilities, ToolFilter};
pub use dispatcher::{ConnectionMap, RequestDispatcher, RequestError};
pub use lifecycle::{ActiveContextLostCallback, ConnectionLifecycle, ServerOutcome};
pub use manager::{DiscoveryReport, ManagerOptions, McpDiscoveryManager, ServerStatus};
pub use prompt::{DiscoveredPrompt, PromptParameter};
pub use registry::{PromptRegistry, ToolRegistry};
pub use selector::{select_transport, DefaultTransportFactory, TransportFactory, TransportOptions};
pub use status::{ConnectionState, DiscoveryState, StatusRegistry, SubscriptionId};
pub use tool::DiscoveredTool;
pub use transport::{Transport, TransportEvent, TransportKind};
