//! Live connections and typed ad-hoc requests against them.

use crate::client::McpClient;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Failure of a dispatched request, tagged with the server it targeted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("request to MCP server '{server}' failed: {message}")]
pub struct RequestError {
    pub server: String,
    pub message: String,
}

impl RequestError {
    fn new(server: &str, message: impl Into<String>) -> Self {
        Self {
            server: server.to_string(),
            message: message.into(),
        }
    }
}

/// A connection kept open after a server yielded capabilities.
#[derive(Debug, Clone)]
pub struct ConnectionEntry {
    pub client: Arc<McpClient>,
    pub connected_at: DateTime<Utc>,
}

/// Server name to live connection. At most one entry per server.
#[derive(Debug, Default)]
pub struct ConnectionMap {
    entries: RwLock<HashMap<String, ConnectionEntry>>,
}

impl ConnectionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `client` for `server_name`, returning the connection it replaced.
    pub fn insert(&self, server_name: &str, client: Arc<McpClient>) -> Option<Arc<McpClient>> {
        let entry = ConnectionEntry {
            client,
            connected_at: Utc::now(),
        };
        self.entries
            .write()
            .insert(server_name.to_string(), entry)
            .map(|old| old.client)
    }

    pub fn get(&self, server_name: &str) -> Option<ConnectionEntry> {
        self.entries.read().get(server_name).cloned()
    }

    pub fn client(&self, server_name: &str) -> Option<Arc<McpClient>> {
        self.entries
            .read()
            .get(server_name)
            .map(|e| e.client.clone())
    }

    pub fn remove(&self, server_name: &str) -> Option<Arc<McpClient>> {
        self.entries.write().remove(server_name).map(|e| e.client)
    }

    /// Take every connection out of the map.
    pub fn drain(&self) -> Vec<(String, Arc<McpClient>)> {
        self.entries
            .write()
            .drain()
            .map(|(name, e)| (name, e.client))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Sends typed requests to connected servers. Never panics; every failure
/// comes back as a [`RequestError`].
#[derive(Debug, Clone)]
pub struct RequestDispatcher {
    connections: Arc<ConnectionMap>,
}

impl RequestDispatcher {
    pub fn new(connections: Arc<ConnectionMap>) -> Self {
        Self { connections }
    }

    /// Send `method` to `server_name` and decode the result as `T`.
    pub async fn request<T: DeserializeOwned>(
        &self,
        server_name: &str,
        method: &str,
        params: Option<Value>,
    ) -> Result<T, RequestError> {
        let client = self.connections.client(server_name).ok_or_else(|| {
            RequestError::new(server_name, "no live connection to this server")
        })?;

        let value = client
            .request(method, params)
            .await
            .map_err(|e| RequestError::new(server_name, e.to_string()))?;

        serde_json::from_value(value).map_err(|e| {
            RequestError::new(
                server_name,
                format!("unexpected result shape for '{method}': {e}"),
            )
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::test_support::{connect, empty_client, StaticServer};
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Listing {
        tools: Vec<Value>,
    }

    #[tokio::test]
    async fn test_unknown_server_is_tagged_error() {
        let dispatcher = RequestDispatcher::new(Arc::new(ConnectionMap::new()));
        let err = dispatcher
            .request::<Value>("ghost", "tools/list", None)
            .await
            .unwrap_err();
        assert_eq!(err.server, "ghost");
        assert!(err.to_string().contains("ghost"));
    }

    #[tokio::test]
    async fn test_typed_request_succeeds() {
        let map = Arc::new(ConnectionMap::new());
        let client = connect(
            "fs",
            StaticServer::new(json!({"tools": [{"name": "a"}]}), json!({"prompts": []})),
        )
        .await;
        map.insert("fs", client);
        let dispatcher = RequestDispatcher::new(map);
        let listing: Listing = dispatcher.request("fs", "tools/list", None).await.unwrap();
        assert_eq!(listing.tools.len(), 1);
    }

    #[tokio::test]
    async fn test_protocol_and_shape_errors_are_tagged() {
        let map = Arc::new(ConnectionMap::new());
        map.insert("fs", empty_client("fs").await);
        let dispatcher = RequestDispatcher::new(map);

        let err = dispatcher
            .request::<Value>("fs", "resources/list", None)
            .await
            .unwrap_err();
        assert_eq!(err.server, "fs");
        assert!(err.message.contains("Method not found"));

        let err = dispatcher
            .request::<Vec<String>>("fs", "tools/list", None)
            .await
            .unwrap_err();
        assert!(err.message.contains("unexpected result shape"));
    }
}
