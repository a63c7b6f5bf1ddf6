//! Wire transports carrying JSON-RPC messages to and from one server.
//!
//! A transport does nothing until [`Transport::start`] is called. Starting
//! hands back a channel of [`TransportEvent`]s; the client reads responses,
//! notifications, and failures from it and writes through
//! [`Transport::send`].

pub mod http;
pub mod memory;
pub mod sse;
pub mod stdio;

pub use http::StreamableHttpTransport;
pub use memory::{InMemoryTransport, RequestHandler};
pub use sse::{SseDecoder, SseEvent, SseTransport};
pub use stdio::StdioTransport;

use crate::protocol::JsonRpcMessage;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::mpsc;
use toolwire_core::{ToolwireError, ToolwireResult};

/// Capacity of the inbound event channel each transport creates on start.
pub(crate) const INBOUND_CAPACITY: usize = 256;

/// The wire protocol a transport speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Stdio,
    Sse,
    StreamableHttp,
    InMemory,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportKind::Stdio => "stdio",
            TransportKind::Sse => "sse",
            TransportKind::StreamableHttp => "streamable-http",
            TransportKind::InMemory => "in-memory",
        };
        f.write_str(name)
    }
}

/// Something that happened on the inbound side of a transport.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A decoded JSON-RPC message from the server.
    Message(JsonRpcMessage),
    /// The transport failed; the connection should be treated as broken.
    Error(String),
    /// The server side went away cleanly.
    Closed,
}

/// A bidirectional channel to one MCP server.
#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Open the channel (spawn the process, open the stream) and return the
    /// inbound event stream. May be called at most once.
    async fn start(&self) -> ToolwireResult<mpsc::Receiver<TransportEvent>>;

    async fn send(&self, message: &JsonRpcMessage) -> ToolwireResult<()>;

    /// Release every resource held by the transport. Idempotent.
    async fn close(&self) -> ToolwireResult<()>;
}

/// Convert configured header pairs into a request header map.
pub(crate) fn header_map(headers: &HashMap<String, String>) -> ToolwireResult<HeaderMap> {
    let mut map = HeaderMap::new();
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| ToolwireError::Configuration(format!("invalid header name '{key}': {e}")))?;
        let value = HeaderValue::from_str(value).map_err(|e| {
            ToolwireError::Configuration(format!("invalid value for header '{key}': {e}"))
        })?;
        map.insert(name, value);
    }
    Ok(map)
}

pub(crate) fn http_client() -> ToolwireResult<reqwest::Client> {
    reqwest::Client::builder()
        .build()
        .map_err(|e| ToolwireError::Configuration(format!("failed to build HTTP client: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_header_map_accepts_valid_pairs() {
        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), "Bearer abc".to_string());
        headers.insert("X-Trace".to_string(), "1".to_string());
        let map = header_map(&headers).unwrap();
        assert_eq!(map.get("authorization").unwrap(), "Bearer abc");
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_header_map_rejects_bad_name() {
        let mut headers = HashMap::new();
        headers.insert("bad header".to_string(), "x".to_string());
        let err = header_map(&headers).unwrap_err();
        assert!(matches!(err, ToolwireError::Configuration(_)));
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(TransportKind::StreamableHttp.to_string(), "streamable-http");
        assert_eq!(TransportKind::Stdio.to_string(), "stdio");
    }
}
