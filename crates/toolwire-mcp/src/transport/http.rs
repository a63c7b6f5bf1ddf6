//! Streamable HTTP transport.
//!
//! Every outgoing message is an HTTP POST. The reply is either a single JSON
//! body or a `text/event-stream` body carrying one or more messages; both are
//! forwarded to the inbound channel. The `Mcp-Session-Id` header returned by
//! the server is echoed on every later request.

use super::sse::{SseDecoder, SseEvent};
use super::{header_map, http_client, Transport, TransportEvent, TransportKind, INBOUND_CAPACITY};
use crate::protocol::JsonRpcMessage;
use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use std::collections::HashMap;
use tokio::sync::mpsc;
use toolwire_core::{ToolwireError, ToolwireResult};
use tracing::{debug, warn};

const SESSION_HEADER: &str = "mcp-session-id";

/// Transport for servers exposing the streamable HTTP flavour of the protocol.
pub struct StreamableHttpTransport {
    server_name: String,
    url: String,
    headers: HeaderMap,
    http: reqwest::Client,
    session_id: Mutex<Option<String>>,
    inbound: Mutex<Option<mpsc::Sender<TransportEvent>>>,
}

impl StreamableHttpTransport {
    pub fn new(
        server_name: impl Into<String>,
        url: impl Into<String>,
        headers: &HashMap<String, String>,
    ) -> ToolwireResult<Self> {
        let url = url.into();
        reqwest::Url::parse(&url)
            .map_err(|e| ToolwireError::Configuration(format!("invalid HTTP url '{url}': {e}")))?;
        Ok(Self {
            server_name: server_name.into(),
            url,
            headers: header_map(headers)?,
            http: http_client()?,
            session_id: Mutex::new(None),
            inbound: Mutex::new(None),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Session assigned by the server, once one has been issued.
    pub fn session_id(&self) -> Option<String> {
        self.session_id.lock().clone()
    }

    fn request_headers(&self) -> HeaderMap {
        let mut headers = self.headers.clone();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/event-stream"),
        );
        if let Some(session) = self.session_id.lock().as_deref() {
            if let Ok(value) = HeaderValue::from_str(session) {
                headers.insert(HeaderName::from_static(SESSION_HEADER), value);
            }
        }
        headers
    }

    fn capture_session_id(&self, headers: &HeaderMap) {
        if let Some(value) = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()) {
            let mut session = self.session_id.lock();
            if session.as_deref() != Some(value) {
                debug!(server = %self.server_name, session_id = value, "Captured MCP session ID");
                *session = Some(value.to_string());
            }
        }
    }

    fn sender(&self) -> ToolwireResult<mpsc::Sender<TransportEvent>> {
        self.inbound.lock().clone().ok_or_else(|| {
            ToolwireError::Connection(format!(
                "HTTP transport for '{}' is not running",
                self.server_name
            ))
        })
    }
}

/// Decode a JSON reply body, which may hold one message or a batch.
fn decode_json_body(body: &str) -> ToolwireResult<Vec<JsonRpcMessage>> {
    let value: serde_json::Value = serde_json::from_str(body)?;
    match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(ToolwireError::from))
            .collect(),
        other => Ok(vec![serde_json::from_value(other)?]),
    }
}

#[async_trait]
impl Transport for StreamableHttpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::StreamableHttp
    }

    async fn start(&self) -> ToolwireResult<mpsc::Receiver<TransportEvent>> {
        let mut inbound = self.inbound.lock();
        if inbound.is_some() {
            return Err(ToolwireError::Connection(format!(
                "HTTP transport for '{}' already started",
                self.server_name
            )));
        }
        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        *inbound = Some(tx);
        Ok(rx)
    }

    async fn send(&self, message: &JsonRpcMessage) -> ToolwireResult<()> {
        let tx = self.sender()?;

        debug!(
            server = %self.server_name,
            method = ?message.method,
            id = ?message.id,
            "Sending JSON-RPC message via HTTP POST"
        );

        let resp = self
            .http
            .post(&self.url)
            .headers(self.request_headers())
            .json(message)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ToolwireError::Timeout(format!("HTTP request timed out: {e}"))
                } else {
                    ToolwireError::Connection(format!("HTTP request to '{}' failed: {e}", self.url))
                }
            })?;

        self.capture_session_id(resp.headers());

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ToolwireError::Connection(format!(
                "MCP server returned {status}: {body}"
            )));
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if content_type.contains("text/event-stream") {
            // The stream may outlive this call; drain it in the background.
            let server = self.server_name.clone();
            tokio::spawn(async move {
                let mut stream = resp.bytes_stream();
                let mut decoder = SseDecoder::new();
                while let Some(chunk) = stream.next().await {
                    let bytes = match chunk {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            let _ = tx
                                .send(TransportEvent::Error(format!("HTTP stream read error: {e}")))
                                .await;
                            return;
                        }
                    };
                    let events = decoder.push(&bytes);
                    for event in events.into_iter().filter(SseEvent::is_message) {
                        match serde_json::from_str::<JsonRpcMessage>(&event.data) {
                            Ok(msg) => {
                                if tx.send(TransportEvent::Message(msg)).await.is_err() {
                                    return;
                                }
                            }
                            Err(e) => {
                                warn!(server = %server, data = %event.data, error = %e, "Failed to parse SSE event as JSON-RPC");
                            }
                        }
                    }
                }
                if let Some(event) = decoder.finish() {
                    if let Ok(msg) = serde_json::from_str::<JsonRpcMessage>(&event.data) {
                        let _ = tx.send(TransportEvent::Message(msg)).await;
                    }
                }
            });
            return Ok(());
        }

        let body = resp
            .text()
            .await
            .map_err(|e| ToolwireError::Connection(format!("failed to read response body: {e}")))?;
        if body.trim().is_empty() {
            // Notifications are acknowledged with 202 and no body.
            return Ok(());
        }

        for msg in decode_json_body(&body)? {
            tx.send(TransportEvent::Message(msg))
                .await
                .map_err(|_| ToolwireError::Connection("inbound channel closed".into()))?;
        }
        Ok(())
    }

    async fn close(&self) -> ToolwireResult<()> {
        let was_running = self.inbound.lock().take().is_some();
        let session = self.session_id.lock().take();
        if let (true, Some(session)) = (was_running, session) {
            // Best effort: let the server drop its session state.
            let result = self
                .http
                .delete(&self.url)
                .headers(self.headers.clone())
                .header(SESSION_HEADER, session)
                .send()
                .await;
            if let Err(e) = result {
                debug!(server = %self.server_name, error = %e, "Session termination request failed");
            }
        }
        Ok(())
    }
}
