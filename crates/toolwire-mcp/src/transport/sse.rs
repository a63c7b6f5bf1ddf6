//! Server-sent events: an incremental `text/event-stream` decoder and the
//! SSE transport built on it.
//!
//! The SSE transport opens a long-lived GET stream. The server first sends an
//! `endpoint` event naming the URL that accepts our POSTed messages; every
//! later `message` event carries one JSON-RPC message.

use super::{header_map, http_client, Transport, TransportEvent, TransportKind, INBOUND_CAPACITY};
use crate::protocol::JsonRpcMessage;
use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Url;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use toolwire_core::{ToolwireError, ToolwireResult};
use tracing::{debug, warn};

/// A parsed SSE event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub id: Option<String>,
    /// The `event:` field; `None` means the default `message` type.
    pub event: Option<String>,
    /// `data:` lines joined with `\n`.
    pub data: String,
}

impl SseEvent {
    pub fn is_message(&self) -> bool {
        self.event.as_deref().is_none_or(|e| e == "message")
    }
}

/// Incremental decoder: feed arbitrary byte chunks, get back complete events.
///
/// Bytes are buffered until an event is complete, so a multi-byte character
/// split across chunks decodes intact.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every event it completed.
    pub fn push(&mut self, chunk: impl AsRef<[u8]>) -> Vec<SseEvent> {
        self.buffer
            .extend(chunk.as_ref().iter().copied().filter(|b| *b != b'\r'));

        let mut events = Vec::new();
        while let Some(end) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let raw: Vec<u8> = self.buffer.drain(..end + 2).collect();
            if let Some(event) = parse_event(&String::from_utf8_lossy(&raw)) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing event that was not followed by a blank line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        let raw = std::mem::take(&mut self.buffer);
        parse_event(&String::from_utf8_lossy(&raw))
    }
}

fn parse_event(raw: &str) -> Option<SseEvent> {
    let mut event = SseEvent::default();
    let mut has_data = false;

    for line in raw.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "id" => event.id = Some(value.to_string()),
            "event" => event.event = Some(value.to_string()),
            "data" => {
                if has_data {
                    event.data.push('\n');
                }
                event.data.push_str(value);
                has_data = true;
            }
            // retry and unknown fields
            _ => {}
        }
    }

    has_data.then_some(event)
}

/// State of the background task reading the GET stream.
struct StreamReader {
    server: String,
    base: Url,
    endpoint: Arc<Mutex<Option<Url>>>,
    endpoint_tx: Option<oneshot::Sender<Url>>,
    tx: mpsc::Sender<TransportEvent>,
}

impl StreamReader {
    /// Returns `false` once nobody is listening on the inbound channel.
    async fn handle(&mut self, event: SseEvent) -> bool {
        if event.event.as_deref() == Some("endpoint") {
            match self.base.join(event.data.trim()) {
                Ok(url) => {
                    debug!(server = %self.server, endpoint = %url, "SSE endpoint announced");
                    *self.endpoint.lock() = Some(url.clone());
                    if let Some(notify) = self.endpoint_tx.take() {
                        let _ = notify.send(url);
                    }
                }
                Err(e) => {
                    warn!(server = %self.server, data = %event.data, error = %e, "Invalid SSE endpoint event");
                }
            }
            return true;
        }

        if !event.is_message() || event.data.is_empty() {
            return true;
        }

        match serde_json::from_str::<JsonRpcMessage>(&event.data) {
            Ok(msg) => self.tx.send(TransportEvent::Message(msg)).await.is_ok(),
            Err(e) => {
                warn!(server = %self.server, data = %event.data, error = %e, "Failed to parse SSE event as JSON-RPC");
                true
            }
        }
    }
}

/// Transport for servers exposing the SSE flavour of the protocol.
pub struct SseTransport {
    server_name: String,
    url: String,
    headers: HeaderMap,
    http: reqwest::Client,
    /// POST target announced by the server's `endpoint` event.
    endpoint: Arc<Mutex<Option<Url>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl SseTransport {
    pub fn new(
        server_name: impl Into<String>,
        url: impl Into<String>,
        headers: &HashMap<String, String>,
    ) -> ToolwireResult<Self> {
        let url = url.into();
        Url::parse(&url)
            .map_err(|e| ToolwireError::Configuration(format!("invalid SSE url '{url}': {e}")))?;
        Ok(Self {
            server_name: server_name.into(),
            url,
            headers: header_map(headers)?,
            http: http_client()?,
            endpoint: Arc::new(Mutex::new(None)),
            reader: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for SseTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Sse
    }

    async fn start(&self) -> ToolwireResult<mpsc::Receiver<TransportEvent>> {
        if self.reader.lock().is_some() {
            return Err(ToolwireError::Connection(format!(
                "SSE transport for '{}' already started",
                self.server_name
            )));
        }

        let base = Url::parse(&self.url)
            .map_err(|e| ToolwireError::Configuration(format!("invalid SSE url: {e}")))?;

        let resp = self
            .http
            .get(base.clone())
            .headers(self.headers.clone())
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"))
            .send()
            .await
            .map_err(|e| {
                ToolwireError::Connection(format!("SSE connect to '{}' failed: {e}", self.url))
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ToolwireError::Connection(format!(
                "SSE endpoint '{}' returned {status}",
                self.url
            )));
        }

        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        let (endpoint_tx, endpoint_rx) = oneshot::channel::<Url>();
        let mut reader = StreamReader {
            server: self.server_name.clone(),
            base,
            endpoint: self.endpoint.clone(),
            endpoint_tx: Some(endpoint_tx),
            tx,
        };

        let handle = tokio::spawn(async move {
            let mut stream = resp.bytes_stream();
            let mut decoder = SseDecoder::new();

            while let Some(chunk) = stream.next().await {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = reader
                            .tx
                            .send(TransportEvent::Error(format!("SSE stream read error: {e}")))
                            .await;
                        return;
                    }
                };
                for event in decoder.push(&bytes) {
                    if !reader.handle(event).await {
                        return;
                    }
                }
            }

            if let Some(event) = decoder.finish() {
                if !reader.handle(event).await {
                    return;
                }
            }
            debug!(server = %reader.server, "SSE stream ended");
            let _ = reader.tx.send(TransportEvent::Closed).await;
        });

        *self.reader.lock() = Some(handle);

        endpoint_rx.await.map_err(|_| {
            ToolwireError::Connection(format!(
                "SSE stream for '{}' ended before announcing an endpoint",
                self.server_name
            ))
        })?;

        Ok(rx)
    }

    async fn send(&self, message: &JsonRpcMessage) -> ToolwireResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ToolwireError::Connection("SSE transport is closed".into()));
        }
        let endpoint = self.endpoint.lock().clone().ok_or_else(|| {
            ToolwireError::Connection(format!(
                "SSE transport for '{}' has no message endpoint yet",
                self.server_name
            ))
        })?;

        let resp = self
            .http
            .post(endpoint)
            .headers(self.headers.clone())
            .json(message)
            .send()
            .await
            .map_err(|e| ToolwireError::Connection(format!("SSE POST failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ToolwireError::Connection(format!(
                "SSE message endpoint returned {status}"
            )));
        }
        Ok(())
    }

    async fn close(&self) -> ToolwireResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(handle) = self.reader.lock().take() {
            handle.abort();
        }
        Ok(())
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        if let Some(handle) = self.reader.lock().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_decoder_single_event() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push("event: message\ndata: {\"a\":1}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "{\"a\":1}");
        assert!(events[0].is_message());
    }

    #[test]
    fn test_decoder_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push("event: endpoint\nda").is_empty());
        let events = decoder.push("ta: /messages?session=1\n\nid: 4\ndata: x\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event.as_deref(), Some("endpoint"));
        assert_eq!(events[0].data, "/messages?session=1");
        assert_eq!(events[1].id.as_deref(), Some("4"));
    }

    #[test]
    fn test_decoder_multiline_data_and_comments() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(": keep-alive\r\ndata: line1\r\ndata: line2\r\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "line1\nline2");
    }

    #[test]
    fn test_decoder_skips_events_without_data() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push("event: ping\n\n").is_empty());
    }

    #[test]
    fn test_decoder_finish_flushes_tail() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push("data: tail").is_empty());
        assert_eq!(decoder.finish().unwrap().data, "tail");
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn test_decoder_keeps_characters_split_across_chunks() {
        let bytes = "data: caf\u{e9}\n\n".as_bytes();
        let split = bytes.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&bytes[..split]).is_empty());
        let events = decoder.push(&bytes[split..]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "caf\u{e9}");
    }

    #[test]
    fn test_decoder_crlf_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push("data: a\r\n\r").is_empty());
        assert_eq!(decoder.push("\n")[0].data, "a");
    }

    #[test]
    fn test_invalid_url_is_configuration_error() {
        let err = SseTransport::new("x", "not a url", &HashMap::new())
            .err()
            .unwrap();
        assert!(matches!(err, ToolwireError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_stream_tail_without_blank_line_is_delivered() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sse"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                "event: endpoint\ndata: /messages\n\n\
                 data: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/tools/list_changed\"}",
                "text/event-stream",
            ))
            .mount(&server)
            .await;

        let transport =
            SseTransport::new("tail", format!("{}/sse", server.uri()), &HashMap::new()).unwrap();
        let mut rx = transport.start().await.unwrap();

        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match first {
            TransportEvent::Message(msg) => {
                assert_eq!(msg.method.as_deref(), Some("notifications/tools/list_changed"));
            }
            other => panic!("expected a message, got {other:?}"),
        }
        let last = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(last, TransportEvent::Closed));
        assert!(transport
            .endpoint
            .lock()
            .as_ref()
            .is_some_and(|url| url.path() == "/messages"));
    }
}
