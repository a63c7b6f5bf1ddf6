//! MCP client. Runs the JSON-RPC 2.0 session with one server over any
//! [`Transport`].
//!
//! A background router task reads the transport's inbound events: responses
//! are matched to pending requests by id, notifications go to registered
//! handlers, and transport failures are reported to the error handler.

use crate::protocol::*;
use crate::transport::{Transport, TransportEvent};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use toolwire_core::{ToolwireError, ToolwireResult};
use tracing::{debug, info, warn};

/// Callback invoked when the connection breaks after a successful connect.
pub type ErrorHandler = Arc<dyn Fn(&ToolwireError) + Send + Sync>;

/// Callback invoked with the params of a server notification.
pub type NotificationHandler = Arc<dyn Fn(Option<Value>) + Send + Sync>;

type PendingMap = HashMap<u64, oneshot::Sender<JsonRpcMessage>>;

/// State shared between the client and its router task.
struct Shared {
    server_name: String,
    pending: Mutex<PendingMap>,
    notification_handlers: RwLock<HashMap<String, NotificationHandler>>,
    error_handler: RwLock<Option<ErrorHandler>>,
    /// Set once the handshake finished; earlier failures go to the caller only.
    ready: AtomicBool,
    closed: AtomicBool,
}

impl Shared {
    fn report(&self, error: ToolwireError) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let handler = self.error_handler.read().clone();
        match handler {
            Some(handler) => handler(&error),
            None => warn!(server = %self.server_name, error = %error, "MCP connection error"),
        }
    }
}

/// Removes a pending request slot when the waiting future goes away,
/// whether it completed, timed out, or was cancelled.
struct PendingGuard<'a> {
    shared: &'a Shared,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.shared.pending.lock().remove(&self.id);
    }
}

/// A live, initialized connection to one MCP server.
pub struct McpClient {
    shared: Arc<Shared>,
    transport: Arc<dyn Transport>,
    next_id: AtomicU64,
    timeout: Duration,
    router: Mutex<Option<JoinHandle<()>>>,
    server_info: Option<ServerInfo>,
    capabilities: ServerCapabilities,
}

impl McpClient {
    /// Start `transport` and perform the initialization handshake.
    ///
    /// The whole sequence must finish within `timeout`, which also becomes
    /// the default deadline for later requests. On failure the transport is
    /// closed before the error is returned.
    pub async fn connect(
        server_name: impl Into<String>,
        transport: Arc<dyn Transport>,
        timeout: Duration,
    ) -> ToolwireResult<Self> {
        let server_name = server_name.into();
        let attempt = Self::handshake(server_name.clone(), transport.clone(), timeout);

        let result = match tokio::time::timeout(timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(ToolwireError::Timeout(format!(
                "connecting to MCP server '{server_name}' took longer than {}ms",
                timeout.as_millis()
            ))),
        };

        if result.is_err() {
            if let Err(e) = transport.close().await {
                debug!(server = %server_name, error = %e, "Failed to close transport after connect failure");
            }
        }
        result
    }

    async fn handshake(
        server_name: String,
        transport: Arc<dyn Transport>,
        timeout: Duration,
    ) -> ToolwireResult<Self> {
        let inbound = transport.start().await?;

        let shared = Arc::new(Shared {
            server_name,
            pending: Mutex::new(HashMap::new()),
            notification_handlers: RwLock::new(HashMap::new()),
            error_handler: RwLock::new(None),
            ready: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });
        let router = tokio::spawn(route_inbound(shared.clone(), transport.clone(), inbound));

        let mut client = Self {
            shared,
            transport,
            next_id: AtomicU64::new(1),
            timeout,
            router: Mutex::new(Some(router)),
            server_info: None,
            capabilities: ServerCapabilities::default(),
        };

        let init = client.initialize().await?;
        info!(
            server = %client.shared.server_name,
            transport = %client.transport.kind(),
            version = %init.protocol_version,
            "MCP server initialized"
        );
        client.server_info = init.server_info;
        client.capabilities = init.capabilities;

        client.notify("notifications/initialized", None).await?;
        client.shared.ready.store(true, Ordering::SeqCst);
        Ok(client)
    }

    async fn initialize(&self) -> ToolwireResult<InitializeResult> {
        let params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "toolwire",
                "version": env!("CARGO_PKG_VERSION")
            }
        });
        self.request_as("initialize", Some(params)).await
    }

    /// Send a request and wait for its result using the connection timeout.
    pub async fn request(&self, method: &str, params: Option<Value>) -> ToolwireResult<Value> {
        self.request_within(method, params, self.timeout).await
    }

    /// Send a request and wait at most `timeout` for its result.
    pub async fn request_within(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> ToolwireResult<Value> {
        if self.is_closed() {
            return Err(ToolwireError::Connection(format!(
                "connection to '{}' is closed",
                self.shared.server_name
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().insert(id, tx);
        let _guard = PendingGuard {
            shared: &self.shared,
            id,
        };

        self.send(&JsonRpcMessage::request(id, method, params)).await?;

        let resp = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(_)) => {
                return Err(ToolwireError::Connection(format!(
                    "connection to '{}' closed while waiting for '{method}'",
                    self.shared.server_name
                )))
            }
            Err(_) => {
                return Err(ToolwireError::Timeout(format!(
                    "MCP request '{method}' to '{}' timed out after {}ms",
                    self.shared.server_name,
                    timeout.as_millis()
                )))
            }
        };

        if let Some(err) = resp.error {
            return Err(ToolwireError::Protocol(format!(
                "MCP error {}: {}",
                err.code, err.message
            )));
        }
        Ok(resp.result.unwrap_or(Value::Null))
    }

    /// Send a request and deserialize its result into `T`.
    pub async fn request_as<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> ToolwireResult<T> {
        let value = self.request(method, params).await?;
        serde_json::from_value(value).map_err(|e| {
            ToolwireError::Protocol(format!("unexpected '{method}' result shape: {e}"))
        })
    }

    /// Send a notification; no response is expected.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> ToolwireResult<()> {
        self.send(&JsonRpcMessage::notification(method, params)).await
    }

    /// Write one message. HTTP-based transports only learn that the server
    /// is gone from a failed write, so connection failures after the
    /// handshake also go to the error handler.
    async fn send(&self, message: &JsonRpcMessage) -> ToolwireResult<()> {
        let result = self.transport.send(message).await;
        if let Err(ToolwireError::Connection(reason)) = &result {
            if self.shared.ready.load(Ordering::SeqCst) {
                self.shared.report(ToolwireError::Connection(reason.clone()));
            }
        }
        result
    }

    pub async fn list_tools(&self) -> ToolwireResult<Vec<McpToolDef>> {
        let value = self.request("tools/list", None).await?;
        let result: ListToolsResult = parse_listing("tools/list", value)?;
        Ok(result.tools)
    }

    pub async fn list_prompts(&self) -> ToolwireResult<Vec<McpPromptDef>> {
        let value = self.request("prompts/list", None).await?;
        let result: ListPromptsResult = parse_listing("prompts/list", value)?;
        Ok(result.prompts)
    }

    /// Call a tool by its server-side name.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        timeout: Duration,
    ) -> ToolwireResult<McpToolResult> {
        let params = serde_json::json!({
            "name": name,
            "arguments": arguments,
        });
        let value = self.request_within("tools/call", Some(params), timeout).await?;
        serde_json::from_value(value)
            .map_err(|e| ToolwireError::Protocol(format!("unexpected 'tools/call' result shape: {e}")))
    }

    /// Install the handler called when the connection breaks. Replaces any
    /// previous handler. Not called for failures after [`close`](Self::close).
    pub fn on_error(&self, handler: ErrorHandler) {
        *self.shared.error_handler.write() = Some(handler);
    }

    pub fn set_notification_handler(
        &self,
        method: impl Into<String>,
        handler: NotificationHandler,
    ) {
        self.shared
            .notification_handlers
            .write()
            .insert(method.into(), handler);
    }

    /// Close the connection. Terminal and idempotent.
    pub async fn close(&self) -> ToolwireResult<()> {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let result = self.transport.close().await;
        if let Some(router) = self.router.lock().take() {
            router.abort();
        }
        self.shared.pending.lock().clear();
        debug!(server = %self.shared.server_name, "MCP connection closed");
        result
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    pub fn server_name(&self) -> &str {
        &self.shared.server_name
    }

    /// Server identity reported during initialization, if any.
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    pub fn capabilities(&self) -> &ServerCapabilities {
        &self.capabilities
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Drop for McpClient {
    fn drop(&mut self) {
        if let Some(router) = self.router.lock().take() {
            router.abort();
        }
    }
}

impl fmt::Debug for McpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("McpClient")
            .field("server_name", &self.shared.server_name)
            .field("transport", &self.transport.kind())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

fn parse_listing<T: DeserializeOwned + Default>(method: &str, value: Value) -> ToolwireResult<T> {
    if value.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(value)
        .map_err(|e| ToolwireError::Protocol(format!("unexpected '{method}' result shape: {e}")))
}

async fn route_inbound(
    shared: Arc<Shared>,
    transport: Arc<dyn Transport>,
    mut inbound: mpsc::Receiver<TransportEvent>,
) {
    while let Some(event) = inbound.recv().await {
        match event {
            TransportEvent::Message(msg) if msg.is_response() => {
                let Some(id) = msg.numeric_id() else {
                    debug!(server = %shared.server_name, id = ?msg.id, "Response with unknown id");
                    continue;
                };
                let waiter = shared.pending.lock().remove(&id);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(msg);
                    }
                    None => {
                        debug!(server = %shared.server_name, id, "Response for a request nobody is waiting on");
                    }
                }
            }
            TransportEvent::Message(msg) if msg.is_request() => {
                answer_server_request(&shared, transport.as_ref(), msg).await;
            }
            TransportEvent::Message(msg) => {
                let Some(method) = msg.method.as_deref() else {
                    continue;
                };
                let handler = shared.notification_handlers.read().get(method).cloned();
                match handler {
                    Some(handler) => handler(msg.params),
                    None => debug!(server = %shared.server_name, method, "Unhandled notification"),
                }
            }
            TransportEvent::Error(e) => {
                shared.report(ToolwireError::Connection(e));
            }
            TransportEvent::Closed => {
                shared.report(ToolwireError::Connection(format!(
                    "MCP server '{}' closed the connection",
                    shared.server_name
                )));
                break;
            }
        }
    }
    // Wake every waiter: their senders are dropped here.
    shared.pending.lock().clear();
}

/// Reply to a request initiated by the server. Only `ping` is supported.
async fn answer_server_request(shared: &Shared, transport: &dyn Transport, msg: JsonRpcMessage) {
    let (Some(id), Some(method)) = (msg.id, msg.method) else {
        return;
    };
    let reply = if method == "ping" {
        JsonRpcMessage::response(id, serde_json::json!({}))
    } else {
        debug!(server = %shared.server_name, method = %method, "Rejecting unsupported server request");
        JsonRpcMessage::error_response(id, JsonRpcError::method_not_found(&method))
    };
    if let Err(e) = transport.send(&reply).await {
        debug!(server = %shared.server_name, error = %e, "Failed to answer server request");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::transport::{InMemoryTransport, RequestHandler};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    struct FakeServer;

    #[async_trait]
    impl RequestHandler for FakeServer {
        async fn handle(&self, method: &str, params: Option<Value>) -> Result<Value, JsonRpcError> {
            match method {
                "initialize" => Ok(json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": "fake", "version": "0.1"}
                })),
                "tools/list" => Ok(json!({"tools": [
                    {"name": "read_file", "description": "Read a file",
                     "inputSchema": {"type": "object"}}
                ]})),
                "prompts/list" => Ok(Value::Null),
                "tools/call" => {
                    let params = params.unwrap_or_default();
                    Ok(json!({
                        "content": [{"type": "text", "text": format!("called {}", params["name"].as_str().unwrap_or(""))}],
                        "isError": false
                    }))
                }
                "slow" => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(Value::Null)
                }
                "broken" => Err(JsonRpcError::new(-32000, "kaput")),
                other => Err(JsonRpcError::method_not_found(other)),
            }
        }
    }

    async fn connect() -> (McpClient, Arc<InMemoryTransport>) {
        let transport = Arc::new(InMemoryTransport::new(Arc::new(FakeServer)));
        let client = McpClient::connect("fake", transport.clone(), Duration::from_secs(5))
            .await
            .unwrap();
        (client, transport)
    }

    #[tokio::test]
    async fn test_connect_performs_handshake() {
        let (client, _) = connect().await;
        assert_eq!(client.server_info().unwrap().name, "fake");
        assert!(client.capabilities().tools.is_some());
        assert!(!client.is_closed());
    }

    #[tokio::test]
    async fn test_list_tools_and_empty_prompts() {
        let (client, _) = connect().await;
        let tools = client.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name.as_deref(), Some("read_file"));
        assert!(client.list_prompts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_call_tool() {
        let (client, _) = connect().await;
        let result = client
            .call_tool("read_file", json!({}), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(result.content[0].text, "called read_file");
    }

    #[tokio::test]
    async fn test_server_error_is_protocol_error() {
        let (client, _) = connect().await;
        let err = client.request("broken", None).await.unwrap_err();
        assert!(matches!(err, ToolwireError::Protocol(_)));
        assert!(err.to_string().contains("kaput"));
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let (client, _) = connect().await;
        let err = client
            .request_within("slow", None, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolwireError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_notification_handler_receives_params() {
        let (client, transport) = connect().await;
        let (tx, mut rx) = mpsc::channel(1);
        client.set_notification_handler(
            "notifications/message",
            Arc::new(move |params| {
                let _ = tx.try_send(params);
            }),
        );
        transport
            .emit(TransportEvent::Message(JsonRpcMessage::notification(
                "notifications/message",
                Some(json!({"level": "info", "data": "hello"})),
            )))
            .await
            .unwrap();
        let params = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(params["data"], "hello");
    }

    #[tokio::test]
    async fn test_transport_error_reaches_error_handler() {
        let (client, transport) = connect().await;
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        client.on_error(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        transport
            .emit(TransportEvent::Error("pipe broke".into()))
            .await
            .unwrap();
        for _ in 0..50 {
            if hits.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close_is_terminal() {
        let (client, _) = connect().await;
        client.close().await.unwrap();
        client.close().await.unwrap();
        assert!(client.is_closed());
        let err = client.list_tools().await.unwrap_err();
        assert!(matches!(err, ToolwireError::Connection(_)));
    }

    struct Silent;

    #[async_trait]
    impl RequestHandler for Silent {
        async fn handle(
            &self,
            _method: &str,
            _params: Option<Value>,
        ) -> Result<Value, JsonRpcError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_connect_timeout() {
        let transport = Arc::new(InMemoryTransport::new(Arc::new(Silent)));
        let err = McpClient::connect("silent", transport, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolwireError::Timeout(_)));
    }
}
