//! In-process transport backed by a [`RequestHandler`].
//!
//! Used to embed an MCP server in the same process and to drive the client
//! and orchestrator in tests without spawning anything.

use super::{Transport, TransportEvent, TransportKind, INBOUND_CAPACITY};
use crate::protocol::{JsonRpcError, JsonRpcMessage};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use toolwire_core::{ToolwireError, ToolwireResult};

/// Server-side logic answering requests sent over an [`InMemoryTransport`].
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, method: &str, params: Option<Value>) -> Result<Value, JsonRpcError>;
}

pub struct InMemoryTransport {
    handler: Arc<dyn RequestHandler>,
    inbound: Mutex<Option<mpsc::Sender<TransportEvent>>>,
    started: Mutex<bool>,
}

impl InMemoryTransport {
    pub fn new(handler: Arc<dyn RequestHandler>) -> Self {
        Self {
            handler,
            inbound: Mutex::new(None),
            started: Mutex::new(false),
        }
    }

    /// Push an event to the client as if the server had produced it.
    pub async fn emit(&self, event: TransportEvent) -> ToolwireResult<()> {
        let tx = self.sender()?;
        tx.send(event)
            .await
            .map_err(|_| ToolwireError::Connection("in-memory client went away".into()))
    }

    fn sender(&self) -> ToolwireResult<mpsc::Sender<TransportEvent>> {
        self.inbound
            .lock()
            .clone()
            .ok_or_else(|| ToolwireError::Connection("in-memory transport is not running".into()))
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::InMemory
    }

    async fn start(&self) -> ToolwireResult<mpsc::Receiver<TransportEvent>> {
        let mut started = self.started.lock();
        if *started {
            return Err(ToolwireError::Connection(
                "in-memory transport already started".into(),
            ));
        }
        *started = true;
        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        *self.inbound.lock() = Some(tx);
        Ok(rx)
    }

    async fn send(&self, message: &JsonRpcMessage) -> ToolwireResult<()> {
        let tx = self.sender()?;

        // Notifications and replies to server requests need no answer.
        let (Some(id), Some(method)) = (message.id.clone(), message.method.as_deref()) else {
            return Ok(());
        };

        // Answer off the caller's task so slow handlers behave like a remote server.
        let handler = self.handler.clone();
        let method = method.to_string();
        let params = message.params.clone();
        tokio::spawn(async move {
            let reply = match handler.handle(&method, params).await {
                Ok(result) => JsonRpcMessage::response(id, result),
                Err(error) => JsonRpcMessage::error_response(id, error),
            };
            let _ = tx.send(TransportEvent::Message(reply)).await;
        });
        Ok(())
    }

    async fn close(&self) -> ToolwireResult<()> {
        self.inbound.lock().take();
        Ok(())
    }
}
