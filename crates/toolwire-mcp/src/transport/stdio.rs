//! Stdio transport. Spawns the server as a subprocess and exchanges
//! newline-delimited JSON-RPC over its stdin/stdout.

use super::{Transport, TransportEvent, TransportKind, INBOUND_CAPACITY};
use crate::protocol::JsonRpcMessage;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, Mutex};
use toolwire_core::{ToolwireError, ToolwireResult};
use tracing::{debug, error};

/// Transport that talks to a locally spawned MCP server.
pub struct StdioTransport {
    server_name: String,
    command: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    cwd: Option<PathBuf>,
    /// Forward every stderr line to the debug log.
    debug: bool,
    stdin: Mutex<Option<ChildStdin>>,
    child: Mutex<Option<Child>>,
}

impl StdioTransport {
    pub fn new(
        server_name: impl Into<String>,
        command: impl Into<String>,
        args: Vec<String>,
        env: HashMap<String, String>,
        cwd: Option<PathBuf>,
        debug: bool,
    ) -> Self {
        Self {
            server_name: server_name.into(),
            command: command.into(),
            args,
            env,
            cwd,
            debug,
            stdin: Mutex::new(None),
            child: Mutex::new(None),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

#[async_trait]
impl Transport for StdioTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Stdio
    }

    async fn start(&self) -> ToolwireResult<mpsc::Receiver<TransportEvent>> {
        let mut child_slot = self.child.lock().await;
        if child_slot.is_some() {
            return Err(ToolwireError::Connection(format!(
                "stdio transport for '{}' already started",
                self.server_name
            )));
        }

        // The child inherits our environment; configured variables win.
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(|e| {
            ToolwireError::Connection(format!(
                "Failed to spawn MCP server '{}' ({}): {}",
                self.server_name, self.command, e
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ToolwireError::Connection("MCP server stdin not available".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ToolwireError::Connection("MCP server stdout not available".into()))?;
        let stderr = child.stderr.take();

        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);

        let server = self.server_name.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<JsonRpcMessage>(trimmed) {
                            Ok(msg) => {
                                if tx.send(TransportEvent::Message(msg)).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                debug!(server = %server, line = %trimmed, error = %e, "Non-JSON-RPC line from MCP server");
                            }
                        }
                    }
                    Ok(None) => {
                        debug!(server = %server, "MCP server stdout closed");
                        let _ = tx.send(TransportEvent::Closed).await;
                        break;
                    }
                    Err(e) => {
                        error!(server = %server, error = %e, "Error reading MCP server stdout");
                        let _ = tx
                            .send(TransportEvent::Error(format!("stdout read failed: {e}")))
                            .await;
                        break;
                    }
                }
            }
        });

        // stderr is always drained so a chatty server cannot block on a full pipe.
        if let Some(stderr) = stderr {
            let server = self.server_name.clone();
            let tap = self.debug;
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if tap {
                        debug!(server = %server, stderr = %line, "MCP server stderr");
                    }
                }
            });
        }

        *self.stdin.lock().await = Some(stdin);
        *child_slot = Some(child);
        Ok(rx)
    }

    async fn send(&self, message: &JsonRpcMessage) -> ToolwireResult<()> {
        let mut line = serde_json::to_string(message)?;
        line.push('\n');

        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or_else(|| {
            ToolwireError::Connection(format!(
                "stdio transport for '{}' is not running",
                self.server_name
            ))
        })?;
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| ToolwireError::Connection(format!("Failed to write to MCP stdin: {e}")))?;
        stdin
            .flush()
            .await
            .map_err(|e| ToolwireError::Connection(format!("Failed to flush stdin: {e}")))?;
        Ok(())
    }

    async fn close(&self) -> ToolwireResult<()> {
        // Dropping stdin lets well-behaved servers exit on EOF before the kill.
        self.stdin.lock().await.take();
        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(e) = child.kill().await {
                debug!(server = %self.server_name, error = %e, "MCP server already exited");
            }
        }
        Ok(())
    }
}
