//! Stdio Tool Provider
//!
//! JSON-RPC 2.0 client for tool servers spoken over newline-delimited
//! JSON on a child process's stdin/stdout.
//!
//! ## Lifecycle
//!
//! 1. Spawn `command args…` with piped stdio
//! 2. `initialize` request, then `notifications/initialized`
//! 3. `tools/list` (following `nextCursor`)
//! 4. `tools/call` for each invocation
//!
//! Requests on one connection are serialized by a mutex; different
//! connections proceed independently.

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use chatbot_core::{
    error::{ChatError, Result},
    tool::{ToolArguments, ToolDescriptor, ToolProvider, ToolRegistry},
};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use crate::config::{McpServerConfig, ServerConfigFile};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Errors raised while talking to a tool server
#[derive(Error, Debug)]
pub enum McpError {
    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server closed the connection")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON from server: {0}")]
    Json(#[from] serde_json::Error),

    #[error("server error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("{0}")]
    ToolFailed(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<McpError> for ChatError {
    fn from(err: McpError) -> Self {
        match err {
            McpError::Io(e) => Self::Io(e),
            other => Self::Other(other.to_string()),
        }
    }
}

// ── JSON-RPC framing ───────────────────────────────────────────────

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Serialize)]
struct RpcNotification<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcMessage {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    #[serde(default)]
    pub protocol_version: String,
    #[serde(default)]
    pub server_info: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListToolsResult {
    #[serde(default)]
    tools: Vec<ToolDescriptor>,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallToolResult {
    #[serde(default)]
    content: Vec<ContentItem>,
    #[serde(default)]
    is_error: bool,
}

#[derive(Deserialize)]
struct ContentItem {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl CallToolResult {
    fn joined_text(&self) -> String {
        self.content
            .iter()
            .filter(|c| c.kind == "text")
            .filter_map(|c| c.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// JSON-RPC client over any line-oriented byte stream
pub struct McpClient<R, W> {
    reader: R,
    writer: W,
    next_id: u64,
}

impl<R, W> McpClient<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub const fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            next_id: 1,
        }
    }

    async fn write_line<T: Serialize>(&mut self, message: &T) -> std::result::Result<(), McpError> {
        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Send a request and wait for the response carrying its id
    pub async fn request(&mut self, method: &str, params: Value) -> std::result::Result<Value, McpError> {
        let id = self.next_id;
        self.next_id += 1;

        self.write_line(&RpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        })
        .await?;

        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line).await? == 0 {
                return Err(McpError::Closed);
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let message: RpcMessage = match serde_json::from_str(trimmed) {
                Ok(m) => m,
                Err(e) => {
                    tracing::debug!("Skipping non-JSON line from tool server: {}", e);
                    continue;
                }
            };

            // notifications and server-initiated requests
            if message.method.is_some() {
                continue;
            }
            // a parse or invalid-request error cannot echo our id
            if matches!(message.id, None | Some(Value::Null)) {
                if let Some(err) = message.error {
                    return Err(McpError::Rpc {
                        code: err.code,
                        message: err.message,
                    });
                }
            }
            if message.id.as_ref().and_then(Value::as_u64) != Some(id) {
                tracing::debug!(expected = id, "Skipping response with stale id");
                continue;
            }

            if let Some(err) = message.error {
                return Err(McpError::Rpc {
                    code: err.code,
                    message: err.message,
                });
            }
            return Ok(message.result.unwrap_or(Value::Null));
        }
    }

    pub async fn notify(&mut self, method: &str, params: Value) -> std::result::Result<(), McpError> {
        self.write_line(&RpcNotification {
            jsonrpc: "2.0",
            method,
            params,
        })
        .await
    }

    /// Perform the initialize handshake
    pub async fn initialize(&mut self) -> std::result::Result<ServerInfo, McpError> {
        let result = self
            .request(
                "initialize",
                serde_json::json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": env!("CARGO_PKG_NAME"),
                        "version": env!("CARGO_PKG_VERSION")
                    }
                }),
            )
            .await?;
        let info: ServerInfo = serde_json::from_value(result)?;

        self.notify("notifications/initialized", serde_json::json!({}))
            .await?;
        Ok(info)
    }

    /// Fetch every page of the tool listing
    pub async fn list_tools(&mut self) -> std::result::Result<Vec<ToolDescriptor>, McpError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = cursor
                .as_ref()
                .map_or_else(|| serde_json::json!({}), |c| serde_json::json!({ "cursor": c }));
            let page: ListToolsResult = serde_json::from_value(self.request("tools/list", params).await?)?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if !next.is_empty() && cursor.as_deref() != Some(next.as_str()) => {
                    cursor = Some(next);
                }
                _ => return Ok(tools),
            }
        }
    }

    /// Invoke a tool and collect its text output
    pub async fn call_tool(
        &mut self,
        name: &str,
        arguments: ToolArguments,
    ) -> std::result::Result<String, McpError> {
        let result = self
            .request(
                "tools/call",
                serde_json::json!({ "name": name, "arguments": arguments }),
            )
            .await?;
        let result: CallToolResult = serde_json::from_value(result)?;

        let text = result.joined_text();
        if result.is_error {
            return Err(McpError::ToolFailed(text));
        }
        Ok(text)
    }
}

/// A tool server running as a child process
pub struct StdioToolProvider {
    name: String,
    client: Mutex<McpClient<BufReader<ChildStdout>, ChildStdin>>,
    _child: Child,
}

impl StdioToolProvider {
    /// Spawn the server and complete the handshake
    pub async fn connect(name: impl Into<String>, config: &McpServerConfig) -> std::result::Result<Self, McpError> {
        let name = name.into();
        tracing::info!(server = %name, command = %config.command, "Spawning tool server");

        let mut child = Command::new(&config.command)
            .args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| McpError::Spawn {
                command: config.command.clone(),
                source,
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::Protocol("child stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::Protocol("child stdout unavailable".into()))?;

        let mut client = McpClient::new(BufReader::new(stdout), stdin);
        let info = client.initialize().await?;
        tracing::debug!(server = %name, protocol = %info.protocol_version, "Tool server initialized");

        Ok(Self {
            name,
            client: Mutex::new(client),
            _child: child,
        })
    }
}

#[async_trait]
impl ToolProvider for StdioToolProvider {
    fn id(&self) -> &str {
        &self.name
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        Ok(self.client.lock().await.list_tools().await?)
    }

    async fn call_tool(&self, name: &str, arguments: ToolArguments) -> Result<String> {
        self.client
            .lock()
            .await
            .call_tool(name, arguments)
            .await
            .map_err(|e| ChatError::tool_invocation(name, e.to_string()))
    }
}

/// Connect every configured server and register its tools in file order.
///
/// Servers start concurrently. Those that fail to start or list their
/// tools are logged and skipped.
pub async fn connect_all(config: &ServerConfigFile) -> ToolRegistry {
    let connections = join_all(
        config
            .servers()
            .map(|(name, server)| StdioToolProvider::connect(name.as_str(), server)),
    )
    .await;

    let mut registry = ToolRegistry::new();
    for ((name, _), connection) in config.servers().zip(connections) {
        let provider = match connection {
            Ok(p) => Arc::new(p),
            Err(e) => {
                tracing::error!(server = %name, "Failed to connect tool server: {}", e);
                continue;
            }
        };

        match registry.register_provider(provider).await {
            Ok(count) => tracing::info!(server = %name, tools = count, "Connected tool server"),
            Err(e) => tracing::error!(server = %name, "Failed to list tools: {}", e),
        }
    }

    if !registry.collisions().is_empty() {
        tracing::warn!(
            collisions = registry.collisions().len(),
            "Some tool names are served by more than one provider"
        );
    }
    registry
}
