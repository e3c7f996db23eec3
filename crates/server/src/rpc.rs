//! JSON-RPC 2.0 over newline-delimited stdio.
//!
//! Each input line is one request or notification; each response is written
//! as one line. Stdout carries protocol frames only.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::state::AppState;
use crate::tools::{self, ToolCallError};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "comfyui-mcp";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;

#[derive(Debug, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    /// Absent for notifications.
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Serialize)]
pub struct Response {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl Response {
    fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// Dispatches JSON-RPC requests to the tool handlers.
#[derive(Clone)]
pub struct McpServer {
    state: AppState,
}

impl McpServer {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Read requests from `reader` until EOF, writing responses to `writer`.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            if let Some(response) = self.handle_line(&line).await {
                writer.write_all(response.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }
        tracing::info!("Input closed, shutting down");
        Ok(())
    }

    /// Handle one input line. Returns the serialized response, if any.
    pub async fn handle_line(&self, line: &str) -> Option<String> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let response = match serde_json::from_str::<Value>(line) {
            Err(e) => Some(Response::error(Value::Null, PARSE_ERROR, format!("Parse error: {e}"))),
            Ok(value) => {
                let id = value.get("id").cloned().unwrap_or(Value::Null);
                match serde_json::from_value::<Request>(value) {
                    Ok(request) => self.handle_request(request).await,
                    Err(e) => Some(Response::error(
                        id,
                        INVALID_REQUEST,
                        format!("Invalid request: {e}"),
                    )),
                }
            }
        }?;

        match serde_json::to_string(&response) {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize response");
                None
            }
        }
    }

    /// Handle a parsed request. Notifications never produce a response.
    pub async fn handle_request(&self, request: Request) -> Option<Response> {
        if request.jsonrpc.as_deref().is_some_and(|v| v != "2.0") {
            tracing::debug!(version = ?request.jsonrpc, "Unexpected jsonrpc version");
        }

        let Some(id) = request.id else {
            tracing::debug!(method = %request.method, "Notification");
            return None;
        };

        let response = match request.method.as_str() {
            "initialize" => Response::result(id, initialize_result()),
            "ping" => Response::result(id, json!({})),
            "tools/list" => Response::result(id, json!({ "tools": tools::definitions() })),
            "tools/call" => self.call(id, request.params).await,
            other => Response::error(id, METHOD_NOT_FOUND, format!("Method not found: {other}")),
        };
        Some(response)
    }

    async fn call(&self, id: Value, params: Value) -> Response {
        let params: CallParams = match serde_json::from_value(params) {
            Ok(params) => params,
            Err(e) => return Response::error(id, INVALID_PARAMS, format!("Invalid params: {e}")),
        };

        match tools::call_tool(&self.state, &params.name, params.arguments).await {
            Ok(value) => Response::result(id, tool_content(&value, false)),
            Err(ToolCallError::Tool(err)) => {
                let envelope = err.envelope();
                let value = serde_json::to_value(&envelope).unwrap_or(Value::Null);
                Response::result(id, tool_content(&value, true))
            }
            Err(e @ (ToolCallError::UnknownTool(_) | ToolCallError::InvalidArguments(_))) => {
                Response::error(id, INVALID_PARAMS, e.to_string())
            }
        }
    }
}

fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": { "tools": {} },
        "serverInfo": {
            "name": SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

/// Wrap `value` as pretty-printed text content.
fn tool_content(value: &Value, is_error: bool) -> Value {
    let text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    let mut result = json!({ "content": [{ "type": "text", "text": text }] });
    if is_error {
        result["isError"] = Value::Bool(true);
    }
    result
}
