//! REST API client for the ComfyUI HTTP endpoints.
//!
//! Wraps workflow submission, queue inspection and management, history
//! retrieval, interruption and node metadata using [`reqwest`].

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// HTTP client for a single ComfyUI instance.
#[derive(Debug, Clone)]
pub struct ComfyUIApi {
    client: reqwest::Client,
    api_url: String,
}

/// Generate a client ID for `/prompt` submissions and WebSocket sessions.
pub fn generate_client_id() -> String {
    format!("mcp-{}", uuid::Uuid::new_v4())
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// Response from the `/prompt` endpoint.
///
/// A workflow that fails ComfyUI's validation comes back as HTTP 400 with
/// `error` and `node_errors` and no `prompt_id`; that body is decoded into
/// this type too so callers can show the validation errors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitResponse {
    /// Server-assigned identifier for the queued prompt.
    #[serde(default)]
    pub prompt_id: Option<String>,
    /// Position in the execution queue.
    #[serde(default)]
    pub number: Option<i64>,
    /// Per-node validation errors, keyed by node ID.
    #[serde(default)]
    pub node_errors: Map<String, Value>,
    /// Top-level validation error, present when the prompt was rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl SubmitResponse {
    /// Whether ComfyUI refused to queue the workflow.
    pub fn is_rejected(&self) -> bool {
        self.prompt_id.is_none() || self.error.is_some() || !self.node_errors.is_empty()
    }
}

/// One entry of `queue_running` / `queue_pending`.
///
/// ComfyUI encodes entries as arrays:
/// `[number, prompt_id, prompt, extra_data, outputs_to_execute]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Value>")]
pub struct QueueEntry {
    pub number: i64,
    pub prompt_id: String,
    #[serde(skip_serializing)]
    pub prompt: Value,
}

impl TryFrom<Vec<Value>> for QueueEntry {
    type Error = String;

    fn try_from(items: Vec<Value>) -> Result<Self, Self::Error> {
        let mut items = items.into_iter();
        let number = items
            .next()
            .and_then(|v| v.as_i64())
            .ok_or("queue entry is missing its number")?;
        let prompt_id = items
            .next()
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or("queue entry is missing its prompt_id")?;
        let prompt = items.next().unwrap_or(Value::Null);
        Ok(Self {
            number,
            prompt_id,
            prompt,
        })
    }
}

/// Response from `GET /queue`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueResponse {
    #[serde(default)]
    pub queue_running: Vec<QueueEntry>,
    #[serde(default)]
    pub queue_pending: Vec<QueueEntry>,
}

impl QueueResponse {
    /// 1-based position of a prompt in the pending queue.
    pub fn pending_position(&self, prompt_id: &str) -> Option<usize> {
        self.queue_pending
            .iter()
            .position(|e| e.prompt_id == prompt_id)
            .map(|i| i + 1)
    }

    pub fn is_running(&self, prompt_id: &str) -> bool {
        self.queue_running.iter().any(|e| e.prompt_id == prompt_id)
    }
}

/// An image produced by an output node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputImage {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    /// `output`, `temp` or `input`.
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Outputs of a single node in a history entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeOutput {
    #[serde(default)]
    pub images: Vec<OutputImage>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Execution status recorded in history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryStatus {
    #[serde(default)]
    pub status_str: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub messages: Vec<Value>,
}

/// One prompt in `GET /history`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(default, skip_serializing)]
    pub prompt: Value,
    #[serde(default)]
    pub outputs: BTreeMap<String, NodeOutput>,
    #[serde(default)]
    pub status: Option<HistoryStatus>,
}

impl HistoryEntry {
    /// Whether execution ended in an error.
    pub fn is_error(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.status_str == "error")
    }

    /// `(node_id, image)` pairs for every image output, in node order.
    pub fn images(&self) -> impl Iterator<Item = (&str, &OutputImage)> {
        self.outputs
            .iter()
            .flat_map(|(node, out)| out.images.iter().map(move |img| (node.as_str(), img)))
    }
}

/// Response from `GET /history[/{prompt_id}]`, keyed by prompt ID.
pub type HistoryResponse = BTreeMap<String, HistoryEntry>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from the ComfyUI REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// ComfyUI returned a non-2xx status code.
    #[error("ComfyUI API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl ComfyUIApiError {
    /// The server could not be reached at all.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, ComfyUIApiError::Request(e) if e.is_connect())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ComfyUIApiError::Request(e) if e.is_timeout())
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

impl ComfyUIApi {
    /// Create a new API client for a ComfyUI instance.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://127.0.0.1:8188`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create an API client whose requests time out after `timeout`.
    pub fn with_timeout(
        api_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ComfyUIApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, api_url))
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self { client, api_url }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Submit a workflow for execution.
    ///
    /// Sends `POST /prompt`. A 400 response carrying validation errors is
    /// returned as a rejected [`SubmitResponse`] rather than an error.
    pub async fn submit_workflow(
        &self,
        workflow: &Value,
        client_id: &str,
    ) -> Result<SubmitResponse, ComfyUIApiError> {
        let body = serde_json::json!({
            "prompt": workflow,
            "client_id": client_id,
        });

        let response = self
            .client
            .post(format!("{}/prompt", self.api_url))
            .json(&body)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::BAD_REQUEST {
            let body = response.text().await?;
            return match serde_json::from_str::<SubmitResponse>(&body) {
                Ok(rejected) if rejected.is_rejected() => {
                    tracing::warn!(
                        node_errors = rejected.node_errors.len(),
                        "ComfyUI rejected workflow",
                    );
                    Ok(rejected)
                }
                _ => Err(ComfyUIApiError::ApiError { status: 400, body }),
            };
        }

        Self::parse_response(response).await
    }

    /// Fetch the running and pending queue (`GET /queue`).
    pub async fn get_queue(&self) -> Result<QueueResponse, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/queue", self.api_url))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Retrieve execution history for one prompt, or the whole history.
    ///
    /// Sends `GET /history/{prompt_id}` or `GET /history`. An unknown prompt
    /// yields an empty map.
    pub async fn get_history(
        &self,
        prompt_id: Option<&str>,
    ) -> Result<HistoryResponse, ComfyUIApiError> {
        let url = match prompt_id {
            Some(id) => format!("{}/history/{}", self.api_url, id),
            None => format!("{}/history", self.api_url),
        };
        let response = self.client.get(url).send().await?;

        Self::parse_response(response).await
    }

    /// Interrupt the currently running execution immediately.
    ///
    /// Sends `POST /interrupt`. This does not target a specific prompt; it
    /// interrupts whatever is executing right now.
    pub async fn interrupt(&self) -> Result<(), ComfyUIApiError> {
        let response = self
            .client
            .post(format!("{}/interrupt", self.api_url))
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// Remove a prompt from the pending queue (`POST /queue {delete}`).
    pub async fn delete_queue_item(&self, prompt_id: &str) -> Result<(), ComfyUIApiError> {
        self.post_queue(serde_json::json!({ "delete": [prompt_id] }))
            .await
    }

    /// Remove every pending prompt (`POST /queue {clear}`).
    pub async fn clear_queue(&self) -> Result<(), ComfyUIApiError> {
        self.post_queue(serde_json::json!({ "clear": true })).await
    }

    /// Node type catalogue (`GET /object_info`).
    pub async fn get_object_info(&self) -> Result<Value, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/object_info", self.api_url))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Whether ComfyUI answers `GET /queue` successfully.
    pub async fn health_check(&self) -> bool {
        match self.get_queue().await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(api_url = %self.api_url, error = %e, "ComfyUI health check failed");
                false
            }
        }
    }

    // ---- private helpers ----

    async fn post_queue(&self, body: Value) -> Result<(), ComfyUIApiError> {
        let response = self
            .client
            .post(format!("{}/queue", self.api_url))
            .json(&body)
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ComfyUIApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ComfyUIApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ComfyUIApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ComfyUIApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    /// Assert the response has a success status code, discarding the body.
    async fn check_status(response: reqwest::Response) -> Result<(), ComfyUIApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_id_has_mcp_prefix() {
        let id = generate_client_id();
        assert!(id.starts_with("mcp-"));
        assert_ne!(id, generate_client_id());
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let api = ComfyUIApi::new("http://127.0.0.1:8188/");
        assert_eq!(api.api_url(), "http://127.0.0.1:8188");
    }

    #[test]
    fn accepted_submit_response() {
        let resp: SubmitResponse =
            serde_json::from_value(json!({ "prompt_id": "abc", "number": 3, "node_errors": {} }))
                .unwrap();
        assert!(!resp.is_rejected());
        assert_eq!(resp.number, Some(3));
    }

    #[test]
    fn rejected_submit_response() {
        let resp: SubmitResponse = serde_json::from_value(json!({
            "error": { "type": "prompt_outputs_failed_validation", "message": "Prompt outputs failed validation" },
            "node_errors": { "4": { "errors": [{ "message": "Value not in list" }], "class_type": "CheckpointLoaderSimple" } }
        }))
        .unwrap();
        assert!(resp.is_rejected());
        assert!(resp.prompt_id.is_none());
        assert!(resp.node_errors.contains_key("4"));
    }

    #[test]
    fn queue_entries_decode_from_arrays() {
        let queue: QueueResponse = serde_json::from_value(json!({
            "queue_running": [[0, "run-1", { "3": {} }, {}, ["9"]]],
            "queue_pending": [[1, "pend-1", {}, {}, []], [2, "pend-2", {}, {}, []]]
        }))
        .unwrap();
        assert!(queue.is_running("run-1"));
        assert_eq!(queue.pending_position("pend-2"), Some(2));
        assert_eq!(queue.pending_position("missing"), None);
        assert_eq!(queue.queue_running[0].number, 0);
    }

    #[test]
    fn malformed_queue_entry_is_rejected() {
        let result = serde_json::from_value::<QueueResponse>(json!({
            "queue_running": [["not-a-number"]],
            "queue_pending": []
        }));
        assert!(result.is_err());
    }

    #[test]
    fn history_entry_lists_images() {
        let history: HistoryResponse = serde_json::from_value(json!({
            "abc": {
                "prompt": [1, "abc", {}],
                "outputs": {
                    "9": { "images": [{ "filename": "ComfyUI_00001_.png", "subfolder": "", "type": "output" }] },
                    "12": { "text": ["hello"] }
                },
                "status": { "status_str": "success", "completed": true, "messages": [] }
            }
        }))
        .unwrap();

        let entry = &history["abc"];
        assert!(!entry.is_error());
        let images: Vec<_> = entry.images().collect();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].0, "9");
        assert_eq!(images[0].1.filename, "ComfyUI_00001_.png");
        assert!(entry.outputs["12"].extra.contains_key("text"));
    }

    #[test]
    fn history_error_status_is_detected() {
        let entry: HistoryEntry = serde_json::from_value(json!({
            "outputs": {},
            "status": { "status_str": "error", "completed": false }
        }))
        .unwrap();
        assert!(entry.is_error());
    }
}
