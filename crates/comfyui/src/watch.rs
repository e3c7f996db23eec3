//! Completion watching over the ComfyUI WebSocket stream.
//!
//! [`CompletionWatcher`] connects with the same client ID that was used to
//! submit a prompt and follows its execution messages until the prompt
//! finishes, fails, is interrupted, or the timeout elapses.

use std::time::Duration;

use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio_tungstenite::tungstenite::{self, Message};

use crate::client::{ComfyUIClient, ComfyUIClientError};
use crate::messages::{parse_message, ComfyUIMessage};

/// What was observed while a prompt executed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WatchSummary {
    pub prompt_id: String,
    /// Nodes that reported output, in order.
    pub executed_nodes: Vec<String>,
    /// Nodes served from cache.
    pub cached_nodes: Vec<String>,
    /// Last `(value, max)` progress update seen.
    pub last_progress: Option<(i64, i64)>,
}

/// Errors from watching a prompt.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error(transparent)]
    Connect(#[from] ComfyUIClientError),

    #[error("Execution failed at node {node_id} ({exception_type}): {message}")]
    Execution {
        node_id: String,
        exception_type: String,
        message: String,
    },

    #[error("Execution was interrupted")]
    Interrupted,

    #[error("WebSocket closed before the prompt finished")]
    Closed,

    #[error("Timed out after {0:?} waiting for completion")]
    Timeout(Duration),

    #[error("WebSocket receive error: {0}")]
    Receive(String),
}

/// Follows prompts submitted under one client ID.
#[derive(Debug, Clone)]
pub struct CompletionWatcher {
    client: ComfyUIClient,
    client_id: String,
}

impl CompletionWatcher {
    pub fn new(ws_url: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            client: ComfyUIClient::new(ws_url),
            client_id: client_id.into(),
        }
    }

    /// Connect and wait for `prompt_id` to finish, for at most `timeout`.
    pub async fn wait(
        &self,
        prompt_id: &str,
        timeout: Duration,
    ) -> Result<WatchSummary, WatchError> {
        let mut conn = self.client.connect(&self.client_id).await?;
        tokio::time::timeout(timeout, watch_stream(&mut conn.ws_stream, prompt_id))
            .await
            .map_err(|_| WatchError::Timeout(timeout))?
    }
}

/// Consume frames from `stream` until `prompt_id` completes.
///
/// Messages for other prompts and unparseable frames are skipped. Completion
/// is an `executing` message with no node, or `execution_success`.
pub async fn watch_stream<S>(stream: &mut S, prompt_id: &str) -> Result<WatchSummary, WatchError>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    let mut summary = WatchSummary {
        prompt_id: prompt_id.to_string(),
        ..Default::default()
    };

    while let Some(msg_result) = stream.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                if handle_text_message(&text, &mut summary)? {
                    return Ok(summary);
                }
            }
            Ok(Message::Binary(_)) => {
                // Preview images.
                tracing::trace!(prompt_id, "Ignoring binary message");
            }
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
            Ok(Message::Close(frame)) => {
                tracing::info!(prompt_id, ?frame, "ComfyUI WebSocket closed");
                return Err(WatchError::Closed);
            }
            Err(e) => {
                tracing::error!(prompt_id, error = %e, "WebSocket receive error");
                return Err(WatchError::Receive(e.to_string()));
            }
        }
    }

    Err(WatchError::Closed)
}

/// Apply one text frame to `summary`. Returns `Ok(true)` on completion.
fn handle_text_message(text: &str, summary: &mut WatchSummary) -> Result<bool, WatchError> {
    let msg = match parse_message(text) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::trace!(error = %e, raw_message = %text, "Skipping unrecognised ComfyUI message");
            return Ok(false);
        }
    };

    if let ComfyUIMessage::Status(data) = &msg {
        tracing::debug!(
            queue_remaining = data.status.exec_info.queue_remaining,
            "ComfyUI queue status",
        );
        return Ok(false);
    }
    if msg.prompt_id() != Some(summary.prompt_id.as_str()) {
        return Ok(false);
    }

    match msg {
        ComfyUIMessage::ExecutionStart(_) => {
            tracing::info!(prompt_id = %summary.prompt_id, "Execution started");
        }
        ComfyUIMessage::ExecutionCached(data) => {
            summary.cached_nodes.extend(data.nodes);
        }
        ComfyUIMessage::Executing(data) => match data.node {
            Some(node) => {
                tracing::debug!(prompt_id = %summary.prompt_id, node = %node, "Executing node");
            }
            None => return Ok(true),
        },
        ComfyUIMessage::Progress(data) => {
            tracing::debug!(
                prompt_id = %summary.prompt_id,
                value = data.value,
                max = data.max,
                percent = data.percent(),
                "Generation progress",
            );
            summary.last_progress = Some((data.value, data.max));
        }
        ComfyUIMessage::Executed(data) => {
            summary.executed_nodes.push(data.node);
        }
        ComfyUIMessage::ExecutionSuccess(_) => return Ok(true),
        ComfyUIMessage::ExecutionInterrupted(_) => return Err(WatchError::Interrupted),
        ComfyUIMessage::ExecutionError(data) => {
            return Err(WatchError::Execution {
                node_id: data.node_id,
                exception_type: data.exception_type,
                message: data.exception_message,
            });
        }
        ComfyUIMessage::Status(_) => {}
    }

    Ok(false)
}
