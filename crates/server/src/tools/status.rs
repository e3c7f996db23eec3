//! `comfy_get_status` and `comfy_wait_for_completion`.

use std::path::Path;
use std::time::{Duration, Instant};

use comfy_mcp_comfyui::api::{ComfyUIApi, HistoryEntry, QueueEntry};
use comfy_mcp_comfyui::watch::WatchError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::schema::{self, properties};
use super::{to_json, ToolDefinition};
use crate::error::{ToolError, ToolResult};
use crate::state::AppState;

pub const GET_STATUS: &str = "comfy_get_status";
pub const WAIT_FOR_COMPLETION: &str = "comfy_wait_for_completion";

/// History poll interval once the WebSocket has reported completion.
const SETTLE_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Deserialize)]
pub struct GetStatusInput {
    #[serde(default)]
    pub prompt_id: Option<String>,
    #[serde(default = "default_true")]
    pub include_outputs: bool,
}

#[derive(Debug, Deserialize)]
pub struct WaitForCompletionInput {
    pub prompt_id: String,
    /// Seconds; defaults to the configured timeout.
    #[serde(default)]
    pub timeout: Option<f64>,
    /// Seconds; defaults to the configured poll interval.
    #[serde(default)]
    pub poll_interval: Option<f64>,
}

fn default_true() -> bool {
    true
}

/// Images written by one output node, as full filesystem paths.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeImages {
    pub node_id: String,
    pub images: Vec<String>,
    pub filename: String,
}

/// Group a history entry's images by node, resolved under `output_dir`.
pub fn collect_outputs(entry: &HistoryEntry, output_dir: &Path) -> Vec<NodeImages> {
    entry
        .outputs
        .iter()
        .filter(|(_, output)| !output.images.is_empty())
        .map(|(node_id, output)| NodeImages {
            node_id: node_id.clone(),
            images: output
                .images
                .iter()
                .map(|img| {
                    output_dir
                        .join(&img.subfolder)
                        .join(&img.filename)
                        .display()
                        .to_string()
                })
                .collect(),
            filename: output
                .images
                .iter()
                .map(|img| img.filename.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        })
        .collect()
}

fn history_status(entry: &HistoryEntry) -> &'static str {
    if entry.is_error() {
        "failed"
    } else {
        "completed"
    }
}

pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: GET_STATUS,
            description: "Get the current status of a specific generation or the overall queue. \
                Returns queue position and output paths when available.",
            input_schema: schema::object(
                properties([
                    ("prompt_id", schema::string("Prompt to inspect; omit for a queue overview")),
                    ("include_outputs", schema::boolean("Include output image paths", true)),
                ]),
                &[],
            ),
        },
        ToolDefinition {
            name: WAIT_FOR_COMPLETION,
            description: "Block until a generation completes or fails. Returns final outputs \
                with image paths.",
            input_schema: schema::object(
                properties([
                    ("prompt_id", schema::string("Prompt to wait for")),
                    ("timeout", schema::number("Seconds to wait before giving up")),
                    ("poll_interval", schema::number("Seconds between history polls")),
                ]),
                &["prompt_id"],
            ),
        },
    ]
}

pub async fn get_status(state: &AppState, input: GetStatusInput) -> ToolResult<Value> {
    let Some(prompt_id) = input.prompt_id else {
        let queue = state.api.get_queue().await?;
        let entries = |list: &[QueueEntry]| {
            list.iter()
                .map(|e| json!({ "prompt_id": e.prompt_id, "number": e.number }))
                .collect::<Vec<_>>()
        };
        return Ok(json!({
            "queue_running": entries(&queue.queue_running),
            "queue_pending": entries(&queue.queue_pending),
        }));
    };

    let history = state.api.get_history(Some(&prompt_id)).await?;
    if let Some(entry) = history.get(&prompt_id) {
        let mut result = json!({
            "prompt_id": prompt_id,
            "status": history_status(entry),
        });
        if input.include_outputs {
            let outputs = collect_outputs(entry, &state.config.output_dir());
            if !outputs.is_empty() {
                result["outputs"] = to_json(&outputs)?;
            }
        }
        if entry.is_error() {
            if let Some(status) = &entry.status {
                result["messages"] = Value::Array(status.messages.clone());
            }
        }
        return Ok(result);
    }

    let queue = state.api.get_queue().await?;
    if let Some(running) = queue
        .queue_running
        .iter()
        .find(|e| e.prompt_id == prompt_id)
    {
        return Ok(json!({
            "prompt_id": prompt_id,
            "status": "executing",
            "number": running.number,
        }));
    }
    if let Some(position) = queue.pending_position(&prompt_id) {
        return Ok(json!({
            "prompt_id": prompt_id,
            "status": "queued",
            "queue_position": position,
            "pending_total": queue.queue_pending.len(),
        }));
    }

    Ok(json!({
        "prompt_id": prompt_id,
        "status": "not_found",
        "message": "Prompt not found in queue or history",
    }))
}

pub async fn wait_for_completion(
    state: &AppState,
    input: WaitForCompletionInput,
) -> ToolResult<Value> {
    let timeout = seconds("timeout", input.timeout)?.unwrap_or_else(|| state.config.timeout());
    let poll_interval =
        seconds("poll_interval", input.poll_interval)?.unwrap_or_else(|| state.config.poll_interval());

    let started = Instant::now();
    let deadline = started.checked_add(timeout).ok_or_else(|| {
        ToolError::Validation(format!(
            "timeout is out of range, got {} seconds",
            timeout.as_secs_f64()
        ))
    })?;
    let prompt_id = input.prompt_id;

    tracing::info!(
        prompt_id = %prompt_id,
        timeout_secs = timeout.as_secs_f64(),
        websocket = state.config.features.websocket_progress,
        "Waiting for completion",
    );

    let entry = if state.config.features.websocket_progress {
        watch_then_poll(state, &prompt_id, timeout, poll_interval, deadline).await?
    } else {
        poll_history(&state.api, &prompt_id, poll_interval, deadline).await?
    };
    let elapsed = started.elapsed().as_secs_f64();

    let Some(entry) = entry else {
        tracing::warn!(prompt_id = %prompt_id, elapsed, "Timed out waiting for completion");
        return Ok(json!({
            "prompt_id": prompt_id,
            "status": "timeout",
            "execution_time": elapsed,
            "message": format!("Timeout after {} seconds", timeout.as_secs_f64()),
        }));
    };

    let outputs = collect_outputs(&entry, &state.config.output_dir());
    Ok(json!({
        "prompt_id": prompt_id,
        "status": history_status(&entry),
        "outputs": to_json(&outputs)?,
        "execution_time": elapsed,
    }))
}

/// Race the WebSocket watcher against history polling.
///
/// Polling keeps running while the watcher connects, so a prompt that
/// finished before the socket opened is still picked up. If the watcher
/// cannot connect or the socket drops, polling alone decides.
async fn watch_then_poll(
    state: &AppState,
    prompt_id: &str,
    timeout: Duration,
    poll_interval: Duration,
    deadline: Instant,
) -> ToolResult<Option<HistoryEntry>> {
    let poll = poll_history(&state.api, prompt_id, poll_interval, deadline);
    tokio::pin!(poll);

    tokio::select! {
        polled = &mut poll => polled,
        watched = state.watcher.wait(prompt_id, timeout) => match watched {
            Ok(summary) => {
                tracing::debug!(
                    prompt_id,
                    executed = summary.executed_nodes.len(),
                    cached = summary.cached_nodes.len(),
                    "WebSocket reported completion",
                );
                poll_history(&state.api, prompt_id, SETTLE_POLL_INTERVAL, deadline).await
            }
            Err(WatchError::Execution { node_id, exception_type, message }) => {
                Err(ToolError::Execution {
                    message: format!("Execution failed at node {node_id}: {message}"),
                    details: Some(json!({
                        "prompt_id": prompt_id,
                        "node_id": node_id,
                        "exception_type": exception_type,
                    })),
                })
            }
            Err(WatchError::Interrupted) => Err(ToolError::Execution {
                message: format!("Generation {prompt_id} was interrupted"),
                details: None,
            }),
            Err(WatchError::Timeout(_)) => Ok(None),
            Err(e) => {
                tracing::info!(prompt_id, error = %e, "WebSocket watch unavailable, polling history");
                poll.await
            }
        },
    }
}

/// Poll `/history/{prompt_id}` until it appears or `deadline` passes.
async fn poll_history(
    api: &ComfyUIApi,
    prompt_id: &str,
    interval: Duration,
    deadline: Instant,
) -> ToolResult<Option<HistoryEntry>> {
    loop {
        let mut history = api.get_history(Some(prompt_id)).await?;
        if let Some(entry) = history.remove(prompt_id) {
            return Ok(Some(entry));
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}

fn seconds(field: &str, value: Option<f64>) -> ToolResult<Option<Duration>> {
    match value {
        None => Ok(None),
        Some(v) if v > 0.0 => Duration::try_from_secs_f64(v).map(Some).map_err(|_| {
            ToolError::Validation(format!("{field} is out of range, got {v} seconds"))
        }),
        Some(v) => Err(ToolError::Validation(format!(
            "{field} must be a positive number of seconds, got {v}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::path::PathBuf;

    fn entry(value: Value) -> HistoryEntry {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn outputs_resolve_subfolders() {
        let entry = entry(json!({
            "prompt": [],
            "outputs": {
                "9": { "images": [
                    { "filename": "a_00001_.png", "subfolder": "", "type": "output" },
                    { "filename": "a_00002_.png", "subfolder": "batch", "type": "output" }
                ] },
                "12": { "text": ["no images here"] }
            },
            "status": { "status_str": "success", "completed": true, "messages": [] }
        }));

        let outputs = collect_outputs(&entry, &PathBuf::from("/comfy/output"));
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].node_id, "9");
        assert_eq!(
            outputs[0].images,
            vec!["/comfy/output/a_00001_.png", "/comfy/output/batch/a_00002_.png"]
        );
        assert_eq!(outputs[0].filename, "a_00001_.png, a_00002_.png");
        assert_eq!(history_status(&entry), "completed");
    }

    #[test]
    fn errored_history_is_failed() {
        let entry = entry(json!({
            "outputs": {},
            "status": { "status_str": "error", "completed": false, "messages": [] }
        }));
        assert_eq!(history_status(&entry), "failed");
    }

    #[test]
    fn seconds_must_be_positive() {
        assert_eq!(seconds("timeout", None).unwrap(), None);
        assert_eq!(
            seconds("timeout", Some(1.5)).unwrap(),
            Some(Duration::from_millis(1500))
        );
        assert!(seconds("timeout", Some(0.0)).is_err());
        assert!(seconds("poll_interval", Some(f64::INFINITY)).is_err());
        assert!(seconds("poll_interval", Some(f64::NAN)).is_err());
    }

    #[test]
    fn huge_seconds_are_rejected() {
        assert_matches!(
            seconds("timeout", Some(1e300)),
            Err(ToolError::Validation(msg)) if msg.starts_with("timeout is out of range")
        );
        assert!(seconds("timeout", Some(f64::MAX)).is_err());
    }

    #[test]
    fn get_status_defaults_include_outputs() {
        let input: GetStatusInput = serde_json::from_value(json!({})).unwrap();
        assert!(input.include_outputs);
        assert!(input.prompt_id.is_none());
    }
}
