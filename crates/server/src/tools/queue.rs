//! Queue tools: inspect, cancel, clear.

use comfy_mcp_comfyui::api::QueueEntry;
use comfy_mcp_core::graph::parse_workflow;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::schema::{self, properties};
use super::{to_json, ToolDefinition};
use crate::error::{ToolError, ToolResult};
use crate::state::AppState;

pub const GET_QUEUE: &str = "comfy_get_queue";
pub const CANCEL_GENERATION: &str = "comfy_cancel_generation";
pub const CLEAR_QUEUE: &str = "comfy_clear_queue";

#[derive(Debug, Deserialize)]
pub struct CancelGenerationInput {
    #[serde(default)]
    pub prompt_id: Option<String>,
    #[serde(default = "default_true")]
    pub delete_from_queue: bool,
}

#[derive(Debug, Deserialize)]
pub struct ClearQueueInput {
    #[serde(default)]
    pub confirm: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
struct QueueRow {
    prompt_id: String,
    number: i64,
    workflow_summary: String,
}

impl From<&QueueEntry> for QueueRow {
    fn from(entry: &QueueEntry) -> Self {
        let workflow_summary = parse_workflow(&entry.prompt)
            .map(|w| w.summary())
            .unwrap_or_else(|_| "workflow".to_string());
        Self {
            prompt_id: entry.prompt_id.clone(),
            number: entry.number,
            workflow_summary,
        }
    }
}

pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: GET_QUEUE,
            description: "Get the current generation queue, including running and pending items.",
            input_schema: schema::object(properties([]), &[]),
        },
        ToolDefinition {
            name: CANCEL_GENERATION,
            description: "Cancel a specific generation or interrupt the currently executing \
                generation. Can optionally remove the prompt from the queue.",
            input_schema: schema::object(
                properties([
                    ("prompt_id", schema::string("Prompt to cancel")),
                    (
                        "delete_from_queue",
                        schema::boolean("Also remove the prompt from the pending queue", true),
                    ),
                ]),
                &[],
            ),
        },
        ToolDefinition {
            name: CLEAR_QUEUE,
            description: "Clear all pending items from the queue (does not affect the running \
                generation). Requires confirm=true.",
            input_schema: schema::object(
                properties([("confirm", schema::boolean("Must be true to clear", false))]),
                &[],
            ),
        },
    ]
}

pub async fn get_queue(state: &AppState) -> ToolResult<Value> {
    let queue = state.api.get_queue().await?;

    let running: Vec<QueueRow> = queue.queue_running.iter().map(QueueRow::from).collect();
    let pending: Vec<QueueRow> = queue.queue_pending.iter().map(QueueRow::from).collect();
    let summary = format!("{} running, {} pending", running.len(), pending.len());

    Ok(json!({
        "running": to_json(&running)?,
        "pending": to_json(&pending)?,
        "summary": summary,
    }))
}

pub async fn cancel_generation(
    state: &AppState,
    input: CancelGenerationInput,
) -> ToolResult<Value> {
    let Some(prompt_id) = input.prompt_id else {
        state.api.interrupt().await?;
        tracing::info!("Interrupted current generation");
        return Ok(json!({
            "cancelled": true,
            "message": "Current generation interrupted",
        }));
    };

    if input.delete_from_queue {
        state.api.delete_queue_item(&prompt_id).await?;
    }
    state.api.interrupt().await?;
    tracing::info!(prompt_id = %prompt_id, deleted = input.delete_from_queue, "Cancelled generation");

    Ok(json!({
        "cancelled": true,
        "prompt_id": prompt_id,
        "message": format!("Generation {prompt_id} cancelled"),
    }))
}

pub async fn clear_queue(state: &AppState, input: ClearQueueInput) -> ToolResult<Value> {
    if !input.confirm {
        return Err(ToolError::validation("Set confirm=true to clear the queue"));
    }

    let count = state.api.get_queue().await?.queue_pending.len();
    state.api.clear_queue().await?;
    tracing::info!(count, "Cleared pending queue");

    Ok(json!({
        "cleared": true,
        "count": count,
        "message": format!("Cleared {count} pending items from queue"),
    }))
}
