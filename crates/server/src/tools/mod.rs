//! Tool definitions and dispatch.
//!
//! Each submodule owns a group of tools: its argument structs, their
//! JSON schemas, and the async handlers. Handlers return a JSON value that
//! becomes the text content of the tool result.

pub mod files;
pub mod generation;
pub mod library;
pub mod models;
pub mod queue;
pub mod schema;
pub mod status;

use std::fmt::Display;
use std::ops::RangeInclusive;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{ToolError, ToolResult};
use crate::state::AppState;

pub const STEPS_RANGE: RangeInclusive<u32> = 1..=150;
pub const CFG_RANGE: RangeInclusive<f64> = 0.0..=30.0;
pub const DIMENSION_RANGE: RangeInclusive<u32> = 64..=8192;
pub const DENOISE_RANGE: RangeInclusive<f64> = 0.0..=1.0;
pub const BATCH_SIZE_RANGE: RangeInclusive<u32> = 1..=100;

/// Entry of the `tools/list` response.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Failure to run a tool at all, as opposed to a tool reporting an error.
#[derive(Debug, thiserror::Error)]
pub enum ToolCallError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error(transparent)]
    Tool(#[from] ToolError),
}

/// Every tool, in the order `tools/list` reports them.
pub fn definitions() -> Vec<ToolDefinition> {
    let mut tools = Vec::new();
    tools.extend(generation::definitions());
    tools.extend(status::definitions());
    tools.extend(models::definitions());
    tools.extend(library::definitions());
    tools.extend(queue::definitions());
    tools.extend(files::definitions());
    tools
}

/// Run tool `name` with raw JSON `arguments`.
pub async fn call_tool(
    state: &AppState,
    name: &str,
    arguments: Value,
) -> Result<Value, ToolCallError> {
    tracing::debug!(tool = name, "Tool call");

    let result = match name {
        generation::SUBMIT_WORKFLOW => {
            generation::submit_workflow(state, parse_args(arguments)?).await
        }
        generation::GENERATE_SIMPLE => {
            generation::generate_simple(state, parse_args(arguments)?).await
        }
        status::GET_STATUS => status::get_status(state, parse_args(arguments)?).await,
        status::WAIT_FOR_COMPLETION => {
            status::wait_for_completion(state, parse_args(arguments)?).await
        }
        models::LIST_MODELS => models::list_models(state, parse_args(arguments)?).await,
        library::SAVE_WORKFLOW => library::save_workflow(state, parse_args(arguments)?).await,
        library::LOAD_WORKFLOW => library::load_workflow(state, parse_args(arguments)?).await,
        library::LIST_WORKFLOWS => library::list_workflows(state, parse_args(arguments)?).await,
        library::DELETE_WORKFLOW => {
            library::delete_workflow(state, parse_args(arguments)?).await
        }
        queue::GET_QUEUE => queue::get_queue(state).await,
        queue::CANCEL_GENERATION => {
            queue::cancel_generation(state, parse_args(arguments)?).await
        }
        queue::CLEAR_QUEUE => queue::clear_queue(state, parse_args(arguments)?).await,
        files::UPLOAD_IMAGE => files::upload_image(state, parse_args(arguments)?).await,
        files::GET_OUTPUT_IMAGES => {
            files::get_output_images(state, parse_args(arguments)?).await
        }
        other => return Err(ToolCallError::UnknownTool(other.to_string())),
    };

    if let Err(e) = &result {
        tracing::warn!(tool = name, error = %e, "Tool call failed");
    }
    Ok(result?)
}

/// Deserialize tool arguments; absent arguments read as `{}`.
fn parse_args<T: DeserializeOwned>(arguments: Value) -> Result<T, ToolCallError> {
    let arguments = match arguments {
        Value::Null => Value::Object(Map::new()),
        other => other,
    };
    serde_json::from_value(arguments).map_err(|e| ToolCallError::InvalidArguments(e.to_string()))
}

/// Reject `value` when present and outside `range`.
pub(crate) fn check_range<T>(
    field: &str,
    value: Option<T>,
    range: &RangeInclusive<T>,
) -> ToolResult<()>
where
    T: PartialOrd + Display + Copy,
{
    match value {
        Some(v) if !range.contains(&v) => Err(ToolError::Validation(format!(
            "{field} must be between {} and {}, got {v}",
            range.start(),
            range.end()
        ))),
        _ => Ok(()),
    }
}

/// Run blocking filesystem work off the async runtime.
pub(crate) async fn blocking<T, F>(f: F) -> ToolResult<T>
where
    F: FnOnce() -> ToolResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ToolError::Internal(format!("blocking task failed: {e}")))?
}

/// Serialize a handler result.
pub(crate) fn to_json<T: Serialize>(value: &T) -> ToolResult<Value> {
    serde_json::to_value(value).map_err(|e| ToolError::Internal(e.to_string()))
}
