//! Workflow library tools: save, load, list, delete.

use comfy_mcp_core::graph::parse_workflow;
use comfy_mcp_storage::StorageError;
use serde::Deserialize;
use serde_json::{json, Value};

use super::schema::{self, properties};
use super::{blocking, to_json, ToolDefinition};
use crate::error::{ToolError, ToolResult};
use crate::state::AppState;

pub const SAVE_WORKFLOW: &str = "comfy_save_workflow";
pub const LOAD_WORKFLOW: &str = "comfy_load_workflow";
pub const LIST_WORKFLOWS: &str = "comfy_list_workflows";
pub const DELETE_WORKFLOW: &str = "comfy_delete_workflow";

#[derive(Debug, Deserialize)]
pub struct SaveWorkflowInput {
    pub name: String,
    pub workflow: Value,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub overwrite: bool,
}

#[derive(Debug, Deserialize)]
pub struct LoadWorkflowInput {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ListWorkflowsInput {
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteWorkflowInput {
    pub name: String,
    #[serde(default)]
    pub confirm: bool,
}

pub fn definitions() -> Vec<ToolDefinition> {
    let name = || schema::string("Workflow name (letters, numbers, underscores, hyphens)");
    vec![
        ToolDefinition {
            name: SAVE_WORKFLOW,
            description: "Save a workflow JSON to the library for later reuse, with an optional \
                description and tags.",
            input_schema: schema::object(
                properties([
                    ("name", name()),
                    ("workflow", schema::workflow_json("Workflow in ComfyUI API format")),
                    ("description", schema::string("What the workflow does")),
                    ("tags", schema::string_array("Tags for filtering")),
                    ("overwrite", schema::boolean("Replace an existing workflow", false)),
                ]),
                &["name", "workflow"],
            ),
        },
        ToolDefinition {
            name: LOAD_WORKFLOW,
            description: "Load a saved workflow from the library by name. Returns the workflow \
                JSON and metadata.",
            input_schema: schema::object(properties([("name", name())]), &["name"]),
        },
        ToolDefinition {
            name: LIST_WORKFLOWS,
            description: "List saved workflows. Supports filtering by name, description, or tags.",
            input_schema: schema::object(
                properties([
                    ("filter", schema::string("Substring of the name or description")),
                    ("tags", schema::string_array("Keep workflows with any of these tags")),
                ]),
                &[],
            ),
        },
        ToolDefinition {
            name: DELETE_WORKFLOW,
            description: "Delete a saved workflow from the library. Requires confirm=true.",
            input_schema: schema::object(
                properties([
                    ("name", name()),
                    ("confirm", schema::boolean("Must be true to delete", false)),
                ]),
                &["name"],
            ),
        },
    ]
}

fn ensure_enabled(state: &AppState) -> ToolResult<()> {
    if state.config.features.workflow_library {
        Ok(())
    } else {
        Err(ToolError::validation(
            "Workflow library is disabled in configuration (features.workflow_library)",
        ))
    }
}

pub async fn save_workflow(state: &AppState, input: SaveWorkflowInput) -> ToolResult<Value> {
    ensure_enabled(state)?;

    let workflow = parse_workflow(&input.workflow)
        .map_err(|e| ToolError::InvalidWorkflow(e.to_string()))?;

    let path = state.library.path_for(&input.name)?;
    let library = state.library.clone();
    let name = input.name.clone();
    let entry = blocking(move || {
        library
            .save(&name, input.description, input.tags, workflow, input.overwrite)
            .map_err(|e| match e {
                StorageError::WorkflowExists(name) => ToolError::Validation(format!(
                    "Workflow \"{name}\" already exists. Set overwrite=true to replace it."
                )),
                other => other.into(),
            })
    })
    .await?;

    Ok(json!({
        "name": entry.name,
        "path": path.display().to_string(),
        "node_count": entry.workflow.len(),
        "message": format!("Workflow \"{}\" saved successfully", input.name),
    }))
}

pub async fn load_workflow(state: &AppState, input: LoadWorkflowInput) -> ToolResult<Value> {
    ensure_enabled(state)?;

    let library = state.library.clone();
    let entry = blocking(move || Ok(library.load(&input.name)?)).await?;
    to_json(&entry)
}

pub async fn list_workflows(state: &AppState, input: ListWorkflowsInput) -> ToolResult<Value> {
    ensure_enabled(state)?;

    let library = state.library.clone();
    let rows = blocking(move || Ok(library.list(input.filter.as_deref(), &input.tags)?)).await?;

    Ok(json!({
        "total_count": rows.len(),
        "workflows": to_json(&rows)?,
    }))
}

pub async fn delete_workflow(state: &AppState, input: DeleteWorkflowInput) -> ToolResult<Value> {
    ensure_enabled(state)?;
    if !input.confirm {
        return Err(ToolError::validation("Set confirm=true to delete the workflow"));
    }

    let library = state.library.clone();
    let name = input.name.clone();
    blocking(move || Ok(library.delete(&name)?)).await?;

    Ok(json!({
        "name": input.name,
        "deleted": true,
        "message": format!("Workflow \"{}\" deleted successfully", input.name),
    }))
}
