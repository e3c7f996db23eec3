//! `comfy_list_models`.

use comfy_mcp_storage::models::{scan_models, ModelInfo, ModelKind};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::schema::{self, properties};
use super::{blocking, to_json, ToolDefinition};
use crate::error::{ToolError, ToolResult};
use crate::state::AppState;

pub const LIST_MODELS: &str = "comfy_list_models";

#[derive(Debug, Deserialize)]
pub struct ListModelsInput {
    /// A model kind or `all`.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    /// Case-insensitive substring of the file name.
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub include_size: bool,
}

#[derive(Debug, Serialize)]
struct ModelRow {
    #[serde(rename = "type")]
    kind: ModelKind,
    name: String,
    path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<u64>,
}

pub fn definitions() -> Vec<ToolDefinition> {
    let mut kinds: Vec<&str> = ModelKind::ALL.iter().map(|k| k.as_str()).collect();
    kinds.push("all");

    vec![ToolDefinition {
        name: LIST_MODELS,
        description: "List available models, checkpoints, LoRAs, VAEs, and other resources in \
            the ComfyUI models directory. Supports filtering by type and name.",
        input_schema: schema::object(
            properties([
                ("type", schema::string_enum("Model type", &kinds)),
                ("filter", schema::string("Case-insensitive name filter")),
                ("include_size", schema::boolean("Include file sizes in bytes", false)),
            ]),
            &[],
        ),
    }]
}

fn parse_kind(kind: Option<&str>) -> ToolResult<Option<ModelKind>> {
    match kind {
        None | Some("all") => Ok(None),
        Some(name) => ModelKind::from_name(name).map(Some).ok_or_else(|| {
            ToolError::Validation(format!(
                "Unknown model type '{name}'. Valid types: {}, all",
                ModelKind::ALL
                    .iter()
                    .map(|k| k.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        }),
    }
}

pub async fn list_models(state: &AppState, input: ListModelsInput) -> ToolResult<Value> {
    if !state.config.features.auto_model_detection {
        return Err(ToolError::validation(
            "Model detection is disabled in configuration (features.auto_model_detection)",
        ));
    }

    let kind = parse_kind(input.kind.as_deref())?;
    let models = scan_cached(state, kind).await?;

    let needle = input.filter.as_deref().map(str::to_lowercase);
    let rows: Vec<ModelRow> = models
        .into_iter()
        .filter(|m| {
            needle
                .as_deref()
                .map_or(true, |n| m.name.to_lowercase().contains(n))
        })
        .map(|m| ModelRow {
            kind: m.kind,
            name: m.name,
            path: m.path,
            size: input.include_size.then_some(m.size),
        })
        .collect();

    let mut summary = format!("Found {} model(s)", rows.len());
    if let Some(kind) = kind {
        summary.push_str(&format!(" of type {}", kind.as_str()));
    }
    if let Some(filter) = &input.filter {
        summary.push_str(&format!(" matching \"{filter}\""));
    }

    Ok(json!({
        "models": to_json(&rows)?,
        "total_count": rows.len(),
        "summary": summary,
    }))
}

async fn scan_cached(state: &AppState, kind: Option<ModelKind>) -> ToolResult<Vec<ModelInfo>> {
    let caching = state.config.features.model_caching;
    if caching {
        if let Some(models) = state.model_cache.get(kind) {
            tracing::debug!(count = models.len(), "Model scan served from cache");
            return Ok(models);
        }
    }

    let root = state.config.models_dir();
    let models = blocking(move || Ok(scan_models(&root, kind)?)).await?;

    if caching {
        state.model_cache.put(kind, models.clone());
    }
    Ok(models)
}
