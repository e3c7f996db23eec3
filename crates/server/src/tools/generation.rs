//! `comfy_submit_workflow` and `comfy_generate_simple`.

use std::path::PathBuf;

use comfy_mcp_comfyui::api::SubmitResponse;
use comfy_mcp_core::error::CoreError;
use comfy_mcp_core::graph::{parse_workflow, Workflow};
use comfy_mcp_core::overrides::{apply_overrides, LoraSpec, OverrideReport, WorkflowOverrides};
use comfy_mcp_core::templates::{Template, TemplateParams};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::schema::{self, properties};
use super::{
    blocking, check_range, to_json, ToolDefinition, BATCH_SIZE_RANGE, CFG_RANGE, DENOISE_RANGE,
    DIMENSION_RANGE, STEPS_RANGE,
};
use crate::error::{ToolError, ToolResult};
use crate::state::AppState;

pub const SUBMIT_WORKFLOW: &str = "comfy_submit_workflow";
pub const GENERATE_SIMPLE: &str = "comfy_generate_simple";

const SUMMARY_PROMPT_CHARS: usize = 50;

#[derive(Debug, Deserialize)]
pub struct SubmitWorkflowInput {
    /// Workflow graph, as an object or a JSON string.
    pub workflow: Value,
    #[serde(default)]
    pub overrides: WorkflowOverrides,
    /// Submit under this client ID instead of the session's.
    #[serde(default)]
    pub client_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateSimpleInput {
    pub prompt: String,
    pub template: String,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    /// Local image path; required by `basic_img2img`.
    #[serde(default)]
    pub input_image: Option<PathBuf>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub steps: Option<u32>,
    #[serde(default)]
    pub cfg: Option<f64>,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub sampler: Option<String>,
    #[serde(default)]
    pub scheduler: Option<String>,
    #[serde(default)]
    pub denoise: Option<f64>,
    #[serde(default)]
    pub batch_size: Option<u32>,
    #[serde(default)]
    pub variant: Option<String>,
    #[serde(default)]
    pub clip: Option<String>,
    #[serde(default)]
    pub vae: Option<String>,
    #[serde(default)]
    pub lora: Vec<LoraSpec>,
}

struct Ranges {
    steps: Option<u32>,
    cfg: Option<f64>,
    width: Option<u32>,
    height: Option<u32>,
    denoise: Option<f64>,
    batch_size: Option<u32>,
}

impl Ranges {
    fn check(&self) -> ToolResult<()> {
        check_range("steps", self.steps, &STEPS_RANGE)?;
        check_range("cfg", self.cfg, &CFG_RANGE)?;
        check_range("width", self.width, &DIMENSION_RANGE)?;
        check_range("height", self.height, &DIMENSION_RANGE)?;
        check_range("denoise", self.denoise, &DENOISE_RANGE)?;
        check_range("batch_size", self.batch_size, &BATCH_SIZE_RANGE)
    }
}

impl SubmitWorkflowInput {
    fn validate(&self) -> ToolResult<()> {
        let o = &self.overrides;
        Ranges {
            steps: o.steps,
            cfg: o.cfg,
            width: o.width,
            height: o.height,
            denoise: o.denoise,
            batch_size: o.batch_size,
        }
        .check()
    }
}

impl GenerateSimpleInput {
    fn validate(&self) -> ToolResult<()> {
        if self.prompt.trim().is_empty() {
            return Err(ToolError::validation("prompt must not be empty"));
        }
        Ranges {
            steps: self.steps,
            cfg: self.cfg,
            width: self.width,
            height: self.height,
            denoise: self.denoise,
            batch_size: self.batch_size,
        }
        .check()
    }
}

#[derive(Debug, Serialize)]
struct SubmitResult {
    prompt_id: Option<String>,
    number: Option<i64>,
    status: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    node_errors: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    template_used: Option<&'static str>,
    workflow_summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    overrides: Option<OverrideReport>,
}

impl SubmitResult {
    fn new(response: SubmitResponse, queued_what: &str, workflow_summary: String) -> Self {
        let rejected = response.is_rejected();
        let message = if rejected {
            format!("{queued_what} rejected by ComfyUI validation")
        } else {
            format!(
                "{queued_what} queued successfully at position {}",
                response.number.unwrap_or_default()
            )
        };

        Self {
            prompt_id: response.prompt_id,
            number: response.number,
            status: if rejected { "failed" } else { "queued" },
            message,
            node_errors: response.node_errors,
            error: response.error,
            template_used: None,
            workflow_summary,
            overrides: None,
        }
    }
}

pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: SUBMIT_WORKFLOW,
            description: "Submit a complete workflow JSON to ComfyUI for execution. Supports \
                parameter overrides for dynamic modifications without editing the workflow structure.",
            input_schema: schema::object(
                properties([
                    ("workflow", schema::workflow_json("Workflow in ComfyUI API format")),
                    ("overrides", schema::object(override_properties(), &[])),
                    ("client_id", schema::string("Client ID to submit under")),
                ]),
                &["workflow"],
            ),
        },
        ToolDefinition {
            name: GENERATE_SIMPLE,
            description: "Quick image generation using pre-configured workflow templates \
                (flux_txt2img, sd15_txt2img, sdxl_txt2img, basic_img2img).",
            input_schema: schema::object(generate_properties(), &["prompt", "template"]),
        },
    ]
}

fn override_properties() -> Map<String, Value> {
    properties([
        ("positive_prompt", schema::string("Text for the positive prompt encoder")),
        ("negative_prompt", schema::string("Text for the negative prompt encoder")),
        ("seed", schema::integer("Sampler seed")),
        ("steps", schema::integer_range("Sampling steps", 1, 150)),
        ("cfg", schema::number_range("CFG scale", 0.0, 30.0)),
        ("sampler_name", schema::string("Sampler name")),
        ("scheduler", schema::string("Scheduler name")),
        ("width", schema::integer_range("Image width", 64, 8192)),
        ("height", schema::integer_range("Image height", 64, 8192)),
        ("denoise", schema::number_range("Denoise strength", 0.0, 1.0)),
        ("input_image", schema::string("Local image path to stage for the image loader")),
        ("batch_size", schema::integer_range("Batch size", 1, 100)),
        ("model", schema::string("Checkpoint or UNet filename")),
        ("vae", schema::string("VAE filename")),
        ("clip", schema::string("CLIP filename")),
        ("lora", schema::lora_list()),
    ])
}

fn generate_properties() -> Map<String, Value> {
    let template_names: Vec<&str> = Template::ALL.iter().map(|t| t.name()).collect();
    properties([
        ("prompt", schema::string("Positive prompt")),
        ("template", schema::string_enum("Template name", &template_names)),
        ("negative_prompt", schema::string("Negative prompt")),
        ("model", schema::string("Model filename")),
        ("input_image", schema::string("Local image path (required for basic_img2img)")),
        ("width", schema::integer_range("Image width", 64, 8192)),
        ("height", schema::integer_range("Image height", 64, 8192)),
        ("steps", schema::integer_range("Sampling steps", 1, 150)),
        ("cfg", schema::number_range("CFG scale", 0.0, 30.0)),
        ("seed", schema::integer("Seed; random when omitted")),
        ("sampler", schema::string("Sampler name")),
        ("scheduler", schema::string("Scheduler name")),
        ("denoise", schema::number_range("Denoise strength", 0.0, 1.0)),
        ("batch_size", schema::integer_range("Batch size", 1, 100)),
        ("variant", schema::string("Preset variant, e.g. dev, schnell, dev_fp8, krea for flux")),
        ("clip", schema::string("Flux text encoder filename")),
        ("vae", schema::string("Flux VAE filename")),
        ("lora", schema::lora_list()),
    ])
}

/// Parse, override and submit a caller-supplied workflow.
pub async fn submit_workflow(state: &AppState, input: SubmitWorkflowInput) -> ToolResult<Value> {
    input.validate()?;

    let workflow = parse_workflow(&input.workflow)
        .map_err(|e| ToolError::InvalidWorkflow(core_message(e)))?;

    let overrides = input.overrides;
    let uploader = state.uploader.clone();
    let outcome = blocking(move || {
        apply_overrides(&workflow, &overrides, &uploader).map_err(ToolError::from)
    })
    .await?;

    for skipped in &outcome.report.skipped {
        tracing::info!(field = skipped.field, reason = %skipped.reason, "Override skipped");
    }

    let client_id = input.client_id.as_deref().unwrap_or(&*state.client_id);
    let summary = outcome.workflow.summary();
    let response = submit(state, &outcome.workflow, client_id).await?;

    let mut result = SubmitResult::new(response, "Workflow", summary);
    result.overrides = Some(outcome.report);
    to_json(&result)
}

/// Build a workflow from a template and submit it.
pub async fn generate_simple(state: &AppState, input: GenerateSimpleInput) -> ToolResult<Value> {
    input.validate()?;

    let template = Template::from_name(&input.template).ok_or_else(|| {
        let available: Vec<&str> = Template::ALL.iter().map(|t| t.name()).collect();
        ToolError::Validation(format!(
            "Unknown template: {}. Available templates: {}",
            input.template,
            available.join(", ")
        ))
    })?;

    let defaults = state.config.templates.get(template).clone();
    if !defaults.enabled {
        return Err(ToolError::Validation(format!(
            "Template '{}' is disabled in configuration",
            template.name()
        )));
    }

    let input_image = if template.is_img2img() {
        let source = input.input_image.clone().ok_or_else(|| {
            ToolError::validation("input_image is required for img2img template")
        })?;
        let uploader = state.uploader.clone();
        let staged = blocking(move || Ok(uploader.upload(&source, None, false)?)).await?;
        Some(staged.filename)
    } else {
        if input.input_image.is_some() {
            tracing::debug!(template = template.name(), "Ignoring input_image for text-to-image template");
        }
        None
    };

    let summary = format!(
        "{} generation: {}...",
        template.name(),
        input.prompt.chars().take(SUMMARY_PROMPT_CHARS).collect::<String>()
    );

    let params = TemplateParams {
        prompt: input.prompt,
        negative_prompt: input.negative_prompt,
        width: input.width,
        height: input.height,
        steps: input.steps,
        cfg: input.cfg,
        seed: input.seed,
        sampler: input.sampler,
        scheduler: input.scheduler,
        model: input.model,
        denoise: input.denoise,
        batch_size: input.batch_size,
        input_image,
        variant: input.variant,
        clip: input.clip,
        vae: input.vae,
        lora: input.lora,
    };
    let workflow = template.build(&params, &defaults);

    tracing::info!(
        template = template.name(),
        nodes = workflow.len(),
        "Built workflow from template",
    );

    let response = submit(state, &workflow, &state.client_id).await?;

    let mut result = SubmitResult::new(response, "Generation", summary);
    result.template_used = Some(template.name());
    to_json(&result)
}

async fn submit(
    state: &AppState,
    workflow: &Workflow,
    client_id: &str,
) -> ToolResult<SubmitResponse> {
    let body = workflow.to_value()?;
    let response = state.api.submit_workflow(&body, client_id).await?;

    tracing::info!(
        prompt_id = ?response.prompt_id,
        number = ?response.number,
        rejected = response.is_rejected(),
        "Workflow submitted",
    );
    Ok(response)
}

/// Parse errors carry their own message; drop the generic prefix.
fn core_message(err: CoreError) -> String {
    match err {
        CoreError::Validation(msg) => msg,
        other => other.to_string(),
    }
}
