//! Workflow override engine.
//!
//! [`apply_overrides`] takes a caller's workflow by shared reference and
//! returns a rewritten copy together with an [`OverrideReport`]. Overrides
//! whose target node is missing are skipped and reported; they never turn
//! into errors. The only hard failure is an image staging error.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::classify::{
    is_clip_loader, is_empty_latent, is_image_loader, is_lora_loader, is_model_loader,
    is_negative_prompt, is_positive_prompt, is_prompt_encoder, is_sampler, is_vae_loader,
    NodeKind, LORA_LOADER_CLASS,
};
use crate::error::CoreError;
use crate::graph::{IdAllocator, InputValue, NodeId, NodeLink, Workflow, WorkflowNode};
use crate::upload::ImageStager;

// ---------------------------------------------------------------------------
// Override set
// ---------------------------------------------------------------------------

/// One LoRA to insert into the model/CLIP chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoraSpec {
    /// LoRA filename as ComfyUI lists it under `models/loras`.
    pub name: String,
    #[serde(default = "default_strength")]
    pub strength_model: f64,
    #[serde(default = "default_strength")]
    pub strength_clip: f64,
}

fn default_strength() -> f64 {
    1.0
}

impl LoraSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            strength_model: default_strength(),
            strength_clip: default_strength(),
        }
    }
}

/// Sparse set of parameter overrides. `None` (or an empty LoRA list) leaves
/// the workflow unchanged for that field. Explicit zero values are applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub positive_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cfg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampler_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduler: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denoise: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,
    /// Local image path; staged into the input folder before rewiring.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_image: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vae: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clip: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub lora: Vec<LoraSpec>,
}

impl WorkflowOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// An override that could not be applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedOverride {
    pub field: &'static str,
    pub reason: String,
}

/// Which overrides were applied and which were skipped.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OverrideReport {
    pub applied: Vec<&'static str>,
    pub skipped: Vec<SkippedOverride>,
}

impl OverrideReport {
    pub fn is_applied(&self, field: &str) -> bool {
        self.applied.contains(&field)
    }

    pub fn is_skipped(&self, field: &str) -> bool {
        self.skipped.iter().any(|s| s.field == field)
    }
}

/// Result of [`apply_overrides`].
#[derive(Debug, Clone)]
pub struct OverrideOutcome {
    pub workflow: Workflow,
    pub report: OverrideReport,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Apply `overrides` to a copy of `workflow`.
///
/// Fields are applied in a fixed order: prompts, sampler fields, input image,
/// model, VAE, CLIP, LoRA chain, latent size and batch size.
///
/// - Prompts target the first positive/negative prompt encoder.
/// - Sampler fields target every sampler node.
/// - `input_image` is staged through `stager` first; a staging failure aborts
///   the whole call. The staged filename goes to the first image loader.
/// - `model`, `vae` and `clip` target the first loader of their kind.
/// - A non-empty `lora` list replaces every existing LoRA loader with a fresh
///   linear chain (see [`insert_lora_chain`]).
/// - Latent fields target the first `EmptyLatentImage`.
pub fn apply_overrides(
    workflow: &Workflow,
    overrides: &WorkflowOverrides,
    stager: &dyn ImageStager,
) -> Result<OverrideOutcome, CoreError> {
    let mut rw = Rewriter {
        workflow: workflow.clone(),
        report: OverrideReport::default(),
    };

    if let Some(text) = &overrides.positive_prompt {
        rw.with_first(
            "positive_prompt",
            "positive prompt encoder",
            is_positive_prompt,
            |node| node.set_literal("text", text.as_str()),
        );
    }
    if let Some(text) = &overrides.negative_prompt {
        rw.with_first(
            "negative_prompt",
            "negative prompt encoder",
            is_negative_prompt,
            |node| node.set_literal("text", text.as_str()),
        );
    }

    let sampler_fields: [(&'static str, Option<Value>); 6] = [
        ("seed", overrides.seed.map(Value::from)),
        ("steps", overrides.steps.map(Value::from)),
        ("cfg", overrides.cfg.map(Value::from)),
        ("sampler_name", overrides.sampler_name.clone().map(Value::from)),
        ("scheduler", overrides.scheduler.clone().map(Value::from)),
        ("denoise", overrides.denoise.map(Value::from)),
    ];
    for (field, value) in sampler_fields {
        if let Some(value) = value {
            rw.set_on_all(field, "sampler", is_sampler, value);
        }
    }

    if let Some(source) = &overrides.input_image {
        let staged = stager.stage(source, None, false)?;
        tracing::debug!(
            source = %source.display(),
            filename = %staged.filename,
            "Staged input image"
        );
        rw.with_first("input_image", "image loader", is_image_loader, |node| {
            node.set_literal("image", staged.filename.as_str());
        });
    }

    if let Some(model) = &overrides.model {
        rw.with_first("model", "model loader", is_model_loader, |node| {
            let input = match node.kind() {
                NodeKind::UnetLoader => "unet_name",
                _ => "ckpt_name",
            };
            node.set_literal(input, model.as_str());
        });
    }
    if let Some(vae) = &overrides.vae {
        rw.with_first("vae", "VAE loader", is_vae_loader, |node| {
            node.set_literal("vae_name", vae.as_str());
        });
    }
    if let Some(clip) = &overrides.clip {
        rw.with_first("clip", "CLIP loader", is_clip_loader, |node| {
            let input = match node.kind() {
                NodeKind::DualClipLoader => "clip_name1",
                _ => "clip_name",
            };
            node.set_literal(input, clip.as_str());
        });
    }

    if !overrides.lora.is_empty() {
        match rebuild_lora_chain(&mut rw.workflow, &overrides.lora) {
            Ok(chain) => {
                tracing::debug!(loras = chain.node_ids.len(), "Rebuilt LoRA chain");
                rw.report.applied.push("lora");
            }
            Err(reason) => rw.skip("lora", reason.to_string()),
        }
    }

    let latent_fields: [(&'static str, Option<u32>); 3] = [
        ("width", overrides.width),
        ("height", overrides.height),
        ("batch_size", overrides.batch_size),
    ];
    for (field, value) in latent_fields {
        if let Some(value) = value {
            rw.with_first(field, "EmptyLatentImage", is_empty_latent, |node| {
                node.set_literal(field, value);
            });
        }
    }

    Ok(OverrideOutcome {
        workflow: rw.workflow,
        report: rw.report,
    })
}

/// Private working copy plus the report being built.
struct Rewriter {
    workflow: Workflow,
    report: OverrideReport,
}

impl Rewriter {
    fn with_first(
        &mut self,
        field: &'static str,
        role: &str,
        predicate: fn(&WorkflowNode) -> bool,
        apply: impl FnOnce(&mut WorkflowNode),
    ) {
        let Some(id) = self.workflow.find_first(predicate) else {
            self.skip(field, format!("no {role} node in workflow"));
            return;
        };
        if let Some(node) = self.workflow.get_mut(&id) {
            apply(node);
        }
        self.report.applied.push(field);
    }

    fn set_on_all(
        &mut self,
        field: &'static str,
        role: &str,
        predicate: fn(&WorkflowNode) -> bool,
        value: Value,
    ) {
        let targets = self.workflow.find_all(predicate);
        if targets.is_empty() {
            self.skip(field, format!("no {role} node in workflow"));
            return;
        }
        for id in &targets {
            if let Some(node) = self.workflow.get_mut(id) {
                node.set_literal(field, value.clone());
            }
        }
        self.report.applied.push(field);
    }

    fn skip(&mut self, field: &'static str, reason: String) {
        tracing::debug!(field, %reason, "Override skipped");
        self.report.skipped.push(SkippedOverride { field, reason });
    }
}

// ---------------------------------------------------------------------------
// LoRA chain
// ---------------------------------------------------------------------------

/// Title given to inserted LoRA loader nodes.
const LORA_NODE_TITLE: &str = "Load LoRA";

/// Final outputs of a LoRA chain.
#[derive(Debug, Clone, PartialEq)]
pub struct LoraChain {
    /// Where model consumers should connect.
    pub model: NodeLink,
    /// Where CLIP consumers should connect.
    pub clip: NodeLink,
    /// IDs of the inserted nodes, in chain order.
    pub node_ids: Vec<NodeId>,
}

/// Insert one `LoraLoader` per `LoraSpec`, each consuming the previous node's
/// MODEL (slot 0) and CLIP (slot 1) outputs, starting from `model` and `clip`.
///
/// With an empty `loras` list nothing is inserted and the chain outputs are
/// the given sources.
pub fn insert_lora_chain(
    workflow: &mut Workflow,
    ids: &mut IdAllocator,
    mut model: NodeLink,
    mut clip: NodeLink,
    loras: &[LoraSpec],
) -> LoraChain {
    let mut node_ids = Vec::with_capacity(loras.len());

    for lora in loras {
        let id = ids.next_id();
        let node = WorkflowNode::new(LORA_LOADER_CLASS)
            .with_literal("lora_name", lora.name.as_str())
            .with_literal("strength_model", lora.strength_model)
            .with_literal("strength_clip", lora.strength_clip)
            .with_input("model", model)
            .with_input("clip", clip)
            .with_title(LORA_NODE_TITLE);
        workflow.insert(id.clone(), node);

        model = NodeLink::new(id.clone(), 0);
        clip = NodeLink::new(id.clone(), 1);
        node_ids.push(id);
    }

    LoraChain {
        model,
        clip,
        node_ids,
    }
}

/// Replace every LoRA loader in `workflow` with a fresh chain built from
/// `loras`, then point samplers, prompt encoders and any other consumer of a
/// removed LoRA at the new chain. Leaves the workflow untouched on error.
fn rebuild_lora_chain(
    workflow: &mut Workflow,
    loras: &[LoraSpec],
) -> Result<LoraChain, &'static str> {
    let model_loader = workflow
        .find_first(is_model_loader)
        .ok_or("no model loader node in workflow")?;

    let clip_loader = workflow
        .find_first(is_clip_loader)
        .ok_or("no CLIP loader node in workflow")?;

    // Allocate before removal so no new node reuses a removed LoRA's ID.
    let mut ids = IdAllocator::for_workflow(workflow);
    let removed = workflow.find_all(is_lora_loader);
    for id in &removed {
        workflow.remove(id);
    }

    let chain = insert_lora_chain(
        workflow,
        &mut ids,
        NodeLink::new(model_loader, 0),
        NodeLink::new(clip_loader, 0),
        loras,
    );

    for (_, node) in workflow.iter_mut() {
        if is_sampler(node) {
            node.set_input("model", chain.model.clone());
        }
        if is_prompt_encoder(node) {
            node.set_input("clip", chain.clip.clone());
        }
        for value in node.inputs.values_mut() {
            let InputValue::Link(link) = value else {
                continue;
            };
            if removed.contains(&link.node) {
                *link = if link.slot == 0 {
                    chain.model.clone()
                } else {
                    chain.clip.clone()
                };
            }
        }
    }

    Ok(chain)
}
