//! Built-in workflow templates.
//!
//! Each template builds a complete workflow from a small set of parameters.
//! Every parameter is resolved per field in this order:
//!
//! 1. explicit parameter
//! 2. variant preset (when a known variant is named)
//! 3. template configuration default
//! 4. hard-coded fallback
//!
//! Node IDs are allocated sequentially: loaders first, then prompts and the
//! latent source, then the optional LoRA chain, then sampler, decode and save.

use serde::{Deserialize, Serialize};

use crate::classify::{
    CHECKPOINT_LOADER_SIMPLE_CLASS, CLIP_TEXT_ENCODE_CLASS, DUAL_CLIP_LOADER_CLASS,
    EMPTY_LATENT_IMAGE_CLASS, KSAMPLER_CLASS, LOAD_IMAGE_CLASS, SAVE_IMAGE_CLASS,
    UNET_LOADER_CLASS, VAE_DECODE_CLASS, VAE_ENCODE_CLASS, VAE_LOADER_CLASS,
};
use crate::config::{TemplateDefaults, VariantPreset};
use crate::graph::{IdAllocator, NodeId, NodeLink, Workflow, WorkflowNode};
use crate::overrides::{insert_lora_chain, LoraSpec};
use crate::resolve::resolve;

/// Seeds are drawn from `[0, MAX_RANDOM_SEED)` when none is given.
pub const MAX_RANDOM_SEED: u64 = 1_000_000_000_000;

const DEFAULT_NEGATIVE_PROMPT: &str = "low quality, blurry, distorted";
const SD15_NEGATIVE_PROMPT: &str = "low quality, blurry, distorted, ugly";
const DEFAULT_INPUT_IMAGE: &str = "input.png";
const FLUX_T5_ENCODER: &str = "t5xxl_fp16.safetensors";
const FLUX_CLIP_L_ENCODER: &str = "clip_l.safetensors";
const FLUX_VAE: &str = "ae.safetensors";

/// Built-in flux variant names, in display order.
pub const FLUX_VARIANTS: &[&str] = &["dev", "schnell", "dev_fp8", "krea"];

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Caller-supplied template parameters. Everything except `prompt` is
/// optional and falls back through the resolution layers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateParams {
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub steps: Option<u32>,
    pub cfg: Option<f64>,
    pub seed: Option<u64>,
    pub sampler: Option<String>,
    pub scheduler: Option<String>,
    pub model: Option<String>,
    pub denoise: Option<f64>,
    pub batch_size: Option<u32>,
    /// Filename inside the engine's input folder (already staged).
    pub input_image: Option<String>,
    pub variant: Option<String>,
    /// Flux only: first text encoder (`clip_name1`).
    pub clip: Option<String>,
    /// Flux only: VAE filename.
    pub vae: Option<String>,
    pub lora: Vec<LoraSpec>,
}

/// Fully resolved values a template is built from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedParams {
    pub model: String,
    pub steps: u32,
    pub cfg: f64,
    pub sampler: String,
    pub scheduler: String,
    pub seed: u64,
    pub width: u32,
    pub height: u32,
    pub batch_size: u32,
    pub denoise: f64,
    pub negative_prompt: String,
    pub input_image: String,
    pub clip_name1: String,
    pub clip_name2: String,
    pub vae_name: String,
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

/// The built-in templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Template {
    #[serde(rename = "flux_txt2img")]
    FluxTxt2Img,
    #[serde(rename = "sd15_txt2img")]
    Sd15Txt2Img,
    #[serde(rename = "sdxl_txt2img")]
    SdxlTxt2Img,
    #[serde(rename = "basic_img2img")]
    BasicImg2Img,
}

/// Hard-coded last-resort values for one template.
struct Fallbacks {
    model: &'static str,
    steps: u32,
    cfg: f64,
    sampler: &'static str,
    scheduler: &'static str,
    size: u32,
    denoise: f64,
    negative_prompt: &'static str,
}

impl Template {
    pub const ALL: [Template; 4] = [
        Template::FluxTxt2Img,
        Template::Sd15Txt2Img,
        Template::SdxlTxt2Img,
        Template::BasicImg2Img,
    ];

    /// Look up a template by name. Unknown names return `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Template::FluxTxt2Img => "flux_txt2img",
            Template::Sd15Txt2Img => "sd15_txt2img",
            Template::SdxlTxt2Img => "sdxl_txt2img",
            Template::BasicImg2Img => "basic_img2img",
        }
    }

    pub fn is_img2img(self) -> bool {
        self == Template::BasicImg2Img
    }

    fn fallbacks(self) -> Fallbacks {
        match self {
            Template::FluxTxt2Img => Fallbacks {
                model: "flux1-dev.safetensors",
                steps: 20,
                cfg: 3.5,
                sampler: "euler",
                scheduler: "simple",
                size: 1024,
                denoise: 1.0,
                negative_prompt: DEFAULT_NEGATIVE_PROMPT,
            },
            Template::Sd15Txt2Img => Fallbacks {
                model: "v1-5-pruned-emaonly.safetensors",
                steps: 20,
                cfg: 7.0,
                sampler: "dpmpp_2m",
                scheduler: "karras",
                size: 512,
                denoise: 1.0,
                negative_prompt: SD15_NEGATIVE_PROMPT,
            },
            Template::SdxlTxt2Img => Fallbacks {
                model: "sd_xl_base_1.0.safetensors",
                steps: 20,
                cfg: 7.0,
                sampler: "dpmpp_2m_sde",
                scheduler: "karras",
                size: 1024,
                denoise: 1.0,
                negative_prompt: DEFAULT_NEGATIVE_PROMPT,
            },
            Template::BasicImg2Img => Fallbacks {
                model: "v1-5-pruned-emaonly.safetensors",
                steps: 20,
                cfg: 7.0,
                sampler: "dpmpp_2m",
                scheduler: "karras",
                size: 512,
                denoise: 0.75,
                negative_prompt: DEFAULT_NEGATIVE_PROMPT,
            },
        }
    }

    /// Variant presets that ship with the template.
    pub fn builtin_variant(self, name: &str) -> Option<VariantPreset> {
        if self != Template::FluxTxt2Img {
            return None;
        }
        let preset = match name {
            "dev" => VariantPreset::new("flux1-dev.safetensors", 20, 3.5, "euler", "simple"),
            "schnell" => VariantPreset::new("flux1-schnell.safetensors", 4, 1.0, "euler", "simple"),
            "dev_fp8" => {
                VariantPreset::new("flux1-dev-fp8.safetensors", 20, 3.5, "euler", "simple")
            }
            "krea" => VariantPreset::new(
                "flux1-krea-dev.safetensors",
                28,
                4.5,
                "dpmpp_2m",
                "sgm_uniform",
            ),
            _ => return None,
        };
        Some(preset)
    }

    /// Configured variants take precedence over built-in ones of the same name.
    fn lookup_variant(self, name: &str, defaults: &TemplateDefaults) -> Option<VariantPreset> {
        let preset = defaults
            .variants
            .get(name)
            .cloned()
            .or_else(|| self.builtin_variant(name));
        if preset.is_none() {
            tracing::warn!(template = self.name(), variant = name, "Unknown variant, ignoring");
        }
        preset
    }

    /// Resolve every parameter through the precedence layers.
    pub fn resolve(self, params: &TemplateParams, defaults: &TemplateDefaults) -> ResolvedParams {
        let fb = self.fallbacks();
        let variant = params
            .variant
            .as_deref()
            .and_then(|name| self.lookup_variant(name, defaults))
            .unwrap_or_default();

        ResolvedParams {
            model: resolve(
                [params.model.clone(), variant.model, defaults.default_model.clone()],
                fb.model.to_string(),
            ),
            steps: resolve([params.steps, variant.steps, defaults.default_steps], fb.steps),
            cfg: resolve([params.cfg, variant.cfg, defaults.default_cfg], fb.cfg),
            sampler: resolve(
                [params.sampler.clone(), variant.sampler, defaults.default_sampler.clone()],
                fb.sampler.to_string(),
            ),
            scheduler: resolve(
                [
                    params.scheduler.clone(),
                    variant.scheduler,
                    defaults.default_scheduler.clone(),
                ],
                fb.scheduler.to_string(),
            ),
            seed: params.seed.unwrap_or_else(random_seed),
            width: resolve([params.width], fb.size),
            height: resolve([params.height], fb.size),
            batch_size: resolve([params.batch_size], 1),
            denoise: resolve([params.denoise, defaults.default_denoise], fb.denoise),
            negative_prompt: resolve(
                [params.negative_prompt.clone()],
                fb.negative_prompt.to_string(),
            ),
            input_image: resolve([params.input_image.clone()], DEFAULT_INPUT_IMAGE.to_string()),
            clip_name1: resolve([params.clip.clone()], FLUX_T5_ENCODER.to_string()),
            clip_name2: FLUX_CLIP_L_ENCODER.to_string(),
            vae_name: resolve([params.vae.clone()], FLUX_VAE.to_string()),
        }
    }

    /// Build a complete workflow.
    pub fn build(self, params: &TemplateParams, defaults: &TemplateDefaults) -> Workflow {
        let resolved = self.resolve(params, defaults);
        self.build_resolved(&params.prompt, &resolved, &params.lora)
    }

    fn build_resolved(self, prompt: &str, r: &ResolvedParams, loras: &[LoraSpec]) -> Workflow {
        let mut wf = Workflow::new();

        // Loaders
        let (model_src, clip_src, vae_src) = match self {
            Template::FluxTxt2Img => {
                wf.insert(
                    "1",
                    WorkflowNode::new(UNET_LOADER_CLASS)
                        .with_literal("unet_name", r.model.as_str())
                        .with_literal("weight_dtype", "default")
                        .with_title("Load Diffusion Model"),
                );
                wf.insert(
                    "2",
                    WorkflowNode::new(DUAL_CLIP_LOADER_CLASS)
                        .with_literal("clip_name1", r.clip_name1.as_str())
                        .with_literal("clip_name2", r.clip_name2.as_str())
                        .with_literal("type", "flux")
                        .with_title("DualCLIPLoader"),
                );
                wf.insert(
                    "3",
                    WorkflowNode::new(VAE_LOADER_CLASS)
                        .with_literal("vae_name", r.vae_name.as_str())
                        .with_title("Load VAE"),
                );
                (NodeLink::new("1", 0), NodeLink::new("2", 0), NodeLink::new("3", 0))
            }
            _ => {
                wf.insert(
                    "1",
                    WorkflowNode::new(CHECKPOINT_LOADER_SIMPLE_CLASS)
                        .with_literal("ckpt_name", r.model.as_str())
                        .with_title("Load Checkpoint"),
                );
                (NodeLink::new("1", 0), NodeLink::new("1", 1), NodeLink::new("1", 2))
            }
        };

        let mut ids = IdAllocator::for_workflow(&wf);

        // Prompts
        let positive = insert_node(
            &mut wf,
            &mut ids,
            WorkflowNode::new(CLIP_TEXT_ENCODE_CLASS)
                .with_literal("text", prompt)
                .with_input("clip", clip_src.clone())
                .with_title("CLIP Text Encode (Positive Prompt)"),
        );
        let negative = insert_node(
            &mut wf,
            &mut ids,
            WorkflowNode::new(CLIP_TEXT_ENCODE_CLASS)
                .with_literal("text", r.negative_prompt.as_str())
                .with_input("clip", clip_src.clone())
                .with_title("CLIP Text Encode (Negative Prompt)"),
        );

        // Latent source
        let latent = if self.is_img2img() {
            let image = insert_node(
                &mut wf,
                &mut ids,
                WorkflowNode::new(LOAD_IMAGE_CLASS)
                    .with_literal("image", r.input_image.as_str())
                    .with_title("Load Image"),
            );
            insert_node(
                &mut wf,
                &mut ids,
                WorkflowNode::new(VAE_ENCODE_CLASS)
                    .with_input("pixels", NodeLink::new(image, 0))
                    .with_input("vae", vae_src.clone())
                    .with_title("VAE Encode"),
            )
        } else {
            insert_node(
                &mut wf,
                &mut ids,
                WorkflowNode::new(EMPTY_LATENT_IMAGE_CLASS)
                    .with_literal("width", r.width)
                    .with_literal("height", r.height)
                    .with_literal("batch_size", r.batch_size)
                    .with_title("Empty Latent Image"),
            )
        };

        // LoRA chain between the loaders and their consumers
        let chain = insert_lora_chain(&mut wf, &mut ids, model_src, clip_src, loras);
        for id in [&positive, &negative] {
            if let Some(node) = wf.get_mut(id) {
                node.set_input("clip", chain.clip.clone());
            }
        }

        // Sampling and output
        let sampler = insert_node(
            &mut wf,
            &mut ids,
            WorkflowNode::new(KSAMPLER_CLASS)
                .with_literal("seed", r.seed)
                .with_literal("steps", r.steps)
                .with_literal("cfg", r.cfg)
                .with_literal("sampler_name", r.sampler.as_str())
                .with_literal("scheduler", r.scheduler.as_str())
                .with_literal("denoise", r.denoise)
                .with_input("model", chain.model)
                .with_input("positive", NodeLink::new(positive, 0))
                .with_input("negative", NodeLink::new(negative, 0))
                .with_input("latent_image", NodeLink::new(latent, 0))
                .with_title("KSampler"),
        );
        let decode = insert_node(
            &mut wf,
            &mut ids,
            WorkflowNode::new(VAE_DECODE_CLASS)
                .with_input("samples", NodeLink::new(sampler, 0))
                .with_input("vae", vae_src)
                .with_title("VAE Decode"),
        );
        insert_node(
            &mut wf,
            &mut ids,
            WorkflowNode::new(SAVE_IMAGE_CLASS)
                .with_literal("filename_prefix", self.name())
                .with_input("images", NodeLink::new(decode, 0))
                .with_title("Save Image"),
        );

        wf
    }
}

fn insert_node(wf: &mut Workflow, ids: &mut IdAllocator, node: WorkflowNode) -> NodeId {
    let id = ids.next_id();
    wf.insert(id.clone(), node);
    id
}

fn random_seed() -> u64 {
    rand::random_range(0..MAX_RANDOM_SEED)
}
