//! Node role classification.
//!
//! Every predicate looks at a single node only (its `class_type` and, for
//! prompt encoders, its `_meta.title`). None of them inspect edges or other
//! nodes, so they are safe to call on any graph in any state.

use crate::graph::WorkflowNode;

// ---------------------------------------------------------------------------
// ComfyUI node class types
// ---------------------------------------------------------------------------

pub const KSAMPLER_CLASS: &str = "KSampler";
pub const KSAMPLER_ADVANCED_CLASS: &str = "KSamplerAdvanced";
pub const SAMPLER_CUSTOM_CLASS: &str = "SamplerCustom";
pub const CHECKPOINT_LOADER_SIMPLE_CLASS: &str = "CheckpointLoaderSimple";
pub const CHECKPOINT_LOADER_CLASS: &str = "CheckpointLoader";
pub const UNET_LOADER_CLASS: &str = "UNETLoader";
pub const CLIP_LOADER_CLASS: &str = "CLIPLoader";
pub const DUAL_CLIP_LOADER_CLASS: &str = "DualCLIPLoader";
pub const VAE_LOADER_CLASS: &str = "VAELoader";
pub const LORA_LOADER_CLASS: &str = "LoraLoader";
pub const LORA_LOADER_MODEL_ONLY_CLASS: &str = "LoraLoaderModelOnly";
pub const CLIP_TEXT_ENCODE_CLASS: &str = "CLIPTextEncode";
pub const LOAD_IMAGE_CLASS: &str = "LoadImage";
pub const LOAD_IMAGE_MASK_CLASS: &str = "LoadImageMask";
pub const EMPTY_LATENT_IMAGE_CLASS: &str = "EmptyLatentImage";
pub const VAE_ENCODE_CLASS: &str = "VAEEncode";
pub const VAE_DECODE_CLASS: &str = "VAEDecode";
pub const SAVE_IMAGE_CLASS: &str = "SaveImage";

/// Default title ComfyUI gives the positive prompt encoder.
const POSITIVE_PROMPT_TITLE: &str = "clip text encode (positive prompt)";

/// Default title ComfyUI gives the negative prompt encoder.
const NEGATIVE_PROMPT_TITLE: &str = "clip text encode (negative prompt)";

// ---------------------------------------------------------------------------
// Node kind
// ---------------------------------------------------------------------------

/// The node kinds the engine knows how to rewrite.
///
/// Node types are open-ended; anything not listed here is [`NodeKind::Other`]
/// and passes through every transformation untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// `CheckpointLoaderSimple` / `CheckpointLoader`: outputs MODEL, CLIP, VAE.
    CheckpointLoader,
    /// `UNETLoader`: outputs MODEL only.
    UnetLoader,
    ClipLoader,
    DualClipLoader,
    VaeLoader,
    LoraLoader,
    Sampler,
    TextEncoder,
    ImageLoader,
    EmptyLatent,
    Other,
}

impl NodeKind {
    pub fn from_class_type(class_type: &str) -> Self {
        match class_type {
            CHECKPOINT_LOADER_SIMPLE_CLASS | CHECKPOINT_LOADER_CLASS => NodeKind::CheckpointLoader,
            UNET_LOADER_CLASS => NodeKind::UnetLoader,
            CLIP_LOADER_CLASS => NodeKind::ClipLoader,
            DUAL_CLIP_LOADER_CLASS => NodeKind::DualClipLoader,
            VAE_LOADER_CLASS => NodeKind::VaeLoader,
            LORA_LOADER_CLASS | LORA_LOADER_MODEL_ONLY_CLASS => NodeKind::LoraLoader,
            KSAMPLER_CLASS | KSAMPLER_ADVANCED_CLASS | SAMPLER_CUSTOM_CLASS => NodeKind::Sampler,
            CLIP_TEXT_ENCODE_CLASS => NodeKind::TextEncoder,
            LOAD_IMAGE_CLASS | LOAD_IMAGE_MASK_CLASS => NodeKind::ImageLoader,
            EMPTY_LATENT_IMAGE_CLASS => NodeKind::EmptyLatent,
            _ => NodeKind::Other,
        }
    }

    /// Model loaders: checkpoint loaders and the UNet loader.
    pub fn is_model_loader(self) -> bool {
        matches!(self, NodeKind::CheckpointLoader | NodeKind::UnetLoader)
    }

    pub fn is_clip_loader(self) -> bool {
        matches!(self, NodeKind::ClipLoader | NodeKind::DualClipLoader)
    }
}

impl WorkflowNode {
    pub fn kind(&self) -> NodeKind {
        NodeKind::from_class_type(&self.class_type)
    }
}

// ---------------------------------------------------------------------------
// Role predicates
// ---------------------------------------------------------------------------

pub fn is_sampler(node: &WorkflowNode) -> bool {
    node.kind() == NodeKind::Sampler
}

pub fn is_image_loader(node: &WorkflowNode) -> bool {
    node.kind() == NodeKind::ImageLoader
}

pub fn is_model_loader(node: &WorkflowNode) -> bool {
    node.kind().is_model_loader()
}

pub fn is_vae_loader(node: &WorkflowNode) -> bool {
    node.kind() == NodeKind::VaeLoader
}

pub fn is_clip_loader(node: &WorkflowNode) -> bool {
    node.kind().is_clip_loader()
}

pub fn is_lora_loader(node: &WorkflowNode) -> bool {
    node.kind() == NodeKind::LoraLoader
}

pub fn is_empty_latent(node: &WorkflowNode) -> bool {
    node.kind() == NodeKind::EmptyLatent
}

/// A `CLIPTextEncode` whose title marks it as the positive prompt.
pub fn is_positive_prompt(node: &WorkflowNode) -> bool {
    prompt_title_matches(node, "positive", POSITIVE_PROMPT_TITLE)
}

/// A `CLIPTextEncode` whose title marks it as the negative prompt.
pub fn is_negative_prompt(node: &WorkflowNode) -> bool {
    prompt_title_matches(node, "negative", NEGATIVE_PROMPT_TITLE)
}

/// Either prompt role. Used when rewiring CLIP inputs after a LoRA rebuild.
pub fn is_prompt_encoder(node: &WorkflowNode) -> bool {
    is_positive_prompt(node) || is_negative_prompt(node)
}

fn prompt_title_matches(node: &WorkflowNode, keyword: &str, default_title: &str) -> bool {
    if node.kind() != NodeKind::TextEncoder {
        return false;
    }
    match node.title() {
        Some(title) => {
            let title = title.to_lowercase();
            title.contains(keyword) || title == default_title
        }
        None => false,
    }
}
