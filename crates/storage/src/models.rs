//! Model file discovery under `<installation>/models`.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// File extensions recognised as model weights (compared lower-cased).
pub const MODEL_EXTENSIONS: &[&str] = &["safetensors", "ckpt", "pt", "pth", "bin"];

/// Model categories, each mapped to a subdirectory of the models root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Checkpoints,
    Loras,
    Vae,
    Clip,
    ClipVision,
    Unet,
    DiffusionModels,
    Embeddings,
    UpscaleModels,
    Controlnet,
    Ipadapter,
    StyleModels,
    Photomaker,
    Insightface,
}

impl ModelKind {
    pub const ALL: [ModelKind; 14] = [
        ModelKind::Checkpoints,
        ModelKind::Loras,
        ModelKind::Vae,
        ModelKind::Clip,
        ModelKind::ClipVision,
        ModelKind::Unet,
        ModelKind::DiffusionModels,
        ModelKind::Embeddings,
        ModelKind::UpscaleModels,
        ModelKind::Controlnet,
        ModelKind::Ipadapter,
        ModelKind::StyleModels,
        ModelKind::Photomaker,
        ModelKind::Insightface,
    ];

    /// Name used by callers and as the on-disk directory.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Checkpoints => "checkpoints",
            ModelKind::Loras => "loras",
            ModelKind::Vae => "vae",
            ModelKind::Clip => "clip",
            ModelKind::ClipVision => "clip_vision",
            ModelKind::Unet => "unet",
            ModelKind::DiffusionModels => "diffusion_models",
            ModelKind::Embeddings => "embeddings",
            ModelKind::UpscaleModels => "upscale_models",
            ModelKind::Controlnet => "controlnet",
            ModelKind::Ipadapter => "ipadapter",
            ModelKind::StyleModels => "style_models",
            ModelKind::Photomaker => "photomaker",
            ModelKind::Insightface => "insightface",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

/// One model file found on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelInfo {
    #[serde(rename = "type")]
    pub kind: ModelKind,
    /// File name without directories.
    pub name: String,
    /// Path relative to the models root, `/`-separated.
    pub path: String,
    pub size: u64,
}

/// List model files of `kind`, or of every kind when `kind` is `None`.
///
/// Category directories are scanned recursively. A missing directory
/// contributes nothing; unreadable subdirectories are logged and skipped.
pub fn scan_models(
    models_root: &Path,
    kind: Option<ModelKind>,
) -> Result<Vec<ModelInfo>, StorageError> {
    let kinds: Vec<ModelKind> = match kind {
        Some(kind) => vec![kind],
        None => ModelKind::ALL.to_vec(),
    };

    let mut models = Vec::new();
    for kind in kinds {
        let dir = models_root.join(kind.as_str());
        if !dir.is_dir() {
            tracing::debug!(dir = %dir.display(), "Model directory does not exist");
            continue;
        }
        scan_dir(models_root, &dir, kind, &mut models)?;
    }

    tracing::debug!(count = models.len(), "Scanned model files");
    Ok(models)
}

fn scan_dir(
    models_root: &Path,
    dir: &Path,
    kind: ModelKind,
    out: &mut Vec<ModelInfo>,
) -> Result<(), StorageError> {
    let mut entries: Vec<_> = fs::read_dir(dir)
        .map_err(|e| StorageError::at(dir, e))?
        .filter_map(Result::ok)
        .collect();
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };

        if file_type.is_dir() {
            if let Err(e) = scan_dir(models_root, &path, kind, out) {
                tracing::warn!(dir = %path.display(), error = %e, "Skipping unreadable model directory");
            }
            continue;
        }

        if !has_model_extension(&path) {
            continue;
        }

        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        let relative = path
            .strip_prefix(models_root)
            .unwrap_or(&path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        out.push(ModelInfo {
            kind,
            name: entry.file_name().to_string_lossy().into_owned(),
            path: relative,
            size,
        });
    }

    Ok(())
}

fn has_model_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| MODEL_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
