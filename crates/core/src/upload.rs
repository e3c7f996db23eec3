//! Image staging seam.
//!
//! The override engine and template builder never touch the filesystem
//! themselves. When a workflow needs a local image, they hand the source path
//! to an [`ImageStager`], which copies it into the engine's input folder and
//! reports the filename the engine will see.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::CoreError;

/// Result of staging one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagedImage {
    /// Filename inside the input folder; this is what `LoadImage` references.
    pub filename: String,
    /// Absolute path of the staged copy.
    pub path: PathBuf,
    /// Size in bytes.
    pub size: u64,
}

/// Copies a local image into the engine's input folder.
pub trait ImageStager {
    /// Stage `source`, optionally under `desired_name`.
    ///
    /// When `overwrite` is false and the target name is taken, the
    /// implementation picks a free variant of the name instead.
    fn stage(
        &self,
        source: &Path,
        desired_name: Option<&str>,
        overwrite: bool,
    ) -> Result<StagedImage, CoreError>;
}

/// Stager for callers that never stage images.
///
/// Any attempt to stage fails with [`CoreError::Upload`].
#[derive(Debug, Default, Clone, Copy)]
pub struct NoStaging;

impl ImageStager for NoStaging {
    fn stage(
        &self,
        source: &Path,
        _desired_name: Option<&str>,
        _overwrite: bool,
    ) -> Result<StagedImage, CoreError> {
        Err(CoreError::Upload(format!(
            "image staging is not available (source: {})",
            source.display()
        )))
    }
}
