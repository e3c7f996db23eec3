//! Copying local images into the ComfyUI input folder.

use std::fs;
use std::path::{Path, PathBuf};

use comfy_mcp_core::error::CoreError;
use comfy_mcp_core::upload::{ImageStager, StagedImage};
use comfy_mcp_core::validation::{is_valid_image_format, sanitize_filename};

use crate::error::StorageError;

/// Stages images into `<installation>/input`.
#[derive(Debug, Clone)]
pub struct ImageUploader {
    input_dir: PathBuf,
}

impl ImageUploader {
    pub fn new(input_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
        }
    }

    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    /// Copy `source` into the input folder.
    ///
    /// The target name is `desired_name` or the source's file name, with
    /// unsafe characters replaced by `_`. When the name is taken and
    /// `overwrite` is false, `name_1.ext`, `name_2.ext`, ... are tried.
    pub fn upload(
        &self,
        source: &Path,
        desired_name: Option<&str>,
        overwrite: bool,
    ) -> Result<StagedImage, StorageError> {
        if !source.is_file() {
            return Err(StorageError::NotFound(source.to_path_buf()));
        }

        let raw_name = match desired_name {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| StorageError::InvalidName(source.display().to_string()))?,
        };
        let filename = sanitize_filename(&raw_name);

        if !is_valid_image_format(&filename) {
            return Err(StorageError::InvalidImageFormat(filename));
        }

        fs::create_dir_all(&self.input_dir).map_err(|e| StorageError::at(&self.input_dir, e))?;

        let filename = if overwrite {
            filename
        } else {
            self.free_name(&filename)
        };
        let target = self.input_dir.join(&filename);

        if is_same_file(source, &target) {
            tracing::debug!(target = %target.display(), "Image already staged in place");
        } else {
            fs::copy(source, &target).map_err(|e| StorageError::at(&target, e))?;
        }
        let size = fs::metadata(&target)
            .map_err(|e| StorageError::at(&target, e))?
            .len();

        tracing::info!(
            source = %source.display(),
            filename = %filename,
            size,
            "Staged image into ComfyUI input folder",
        );

        Ok(StagedImage {
            filename,
            path: target,
            size,
        })
    }

    fn free_name(&self, filename: &str) -> String {
        if !self.input_dir.join(filename).exists() {
            return filename.to_string();
        }

        let path = Path::new(filename);
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        let mut counter = 1u32;
        loop {
            let candidate = format!("{stem}_{counter}{ext}");
            if !self.input_dir.join(&candidate).exists() {
                return candidate;
            }
            counter += 1;
        }
    }
}

/// Copying a file onto itself truncates it.
fn is_same_file(source: &Path, target: &Path) -> bool {
    match (fs::canonicalize(source), fs::canonicalize(target)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

impl ImageStager for ImageUploader {
    fn stage(
        &self,
        source: &Path,
        desired_name: Option<&str>,
        overwrite: bool,
    ) -> Result<StagedImage, CoreError> {
        self.upload(source, desired_name, overwrite)
            .map_err(CoreError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn source_image(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"\x89PNG fake").unwrap();
        path
    }

    #[test]
    fn copies_with_source_name() {
        let src = tempfile::tempdir().unwrap();
        let input = tempfile::tempdir().unwrap();
        let uploader = ImageUploader::new(input.path().join("input"));

        let staged = uploader
            .upload(&source_image(src.path(), "cat.png"), None, false)
            .unwrap();

        assert_eq!(staged.filename, "cat.png");
        assert_eq!(staged.size, 9);
        assert!(input.path().join("input/cat.png").is_file());
    }

    #[test]
    fn sanitizes_desired_name() {
        let src = tempfile::tempdir().unwrap();
        let input = tempfile::tempdir().unwrap();
        let uploader = ImageUploader::new(input.path());

        let staged = uploader
            .upload(&source_image(src.path(), "a.png"), Some("my photo!.jpg"), false)
            .unwrap();
        assert_eq!(staged.filename, "my_photo_.jpg");
    }

    #[test]
    fn picks_free_name_unless_overwriting() {
        let src = tempfile::tempdir().unwrap();
        let input = tempfile::tempdir().unwrap();
        let uploader = ImageUploader::new(input.path());
        let image = source_image(src.path(), "dog.png");

        assert_eq!(uploader.upload(&image, None, false).unwrap().filename, "dog.png");
        assert_eq!(uploader.upload(&image, None, false).unwrap().filename, "dog_1.png");
        assert_eq!(uploader.upload(&image, None, false).unwrap().filename, "dog_2.png");
        assert_eq!(uploader.upload(&image, None, true).unwrap().filename, "dog.png");
    }

    #[test]
    fn rejects_missing_source_and_bad_format() {
        let src = tempfile::tempdir().unwrap();
        let input = tempfile::tempdir().unwrap();
        let uploader = ImageUploader::new(input.path());

        let err = uploader
            .upload(&src.path().join("missing.png"), None, false)
            .unwrap_err();
        assert_matches!(err, StorageError::NotFound(_));

        let gif = source_image(src.path(), "anim.gif");
        let err = uploader.upload(&gif, None, false).unwrap_err();
        assert_matches!(err, StorageError::InvalidImageFormat(ref name) if name == "anim.gif");
    }

    #[test]
    fn stager_maps_errors_to_core() {
        let input = tempfile::tempdir().unwrap();
        let uploader = ImageUploader::new(input.path());

        let err = uploader
            .stage(Path::new("/definitely/not/here.png"), None, false)
            .unwrap_err();
        assert_matches!(err, CoreError::NotFound { entity: "file", .. });
    }

    #[test]
    fn restaging_file_from_input_folder_keeps_contents() {
        let input = tempfile::tempdir().unwrap();
        let uploader = ImageUploader::new(input.path());
        let staged = source_image(input.path(), "in_place.png");

        let again = uploader.upload(&staged, None, true).unwrap();
        assert_eq!(again.filename, "in_place.png");
        assert_eq!(again.size, 9);
        assert_eq!(fs::read(&staged).unwrap(), b"\x89PNG fake");
    }
}
