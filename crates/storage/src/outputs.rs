//! Listing generated images in the ComfyUI output folder.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use comfy_mcp_core::validation::is_valid_image_format;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

pub const DEFAULT_OUTPUT_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Most recently modified first.
    #[default]
    Newest,
    Oldest,
    /// By file name, ascending.
    Name,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageInfo {
    pub filename: String,
    pub path: PathBuf,
    pub size: u64,
    /// Not every filesystem records creation time.
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: DateTime<Utc>,
}

/// List image files directly inside `dir`.
///
/// `filter` keeps files whose name contains the substring. The result is
/// sorted by `sort` and truncated to `limit`. A missing folder lists as
/// empty.
pub fn list_output_images(
    dir: &Path,
    limit: usize,
    sort: SortOrder,
    filter: Option<&str>,
) -> Result<Vec<ImageInfo>, StorageError> {
    if !dir.is_dir() {
        tracing::debug!(dir = %dir.display(), "Output directory does not exist");
        return Ok(Vec::new());
    }

    let mut images = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| StorageError::at(dir, e))? {
        let entry = entry?;
        let path = entry.path();
        let filename = entry.file_name().to_string_lossy().into_owned();

        if !is_valid_image_format(&path) {
            continue;
        }
        if let Some(needle) = filter {
            if !filename.contains(needle) {
                continue;
            }
        }

        let metadata = entry.metadata().map_err(|e| StorageError::at(&path, e))?;
        if !metadata.is_file() {
            continue;
        }

        images.push(ImageInfo {
            filename,
            path,
            size: metadata.len(),
            created_at: metadata.created().ok().map(DateTime::<Utc>::from),
            modified_at: metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now()),
        });
    }

    match sort {
        SortOrder::Newest => images.sort_by(|a, b| b.modified_at.cmp(&a.modified_at)),
        SortOrder::Oldest => images.sort_by(|a, b| a.modified_at.cmp(&b.modified_at)),
        SortOrder::Name => images.sort_by(|a, b| a.filename.cmp(&b.filename)),
    }
    images.truncate(limit);

    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    fn write_with_mtime(dir: &Path, name: &str, age_secs: u64) {
        let path = dir.join(name);
        fs::write(&path, b"img").unwrap();
        let file = fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(age_secs))
            .unwrap();
    }

    fn names(images: &[ImageInfo]) -> Vec<&str> {
        images.iter().map(|i| i.filename.as_str()).collect()
    }

    #[test]
    fn sorts_and_limits() {
        let dir = tempfile::tempdir().unwrap();
        write_with_mtime(dir.path(), "b.png", 300);
        write_with_mtime(dir.path(), "a.png", 100);
        write_with_mtime(dir.path(), "c.webp", 200);
        write_with_mtime(dir.path(), "notes.txt", 0);

        let newest = list_output_images(dir.path(), 10, SortOrder::Newest, None).unwrap();
        assert_eq!(names(&newest), vec!["a.png", "c.webp", "b.png"]);

        let oldest = list_output_images(dir.path(), 2, SortOrder::Oldest, None).unwrap();
        assert_eq!(names(&oldest), vec!["b.png", "c.webp"]);

        let by_name = list_output_images(dir.path(), 10, SortOrder::Name, None).unwrap();
        assert_eq!(names(&by_name), vec!["a.png", "b.png", "c.webp"]);
    }

    #[test]
    fn filters_by_substring() {
        let dir = tempfile::tempdir().unwrap();
        write_with_mtime(dir.path(), "flux_00001_.png", 0);
        write_with_mtime(dir.path(), "sdxl_00001_.png", 0);

        let flux = list_output_images(dir.path(), 10, SortOrder::Name, Some("flux")).unwrap();
        assert_eq!(names(&flux), vec!["flux_00001_.png"]);
    }

    #[test]
    fn missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let images =
            list_output_images(&dir.path().join("output"), 10, SortOrder::Newest, None).unwrap();
        assert!(images.is_empty());
    }

    #[test]
    fn subdirectories_are_not_listed() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("nested.png")).unwrap();
        write_with_mtime(dir.path(), "top.png", 0);

        let images = list_output_images(dir.path(), 10, SortOrder::Name, None).unwrap();
        assert_eq!(names(&images), vec!["top.png"]);
    }
}
