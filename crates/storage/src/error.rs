use std::io;
use std::path::{Path, PathBuf};

use comfy_mcp_core::error::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    #[error("Invalid image format: {0}. Supported formats: png, jpg, jpeg, webp, bmp")]
    InvalidImageFormat(String),

    #[error("Workflow '{0}' already exists")]
    WorkflowExists(String),

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl StorageError {
    /// Attach `path` to an I/O error, keeping not-found and permission
    /// failures distinguishable.
    pub fn at(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => StorageError::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => StorageError::PermissionDenied(path.to_path_buf()),
            _ => StorageError::Io(err),
        }
    }
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(path) => CoreError::NotFound {
                entity: "file",
                name: path.display().to_string(),
            },
            StorageError::InvalidImageFormat(_) | StorageError::InvalidName(_) => {
                CoreError::Validation(err.to_string())
            }
            other => CoreError::Upload(other.to_string()),
        }
    }
}
