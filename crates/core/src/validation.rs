//! Name and file validation helpers shared by the storage and server crates.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::CoreError;

/// Maximum length of a library workflow name.
pub const MAX_WORKFLOW_NAME_LENGTH: usize = 200;

/// Image extensions the engine can load, lower-case and without the dot.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp"];

static WORKFLOW_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9_-]+$").expect("valid regex")
});

static UNSAFE_FILENAME_CHARS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^a-zA-Z0-9_.-]").expect("valid regex")
});

/// Validate a workflow library name: letters, digits, `_` and `-` only.
pub fn validate_workflow_name(name: &str) -> Result<(), CoreError> {
    if name.is_empty() {
        return Err(CoreError::Validation(
            "Workflow name must not be empty".to_string(),
        ));
    }
    if name.len() > MAX_WORKFLOW_NAME_LENGTH {
        return Err(CoreError::Validation(format!(
            "Workflow name must be at most {MAX_WORKFLOW_NAME_LENGTH} characters, got {}",
            name.len()
        )));
    }
    if !WORKFLOW_NAME_RE.is_match(name) {
        return Err(CoreError::Validation(format!(
            "Invalid workflow name '{name}'. Use only letters, numbers, underscores, and hyphens"
        )));
    }
    Ok(())
}

/// Replace every character outside `[A-Za-z0-9_.-]` with `_`.
pub fn sanitize_filename(name: &str) -> String {
    UNSAFE_FILENAME_CHARS_RE.replace_all(name, "_").into_owned()
}

/// Whether `path` has one of [`IMAGE_EXTENSIONS`] (case-insensitive).
pub fn is_valid_image_format(path: impl AsRef<Path>) -> bool {
    path.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn valid_workflow_name_accepted() {
        assert!(validate_workflow_name("portrait_v2-final").is_ok());
    }

    #[test]
    fn empty_workflow_name_rejected() {
        let err = validate_workflow_name("").unwrap_err();
        assert_matches!(err, CoreError::Validation(_));
    }

    #[test]
    fn workflow_name_with_spaces_or_dots_rejected() {
        assert!(validate_workflow_name("my workflow").is_err());
        assert!(validate_workflow_name("../escape").is_err());
        assert!(validate_workflow_name("name.json").is_err());
    }

    #[test]
    fn too_long_workflow_name_rejected() {
        let name = "a".repeat(MAX_WORKFLOW_NAME_LENGTH + 1);
        let err = validate_workflow_name(&name).unwrap_err();
        assert!(err.to_string().contains("at most"));
    }

    #[test]
    fn sanitize_replaces_unsafe_characters() {
        assert_eq!(sanitize_filename("my photo (1).png"), "my_photo__1_.png");
        assert_eq!(sanitize_filename("ok-name_1.jpg"), "ok-name_1.jpg");
    }

    #[test]
    fn image_format_check_is_case_insensitive() {
        assert!(is_valid_image_format("a.PNG"));
        assert!(is_valid_image_format("dir/b.webp"));
        assert!(!is_valid_image_format("c.gif"));
        assert!(!is_valid_image_format("no_extension"));
    }
}
