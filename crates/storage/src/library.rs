//! Named workflow library: one pretty-printed JSON file per workflow.
//!
//! ```json
//! {
//!   "name": "portrait",
//!   "description": "Soft light portrait",
//!   "tags": ["people"],
//!   "created_at": "2025-01-01T00:00:00Z",
//!   "updated_at": "2025-01-02T00:00:00Z",
//!   "workflow": { "3": { "class_type": "KSampler", "inputs": {} } }
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use comfy_mcp_core::graph::Workflow;
use comfy_mcp_core::validation::validate_workflow_name;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// A stored workflow with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub workflow: Workflow,
}

/// Listing row; the workflow body is not included.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LibrarySummary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub node_count: usize,
    /// File size in bytes.
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct WorkflowLibrary {
    root: PathBuf,
}

impl WorkflowLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File path for `name`, after validating it.
    pub fn path_for(&self, name: &str) -> Result<PathBuf, StorageError> {
        validate_workflow_name(name).map_err(|e| StorageError::InvalidName(e.to_string()))?;
        Ok(self.root.join(format!("{name}.json")))
    }

    /// Save `workflow` under `name`.
    ///
    /// Fails with [`StorageError::WorkflowExists`] when the name is taken
    /// and `overwrite` is false. Overwriting keeps the original
    /// `created_at`.
    pub fn save(
        &self,
        name: &str,
        description: Option<String>,
        tags: Vec<String>,
        workflow: Workflow,
        overwrite: bool,
    ) -> Result<LibraryEntry, StorageError> {
        let path = self.path_for(name)?;
        fs::create_dir_all(&self.root).map_err(|e| StorageError::at(&self.root, e))?;

        let now = Utc::now();
        let created_at = if path.exists() {
            if !overwrite {
                return Err(StorageError::WorkflowExists(name.to_string()));
            }
            match read_entry(&path) {
                Ok(existing) => existing.created_at,
                Err(e) => {
                    tracing::warn!(name, error = %e, "Existing library entry unreadable, resetting created_at");
                    now
                }
            }
        } else {
            now
        };

        let entry = LibraryEntry {
            name: name.to_string(),
            description,
            tags,
            created_at,
            updated_at: now,
            workflow,
        };

        let json = serde_json::to_string_pretty(&entry)?;
        fs::write(&path, json).map_err(|e| StorageError::at(&path, e))?;

        tracing::info!(name, path = %path.display(), nodes = entry.workflow.len(), "Saved workflow");
        Ok(entry)
    }

    pub fn load(&self, name: &str) -> Result<LibraryEntry, StorageError> {
        let path = self.path_for(name)?;
        if !path.is_file() {
            return Err(StorageError::WorkflowNotFound(name.to_string()));
        }
        read_entry(&path)
    }

    /// List stored workflows sorted by name.
    ///
    /// `filter` matches a case-insensitive substring of the name or
    /// description. `tags` keeps entries carrying at least one of them.
    /// Files that fail to parse are logged and skipped.
    pub fn list(
        &self,
        filter: Option<&str>,
        tags: &[String],
    ) -> Result<Vec<LibrarySummary>, StorageError> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let needle = filter
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_lowercase);

        let mut rows = Vec::new();
        for dir_entry in fs::read_dir(&self.root).map_err(|e| StorageError::at(&self.root, e))? {
            let path = dir_entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let entry = match read_entry(&path) {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable library file");
                    continue;
                }
            };

            if let Some(needle) = &needle {
                let in_name = entry.name.to_lowercase().contains(needle);
                let in_description = entry
                    .description
                    .as_deref()
                    .is_some_and(|d| d.to_lowercase().contains(needle));
                if !in_name && !in_description {
                    continue;
                }
            }
            if !tags.is_empty() && !entry.tags.iter().any(|t| tags.contains(t)) {
                continue;
            }

            let size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            rows.push(LibrarySummary {
                node_count: entry.workflow.len(),
                name: entry.name,
                description: entry.description,
                tags: entry.tags,
                created_at: entry.created_at,
                updated_at: entry.updated_at,
                size,
            });
        }

        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    /// Delete `name`, returning the removed file's path.
    pub fn delete(&self, name: &str) -> Result<PathBuf, StorageError> {
        let path = self.path_for(name)?;
        if !path.is_file() {
            return Err(StorageError::WorkflowNotFound(name.to_string()));
        }
        fs::remove_file(&path).map_err(|e| StorageError::at(&path, e))?;
        tracing::info!(name, "Deleted workflow");
        Ok(path)
    }
}

fn read_entry(path: &Path) -> Result<LibraryEntry, StorageError> {
    let text = fs::read_to_string(path).map_err(|e| StorageError::at(path, e))?;
    Ok(serde_json::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use comfy_mcp_core::graph::parse_workflow;
    use serde_json::json;

    fn workflow() -> Workflow {
        parse_workflow(&json!({
            "1": { "class_type": "CheckpointLoaderSimple", "inputs": { "ckpt_name": "a.safetensors" } },
            "2": { "class_type": "KSampler", "inputs": { "model": ["1", 0], "seed": 1 } }
        }))
        .unwrap()
    }

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let library = WorkflowLibrary::new(dir.path().join("workflows"));

        let saved = library
            .save("portrait", Some("Soft light".into()), tags(&["people"]), workflow(), false)
            .unwrap();
        let loaded = library.load("portrait").unwrap();

        assert_eq!(loaded, saved);
        assert_eq!(loaded.workflow.len(), 2);
        assert!(dir.path().join("workflows/portrait.json").is_file());
    }

    #[test]
    fn save_refuses_existing_without_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let library = WorkflowLibrary::new(dir.path());

        library.save("wf", None, vec![], workflow(), false).unwrap();
        let err = library.save("wf", None, vec![], workflow(), false).unwrap_err();
        assert_matches!(err, StorageError::WorkflowExists(ref n) if n == "wf");
    }

    #[test]
    fn overwrite_keeps_created_at() {
        let dir = tempfile::tempdir().unwrap();
        let library = WorkflowLibrary::new(dir.path());

        let first = library.save("wf", None, vec![], workflow(), false).unwrap();
        let second = library
            .save("wf", Some("v2".into()), vec![], workflow(), true)
            .unwrap();

        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);
        assert_eq!(library.load("wf").unwrap().description.as_deref(), Some("v2"));
    }

    #[test]
    fn invalid_names_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let library = WorkflowLibrary::new(dir.path());

        assert_matches!(
            library.save("../escape", None, vec![], workflow(), false),
            Err(StorageError::InvalidName(_))
        );
        assert_matches!(library.load(""), Err(StorageError::InvalidName(_)));
    }

    #[test]
    fn list_filters_by_text_and_tags() {
        let dir = tempfile::tempdir().unwrap();
        let library = WorkflowLibrary::new(dir.path());

        library
            .save("portrait", Some("Soft LIGHT".into()), tags(&["people"]), workflow(), false)
            .unwrap();
        library
            .save("landscape", None, tags(&["nature", "wide"]), workflow(), false)
            .unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        fs::write(dir.path().join("broken.json"), "{").unwrap();

        let all = library.list(None, &[]).unwrap();
        let names: Vec<_> = all.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["landscape", "portrait"]);
        assert_eq!(all[0].node_count, 2);
        assert!(all[0].size > 0);

        let by_description = library.list(Some("light"), &[]).unwrap();
        assert_eq!(by_description.len(), 1);
        assert_eq!(by_description[0].name, "portrait");

        let by_tag = library.list(None, &tags(&["wide", "other"])).unwrap();
        assert_eq!(by_tag.len(), 1);
        assert_eq!(by_tag[0].name, "landscape");
    }

    #[test]
    fn delete_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let library = WorkflowLibrary::new(dir.path());

        library.save("wf", None, vec![], workflow(), false).unwrap();
        let path = library.delete("wf").unwrap();
        assert!(!path.exists());
        assert_matches!(library.load("wf"), Err(StorageError::WorkflowNotFound(_)));
        assert_matches!(library.delete("wf"), Err(StorageError::WorkflowNotFound(_)));
    }

    #[test]
    fn missing_root_lists_empty() {
        let dir = tempfile::tempdir().unwrap();
        let library = WorkflowLibrary::new(dir.path().join("nope"));
        assert!(library.list(None, &[]).unwrap().is_empty());
    }
}
