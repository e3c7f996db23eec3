use std::path::{Path, PathBuf};
use std::time::Duration;

use comfy_mcp_core::config::TemplatesConfig;
use serde::{Deserialize, Serialize};

/// Connection settings for the ComfyUI instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComfyUISection {
    pub base_url: String,
    pub websocket_url: String,
    /// Root of the ComfyUI installation; relative `paths` resolve against it.
    pub installation_path: PathBuf,
    /// Request and completion timeout in seconds.
    pub timeout: u64,
    /// History polling interval in seconds.
    pub poll_interval: f64,
}

impl Default for ComfyUISection {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8188".into(),
            websocket_url: "ws://127.0.0.1:8188/ws".into(),
            installation_path: PathBuf::from("."),
            timeout: 300,
            poll_interval: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsSection {
    pub models: PathBuf,
    pub input: PathBuf,
    pub output: PathBuf,
    pub workflow_library: PathBuf,
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            models: PathBuf::from("ComfyUI/models"),
            input: PathBuf::from("ComfyUI/input"),
            output: PathBuf::from("ComfyUI/output"),
            workflow_library: PathBuf::from("ComfyUI/user/default/workflows/mcp_library"),
        }
    }
}

/// Feature switches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesSection {
    /// Enables the `comfy_*_workflow` library tools.
    pub workflow_library: bool,
    /// Enables scanning the models directory in `comfy_list_models`.
    pub auto_model_detection: bool,
    /// Watch the WebSocket stream while waiting for completion.
    pub websocket_progress: bool,
    /// Reuse model scans for [`MODEL_CACHE_TTL`].
    pub model_caching: bool,
}

impl Default for FeaturesSection {
    fn default() -> Self {
        Self {
            workflow_library: true,
            auto_model_detection: true,
            websocket_progress: true,
            model_caching: true,
        }
    }
}

/// How long a cached model scan stays valid.
pub const MODEL_CACHE_TTL: Duration = Duration::from_secs(60);

/// Server configuration.
///
/// Each section is merged over its defaults independently, so a config
/// file may set any subset of sections and fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub comfyui: ComfyUISection,
    pub paths: PathsSection,
    pub templates: TemplatesConfig,
    pub features: FeaturesSection,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl ServerConfig {
    /// Load configuration from the config file and environment.
    ///
    /// | Env Var          | Default                   |
    /// |------------------|---------------------------|
    /// | `COMFYUI_CONFIG` | `./config.json`           |
    /// | `COMFYUI_URL`    | `http://127.0.0.1:8188`   |
    /// | `COMFYUI_WS_URL` | `ws://127.0.0.1:8188/ws`  |
    /// | `COMFYUI_PATH`   | `.`                       |
    ///
    /// A missing or unreadable config file is logged and defaults are used.
    pub fn load() -> Self {
        let path = std::env::var("COMFYUI_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.json"));

        let mut config = match Self::from_file(&path) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "Loaded configuration file");
                config
            }
            Err(e) => {
                tracing::warn!(error = %e, "Using default configuration");
                Self::default()
            }
        };

        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Apply `COMFYUI_URL`, `COMFYUI_WS_URL` and `COMFYUI_PATH` overrides.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("COMFYUI_URL").filter(|v| !v.is_empty()) {
            self.comfyui.base_url = url;
        }
        if let Some(url) = lookup("COMFYUI_WS_URL").filter(|v| !v.is_empty()) {
            self.comfyui.websocket_url = url;
        }
        if let Some(path) = lookup("COMFYUI_PATH").filter(|v| !v.is_empty()) {
            self.comfyui.installation_path = PathBuf::from(path);
        }
    }

    /// Resolve `path` against the installation root unless it is absolute.
    pub fn full_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.comfyui.installation_path.join(path)
        }
    }

    pub fn models_dir(&self) -> PathBuf {
        self.full_path(&self.paths.models)
    }

    pub fn input_dir(&self) -> PathBuf {
        self.full_path(&self.paths.input)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.full_path(&self.paths.output)
    }

    pub fn library_dir(&self) -> PathBuf {
        self.full_path(&self.paths.workflow_library)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.comfyui.timeout)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.comfyui.poll_interval.max(0.1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn partial_sections_merge_over_defaults() {
        let config = ServerConfig::from_json_str(
            r#"{
                "comfyui": { "base_url": "http://gpu-box:8188", "timeout": 60 },
                "features": { "websocket_progress": false }
            }"#,
        )
        .unwrap();

        assert_eq!(config.comfyui.base_url, "http://gpu-box:8188");
        assert_eq!(config.comfyui.timeout, 60);
        assert_eq!(config.comfyui.websocket_url, "ws://127.0.0.1:8188/ws");
        assert_eq!(config.comfyui.poll_interval, 2.0);
        assert!(!config.features.websocket_progress);
        assert!(config.features.workflow_library);
        assert_eq!(config.paths, PathsSection::default());
        assert_eq!(config.templates, TemplatesConfig::default());
    }

    #[test]
    fn template_section_replaces_named_entries_only() {
        let config = ServerConfig::from_json_str(
            r#"{ "templates": { "sd15_txt2img": { "enabled": false, "default_steps": 30 } } }"#,
        )
        .unwrap();

        assert!(!config.templates.sd15_txt2img.enabled);
        assert_eq!(config.templates.sd15_txt2img.default_steps, Some(30));
        assert_eq!(
            config.templates.flux_txt2img,
            TemplatesConfig::default().flux_txt2img
        );
    }

    #[test]
    fn env_overrides_win() {
        let mut config = ServerConfig::default();
        config.apply_env(|key| match key {
            "COMFYUI_URL" => Some("http://10.0.0.2:8188".into()),
            "COMFYUI_PATH" => Some("/opt/comfy".into()),
            "COMFYUI_WS_URL" => Some(String::new()),
            _ => None,
        });

        assert_eq!(config.comfyui.base_url, "http://10.0.0.2:8188");
        assert_eq!(config.comfyui.websocket_url, "ws://127.0.0.1:8188/ws");
        assert_eq!(config.models_dir(), PathBuf::from("/opt/comfy/ComfyUI/models"));
    }

    #[test]
    fn absolute_paths_are_kept() {
        let mut config = ServerConfig::default();
        config.paths.output = PathBuf::from("/data/out");
        assert_eq!(config.output_dir(), PathBuf::from("/data/out"));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = ServerConfig::from_file(Path::new("/no/such/config.json")).unwrap_err();
        assert_matches!(err, ConfigError::Read { .. });
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_matches!(ServerConfig::from_file(&path), Err(ConfigError::Parse { .. }));
    }
}
