use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use comfy_mcp_comfyui::api::{generate_client_id, ComfyUIApi, ComfyUIApiError};
use comfy_mcp_comfyui::watch::CompletionWatcher;
use comfy_mcp_storage::library::WorkflowLibrary;
use comfy_mcp_storage::models::{ModelInfo, ModelKind};
use comfy_mcp_storage::upload::ImageUploader;

use crate::config::{ServerConfig, MODEL_CACHE_TTL};

/// Shared state available to every tool handler.
///
/// Cheaply cloneable; blocking filesystem work gets its own clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// REST client for the configured ComfyUI instance.
    pub api: ComfyUIApi,
    /// Client ID for this server session. Used for submissions and for the
    /// WebSocket watcher so execution messages reach us.
    pub client_id: Arc<str>,
    pub watcher: CompletionWatcher,
    pub uploader: ImageUploader,
    pub library: WorkflowLibrary,
    pub model_cache: Arc<ModelCache>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Result<Self, ComfyUIApiError> {
        let api = ComfyUIApi::with_timeout(config.comfyui.base_url.clone(), config.timeout())?;
        let client_id: Arc<str> = generate_client_id().into();
        let watcher = CompletionWatcher::new(config.comfyui.websocket_url.clone(), &*client_id);
        let uploader = ImageUploader::new(config.input_dir());
        let library = WorkflowLibrary::new(config.library_dir());

        tracing::info!(
            api_url = %api.api_url(),
            client_id = %client_id,
            "Initialised ComfyUI session",
        );

        Ok(Self {
            config: Arc::new(config),
            api,
            client_id,
            watcher,
            uploader,
            library,
            model_cache: Arc::new(ModelCache::default()),
        })
    }
}

/// Model scans keyed by kind (`None` = all kinds), valid for
/// [`MODEL_CACHE_TTL`].
#[derive(Debug, Default)]
pub struct ModelCache {
    entries: Mutex<HashMap<Option<ModelKind>, (Instant, Vec<ModelInfo>)>>,
}

impl ModelCache {
    pub fn get(&self, kind: Option<ModelKind>) -> Option<Vec<ModelInfo>> {
        let entries = self.entries.lock().ok()?;
        entries
            .get(&kind)
            .filter(|(at, _)| at.elapsed() < MODEL_CACHE_TTL)
            .map(|(_, models)| models.clone())
    }

    pub fn put(&self, kind: Option<ModelKind>, models: Vec<ModelInfo>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(kind, (Instant::now(), models));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_round_trip_per_kind() {
        let cache = ModelCache::default();
        assert!(cache.get(None).is_none());

        let model = ModelInfo {
            kind: ModelKind::Loras,
            name: "a.safetensors".into(),
            path: "loras/a.safetensors".into(),
            size: 1,
        };
        cache.put(Some(ModelKind::Loras), vec![model.clone()]);

        assert_eq!(cache.get(Some(ModelKind::Loras)), Some(vec![model]));
        assert!(cache.get(None).is_none());
    }

    #[test]
    fn new_state_uses_configured_paths() {
        let mut config = ServerConfig::default();
        config.comfyui.installation_path = "/srv/comfy".into();
        let state = AppState::new(config).unwrap();

        assert_eq!(state.api.api_url(), "http://127.0.0.1:8188");
        assert!(state.client_id.starts_with("mcp-"));
        assert_eq!(
            state.uploader.input_dir(),
            std::path::Path::new("/srv/comfy/ComfyUI/input")
        );
        assert_eq!(
            state.library.root(),
            std::path::Path::new("/srv/comfy/ComfyUI/user/default/workflows/mcp_library")
        );
    }
}
