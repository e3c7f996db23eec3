//! `comfy-mcp` -- ComfyUI tool server on stdio.
//!
//! Reads JSON-RPC requests from stdin and writes responses to stdout. Logs
//! go to stderr.
//!
//! # Environment variables
//!
//! | Variable         | Required | Default                  | Description                      |
//! |------------------|----------|--------------------------|----------------------------------|
//! | `COMFYUI_CONFIG` | no       | `./config.json`          | JSON configuration file          |
//! | `COMFYUI_URL`    | no       | `http://127.0.0.1:8188`  | ComfyUI HTTP endpoint            |
//! | `COMFYUI_WS_URL` | no       | `ws://127.0.0.1:8188/ws` | ComfyUI WebSocket endpoint       |
//! | `COMFYUI_PATH`   | no       | `.`                      | ComfyUI installation directory   |
//! | `RUST_LOG`       | no       | `comfy_mcp=info`         | Log filter                       |

use comfy_mcp_server::config::ServerConfig;
use comfy_mcp_server::rpc::McpServer;
use comfy_mcp_server::state::AppState;
use tokio::io::BufReader;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "comfy_mcp=info,comfy_mcp_server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = ServerConfig::load();
    tracing::info!(
        base_url = %config.comfyui.base_url,
        installation_path = %config.comfyui.installation_path.display(),
        "Starting comfy-mcp",
    );

    let state = AppState::new(config)?;
    if !state.api.health_check().await {
        tracing::warn!(
            api_url = %state.api.api_url(),
            "ComfyUI is not reachable yet; tools will report connection errors until it is",
        );
    }

    let server = McpServer::new(state);
    server
        .serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await?;

    Ok(())
}
