//! `comfy_upload_image` and `comfy_get_output_images`.

use std::path::PathBuf;

use comfy_mcp_storage::outputs::{list_output_images, SortOrder, DEFAULT_OUTPUT_LIMIT};
use serde::Deserialize;
use serde_json::{json, Value};

use super::schema::{self, properties};
use super::{blocking, to_json, ToolDefinition};
use crate::error::ToolResult;
use crate::state::AppState;

pub const UPLOAD_IMAGE: &str = "comfy_upload_image";
pub const GET_OUTPUT_IMAGES: &str = "comfy_get_output_images";

#[derive(Debug, Deserialize)]
pub struct UploadImageInput {
    pub image_path: PathBuf,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub overwrite: bool,
}

#[derive(Debug, Deserialize)]
pub struct GetOutputImagesInput {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub sort: SortOrder,
    #[serde(default)]
    pub filter: Option<String>,
}

fn default_limit() -> usize {
    DEFAULT_OUTPUT_LIMIT
}

pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: UPLOAD_IMAGE,
            description: "Copy a local image into ComfyUI's input folder for use in workflows. \
                Supports custom filenames and overwrite control.",
            input_schema: schema::object(
                properties([
                    ("image_path", schema::string("Path of the image to upload")),
                    ("filename", schema::string("Name to store the image under")),
                    ("overwrite", schema::boolean("Replace an existing file with the same name", false)),
                ]),
                &["image_path"],
            ),
        },
        ToolDefinition {
            name: GET_OUTPUT_IMAGES,
            description: "List recent images in ComfyUI's output folder with their full paths.",
            input_schema: schema::object(
                properties([
                    ("limit", schema::integer("Maximum number of images (default 20)")),
                    ("sort", schema::string_enum("Sort order", &["newest", "oldest", "name"])),
                    ("filter", schema::string("Substring of the file name")),
                ]),
                &[],
            ),
        },
    ]
}

pub async fn upload_image(state: &AppState, input: UploadImageInput) -> ToolResult<Value> {
    let uploader = state.uploader.clone();
    let staged = blocking(move || {
        Ok(uploader.upload(&input.image_path, input.filename.as_deref(), input.overwrite)?)
    })
    .await?;

    Ok(json!({
        "filename": staged.filename,
        "path": staged.path.display().to_string(),
        "size": staged.size,
        "message": format!("Image uploaded successfully as {}", staged.filename),
    }))
}

pub async fn get_output_images(state: &AppState, input: GetOutputImagesInput) -> ToolResult<Value> {
    let dir = state.config.output_dir();
    let images = blocking(move || {
        Ok(list_output_images(&dir, input.limit, input.sort, input.filter.as_deref())?)
    })
    .await?;

    Ok(json!({
        "total_count": images.len(),
        "images": to_json(&images)?,
    }))
}
