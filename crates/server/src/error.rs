use comfy_mcp_comfyui::api::ComfyUIApiError;
use comfy_mcp_core::error::CoreError;
use comfy_mcp_storage::StorageError;
use serde::Serialize;
use serde_json::Value;

/// Error returned by a tool handler.
///
/// Rendered to the caller as an [`ErrorEnvelope`] inside a tool result
/// flagged `isError`, never as a JSON-RPC error.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Bad tool arguments.
    #[error("{0}")]
    Validation(String),

    /// The workflow graph failed structural validation.
    #[error("Workflow validation failed: {0}")]
    InvalidWorkflow(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    ComfyUI(#[from] ComfyUIApiError),

    /// ComfyUI reported a failure while running a prompt.
    #[error("{message}")]
    Execution {
        message: String,
        details: Option<Value>,
    },

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ToolResult<T> = Result<T, ToolError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Validation,
    Connection,
    Execution,
    Filesystem,
}

/// `{ "error": { "type", "code", "message", "details"?, "suggestions" } }`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub suggestions: Vec<&'static str>,
}

const CONNECTION_SUGGESTIONS: [&str; 3] = [
    "Ensure ComfyUI is running",
    "Verify the configured base_url and port (default 8188)",
    "Check if another application is using the port",
];
const INVALID_WORKFLOW_SUGGESTIONS: [&str; 3] = [
    "Check node connections in workflow JSON",
    "Verify node input/output types match",
    "Test workflow in ComfyUI interface first",
];
const FILE_NOT_FOUND_SUGGESTIONS: [&str; 3] = [
    "Verify the file path is correct",
    "Check file exists at the specified location",
    "Ensure you have read permissions for the file",
];
const PERMISSION_SUGGESTIONS: [&str; 3] = [
    "Check folder permissions",
    "Run with a user that can access the ComfyUI folders",
    "Verify paths are accessible",
];
const EXECUTION_SUGGESTIONS: [&str; 3] = [
    "Check ComfyUI console for detailed error messages",
    "Verify all required models are loaded",
    "Ensure sufficient VRAM/memory is available",
];
const TIMEOUT_SUGGESTIONS: [&str; 3] = [
    "Increase timeout value if needed",
    "Check ComfyUI is responding",
    "Verify network connection",
];
const VALIDATION_SUGGESTIONS: [&str; 3] = [
    "Check the provided parameters",
    "Refer to tool documentation for valid inputs",
    "Ensure all required fields are provided",
];

impl ToolError {
    pub fn validation(message: impl Into<String>) -> Self {
        ToolError::Validation(message.into())
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        let message = self.to_string();
        let (kind, code, suggestions, details) = match self {
            ToolError::Validation(_) => (
                ErrorKind::Validation,
                "VALIDATION_ERROR",
                VALIDATION_SUGGESTIONS,
                None,
            ),
            ToolError::InvalidWorkflow(_) => (
                ErrorKind::Validation,
                "INVALID_WORKFLOW",
                INVALID_WORKFLOW_SUGGESTIONS,
                None,
            ),
            ToolError::Core(core) => match core {
                CoreError::NotFound { entity: "file", .. } => (
                    ErrorKind::Filesystem,
                    "FILE_NOT_FOUND",
                    FILE_NOT_FOUND_SUGGESTIONS,
                    None,
                ),
                CoreError::NotFound { .. } | CoreError::Validation(_) => (
                    ErrorKind::Validation,
                    "VALIDATION_ERROR",
                    VALIDATION_SUGGESTIONS,
                    None,
                ),
                CoreError::Upload(_) | CoreError::Internal(_) => (
                    ErrorKind::Execution,
                    "EXECUTION_FAILED",
                    EXECUTION_SUGGESTIONS,
                    None,
                ),
            },
            ToolError::Storage(storage) => match storage {
                StorageError::NotFound(_) | StorageError::WorkflowNotFound(_) => (
                    ErrorKind::Filesystem,
                    "FILE_NOT_FOUND",
                    FILE_NOT_FOUND_SUGGESTIONS,
                    None,
                ),
                StorageError::PermissionDenied(_) => (
                    ErrorKind::Filesystem,
                    "PERMISSION_DENIED",
                    PERMISSION_SUGGESTIONS,
                    None,
                ),
                StorageError::InvalidImageFormat(_)
                | StorageError::InvalidName(_)
                | StorageError::WorkflowExists(_) => (
                    ErrorKind::Validation,
                    "VALIDATION_ERROR",
                    VALIDATION_SUGGESTIONS,
                    None,
                ),
                StorageError::Io(_) | StorageError::Json(_) => (
                    ErrorKind::Filesystem,
                    "EXECUTION_FAILED",
                    EXECUTION_SUGGESTIONS,
                    None,
                ),
            },
            ToolError::ComfyUI(api) if api.is_timeout() => (
                ErrorKind::Connection,
                "TIMEOUT",
                TIMEOUT_SUGGESTIONS,
                None,
            ),
            ToolError::ComfyUI(api) if api.is_connection_error() => (
                ErrorKind::Connection,
                "COMFYUI_NOT_RUNNING",
                CONNECTION_SUGGESTIONS,
                None,
            ),
            ToolError::ComfyUI(_) => (
                ErrorKind::Execution,
                "EXECUTION_FAILED",
                EXECUTION_SUGGESTIONS,
                None,
            ),
            ToolError::Execution { details, .. } => (
                ErrorKind::Execution,
                "EXECUTION_FAILED",
                EXECUTION_SUGGESTIONS,
                details.clone(),
            ),
            ToolError::Timeout(_) => (
                ErrorKind::Connection,
                "TIMEOUT",
                TIMEOUT_SUGGESTIONS,
                None,
            ),
            ToolError::Internal(_) => {
                tracing::error!(error = %message, "Internal tool error");
                (
                    ErrorKind::Execution,
                    "EXECUTION_FAILED",
                    EXECUTION_SUGGESTIONS,
                    None,
                )
            }
        };

        ErrorEnvelope {
            error: ErrorBody {
                kind,
                code,
                message,
                details,
                suggestions: suggestions.to_vec(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    #[test]
    fn validation_envelope_shape() {
        let envelope = ToolError::validation("Set confirm=true to clear the queue").envelope();
        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["error"]["type"], "validation");
        assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(json["error"]["message"], "Set confirm=true to clear the queue");
        assert_eq!(json["error"]["suggestions"].as_array().unwrap().len(), 3);
        assert!(json["error"].get("details").is_none());
    }

    #[test]
    fn invalid_workflow_prefixes_message() {
        let envelope = ToolError::InvalidWorkflow("Node '3' must be an object".into()).envelope();
        assert_eq!(envelope.error.code, "INVALID_WORKFLOW");
        assert_eq!(
            envelope.error.message,
            "Workflow validation failed: Node '3' must be an object"
        );
    }

    #[test]
    fn storage_errors_map_to_filesystem_codes() {
        let missing = ToolError::from(StorageError::NotFound(PathBuf::from("/tmp/a.png"))).envelope();
        assert_eq!(missing.error.kind, ErrorKind::Filesystem);
        assert_eq!(missing.error.code, "FILE_NOT_FOUND");
        assert_eq!(missing.error.message, "File not found: /tmp/a.png");

        let denied =
            ToolError::from(StorageError::PermissionDenied(PathBuf::from("/root"))).envelope();
        assert_eq!(denied.error.code, "PERMISSION_DENIED");

        let exists = ToolError::from(StorageError::WorkflowExists("wf".into())).envelope();
        assert_eq!(exists.error.code, "VALIDATION_ERROR");
    }

    #[test]
    fn core_not_found_file_is_filesystem() {
        let envelope = ToolError::from(CoreError::NotFound {
            entity: "file",
            name: "/x.png".into(),
        })
        .envelope();
        assert_eq!(envelope.error.code, "FILE_NOT_FOUND");
    }

    #[test]
    fn execution_carries_details() {
        let envelope = ToolError::Execution {
            message: "Execution failed at node 5".into(),
            details: Some(json!({ "node_id": "5" })),
        }
        .envelope();
        assert_eq!(envelope.error.kind, ErrorKind::Execution);
        assert_eq!(envelope.error.details, Some(json!({ "node_id": "5" })));
    }

    #[test]
    fn api_status_errors_are_execution_failures() {
        let envelope = ToolError::from(ComfyUIApiError::ApiError {
            status: 500,
            body: "boom".into(),
        })
        .envelope();
        assert_eq!(envelope.error.code, "EXECUTION_FAILED");
        assert!(envelope.error.message.contains("boom"));
    }
}
