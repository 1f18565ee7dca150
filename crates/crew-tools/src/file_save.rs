//! File Save Tool
//!
//! Writes agent-produced content into a workspace directory. The saved path
//! travels as carry-over data so later steps can refer back to it.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use crew_core::{
    error::{CrewError, Result},
    tool::{ParameterSchema, Tool, ToolCall, ToolResult, ToolSchema},
};

/// Tool that saves text content under a workspace directory
pub struct FileSaveTool {
    workspace_dir: PathBuf,
}

impl Default for FileSaveTool {
    fn default() -> Self {
        Self::new("workspace")
    }
}

impl FileSaveTool {
    pub fn new(workspace_dir: impl Into<PathBuf>) -> Self {
        Self {
            workspace_dir: workspace_dir.into(),
        }
    }
}

/// A single path component, with no traversal tricks
fn is_safe_component(name: &str) -> bool {
    !name.is_empty()
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
        && !Path::new(name).is_absolute()
}

#[async_trait]
impl Tool for FileSaveTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "file_save".into(),
            description: "Save text content to a file in the workspace directory".into(),
            parameters: vec![
                ParameterSchema {
                    name: "file_name".into(),
                    param_type: "string".into(),
                    description: "Name of the file to write, including its extension".into(),
                    required: true,
                    default: None,
                    enum_values: None,
                },
                ParameterSchema {
                    name: "content".into(),
                    param_type: "string".into(),
                    description: "The content to write".into(),
                    required: true,
                    default: None,
                    enum_values: None,
                },
                ParameterSchema {
                    name: "subdir".into(),
                    param_type: "string".into(),
                    description: "Optional subdirectory under the workspace".into(),
                    required: false,
                    default: None,
                    enum_values: None,
                },
            ],
            category: Some("io".into()),
            has_side_effects: true,
        }
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResult> {
        let file_name = call
            .arguments
            .get("file_name")
            .and_then(Value::as_str)
            .ok_or_else(|| CrewError::ToolValidation("file_name must be a string".into()))?;
        let content = call
            .arguments
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| CrewError::ToolValidation("content must be a string".into()))?;
        let subdir = call.arguments.get("subdir").and_then(Value::as_str);

        if !is_safe_component(file_name) {
            return Ok(ToolResult::failure(
                "file_save",
                format!("invalid file name {file_name:?}"),
            ));
        }
        if let Some(subdir) = subdir {
            if !is_safe_component(subdir) {
                return Ok(ToolResult::failure(
                    "file_save",
                    format!("invalid subdirectory {subdir:?}"),
                ));
            }
        }

        let mut dir = self.workspace_dir.clone();
        if let Some(subdir) = subdir {
            dir.push(subdir);
        }
        tokio::fs::create_dir_all(&dir).await?;

        let path = dir.join(file_name);
        tokio::fs::write(&path, content.as_bytes()).await?;
        tracing::info!(path = %path.display(), bytes = content.len(), "file saved");

        let shown = path.display().to_string();
        Ok(
            ToolResult::success("file_save", format!("saved {} bytes to {shown}", content.len()))
                .with_carry_over(serde_json::json!({ "last_saved_file": shown })),
        )
    }
}
