//! Local `list_directory` tool (§4.2 Supplemented), grounded in the original
//! `tools/system_tools.py` filesystem helpers. Lives in the `FILESYSTEM`
//! category alongside whatever a remote filesystem tool server exposes, so
//! `FilterForQuery` can select it with no tool server running.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tools::registry::LocalTool;
use crate::types::{OrchestratorError, Result};

pub struct ListDirectory;

#[async_trait]
impl LocalTool for ListDirectory {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "List the entries (files and subdirectories) of a directory on the local filesystem"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Directory path to list" }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        let path = args["path"]
            .as_str()
            .ok_or_else(|| OrchestratorError::ToolError("missing required argument 'path'".into()))?;

        let mut entries = tokio::fs::read_dir(path)
            .await
            .map_err(|e| OrchestratorError::ToolError(format!("cannot read directory '{path}': {e}")))?;

        let mut listing = Vec::new();
        loop {
            let next = entries
                .next_entry()
                .await
                .map_err(|e| OrchestratorError::ToolError(format!("error reading directory entry: {e}")))?;
            let Some(entry) = next else { break };

            let file_type = entry
                .file_type()
                .await
                .map_err(|e| OrchestratorError::ToolError(format!("error reading entry metadata: {e}")))?;
            listing.push(json!({
                "name": entry.file_name().to_string_lossy(),
                "is_dir": file_type.is_dir(),
            }));
        }

        Ok(json!({ "path": path, "entries": listing }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_a_real_directory() {
        let tool = ListDirectory;
        let result = tool.execute(json!({"path": "."})).await.unwrap();
        assert!(result["entries"].is_array());
    }

    #[tokio::test]
    async fn missing_path_argument_errors() {
        let tool = ListDirectory;
        let result = tool.execute(json!({})).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn nonexistent_directory_errors() {
        let tool = ListDirectory;
        let result = tool.execute(json!({"path": "/no/such/path/xyz"})).await;
        assert!(result.is_err());
    }
}
