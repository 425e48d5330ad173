//! File read/write tools scoped to a workspace directory, reusing the
//! teacher's `allowed_dir` containment check from `agent/tools.rs`.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::tools::traits::{ParameterSpec, Tool, ToolCharacteristics, ToolDefinition, ToolResult};

fn resolve_within(allowed_dir: &PathBuf, path: &str) -> Result<PathBuf> {
    let full_path = allowed_dir.join(path);
    let canonical = full_path.canonicalize().unwrap_or_else(|_| full_path.clone());
    let allowed_canonical = allowed_dir.canonicalize().unwrap_or_else(|_| allowed_dir.clone());

    if !canonical.starts_with(&allowed_canonical) {
        return Err(Error::InvalidParameters(format!(
            "path {} is outside the workspace",
            path
        )));
    }

    Ok(full_path)
}

pub struct ReadFileTool {
    allowed_dir: PathBuf,
}

impl ReadFileTool {
    pub fn new(allowed_dir: PathBuf) -> Self {
        ReadFileTool { allowed_dir }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "read_file".to_string(),
            description: "Read the contents of a file within the workspace".to_string(),
            parameters: vec![ParameterSpec {
                name: "path".to_string(),
                param_type: "string".to_string(),
                description: "Path relative to the workspace".to_string(),
                required: true,
                default: None,
            }],
            domain: Some("filesystem".to_string()),
            concepts: HashSet::from(["file".to_string(), "read".to_string()]),
            synonyms: HashSet::new(),
            characteristics: ToolCharacteristics {
                safe_for_shadow: true,
                idempotent: true,
                side_effects: vec!["read_only".to_string()],
            },
        }
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let path = args
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::InvalidParameters("missing 'path' parameter".to_string()))?;

        let full_path = resolve_within(&self.allowed_dir, path)?;

        match tokio::fs::read_to_string(&full_path).await {
            Ok(content) => Ok(ToolResult::success(content)),
            Err(e) => Ok(ToolResult::failure(format!("failed to read {}: {}", path, e))),
        }
    }
}

pub struct WriteFileTool {
    allowed_dir: PathBuf,
}

impl WriteFileTool {
    pub fn new(allowed_dir: PathBuf) -> Self {
        WriteFileTool { allowed_dir }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "write_file".to_string(),
            description: "Write content to a file within the workspace".to_string(),
            parameters: vec![
                ParameterSpec {
                    name: "path".to_string(),
                    param_type: "string".to_string(),
                    description: "Path relative to the workspace".to_string(),
                    required: true,
                    default: None,
                },
                ParameterSpec {
                    name: "content".to_string(),
                    param_type: "string".to_string(),
                    description: "Content to write".to_string(),
                    required: true,
                    default: None,
                },
            ],
            domain: Some("filesystem".to_string()),
            concepts: HashSet::from(["file".to_string(), "write".to_string()]),
            synonyms: HashSet::new(),
            characteristics: ToolCharacteristics {
                safe_for_shadow: false,
                idempotent: true,
                side_effects: vec!["writes_filesystem".to_string()],
            },
        }
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let path = args
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::InvalidParameters("missing 'path' parameter".to_string()))?;
        let content = args
            .get("content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::InvalidParameters("missing 'content' parameter".to_string()))?;

        let full_path = resolve_within(&self.allowed_dir, path)?;

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        match tokio::fs::write(&full_path, content).await {
            Ok(()) => Ok(ToolResult::success(format!("wrote {} bytes to {}", content.len(), path))),
            Err(e) => Ok(ToolResult::failure(format!("failed to write {}: {}", path, e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = tempdir().unwrap();
        let write_tool = WriteFileTool::new(dir.path().to_path_buf());
        let read_tool = ReadFileTool::new(dir.path().to_path_buf());

        write_tool
            .execute(serde_json::json!({ "path": "note.txt", "content": "hello" }))
            .await
            .unwrap();

        let result = read_tool
            .execute(serde_json::json!({ "path": "note.txt" }))
            .await
            .unwrap();
        assert_eq!(result.content.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_path_escape_denied() {
        let dir = tempdir().unwrap();
        let read_tool = ReadFileTool::new(dir.path().to_path_buf());
        let result = read_tool.execute(serde_json::json!({ "path": "../../etc/passwd" })).await;
        assert!(result.is_err());
    }
}
