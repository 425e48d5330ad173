//! Core tool trait, declarative `ToolDefinition`, and call/result types
//! (§3, §4.4). A `Tool` is an executable pairing: a `ToolDefinition` plus
//! `execute(params) -> result|error`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub param_type: String,
    pub description: String,
    pub required: bool,
    pub default: Option<Value>,
}

/// Declarative description used for both discovery and LLM-facing prompt
/// formatting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParameterSpec>,
    pub domain: Option<String>,
    #[serde(default)]
    pub concepts: HashSet<String>,
    #[serde(default)]
    pub synonyms: HashSet<String>,
    #[serde(default)]
    pub characteristics: ToolCharacteristics,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolCharacteristics {
    pub safe_for_shadow: bool,
    pub idempotent: bool,
    /// e.g. "none", "read_only", "writes_db", "network"
    pub side_effects: Vec<String>,
}

impl ToolDefinition {
    /// JSON Schema view of the parameters, for LLM tool-calling prompts.
    pub fn parameters_schema(&self) -> Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for p in &self.parameters {
            properties.insert(
                p.name.clone(),
                serde_json::json!({ "type": p.param_type, "description": p.description }),
            );
            if p.required {
                required.push(p.name.clone());
            }
        }
        serde_json::json!({ "type": "object", "properties": properties, "required": required })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub content: Option<String>,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        ToolResult {
            success: true,
            content: Some(content.into()),
            error: None,
            metadata: None,
        }
    }

    pub fn success_with_metadata(content: impl Into<String>, metadata: Value) -> Self {
        ToolResult {
            success: true,
            content: Some(content.into()),
            error: None,
            metadata: Some(metadata),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        ToolResult {
            success: false,
            content: None,
            error: Some(error.into()),
            metadata: None,
        }
    }

    pub fn as_text(&self) -> String {
        if self.success {
            self.content.clone().unwrap_or_default()
        } else {
            format!("Error: {}", self.error.clone().unwrap_or_default())
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool_name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn parse_arguments<T: for<'de> Deserialize<'de>>(&self) -> Result<T> {
        serde_json::from_value(self.arguments.clone())
            .map_err(|e| crate::error::Error::InvalidParameters(e.to_string()))
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    async fn execute(&self, args: Value) -> Result<ToolResult>;
}
