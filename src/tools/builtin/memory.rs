//! Key-value memory tool, a thin wrapper over the KV store so an agent can
//! stash and recall facts across neuron turns within a goal.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::storage::kv::KvStore;
use crate::tools::traits::{ParameterSpec, Tool, ToolCharacteristics, ToolDefinition, ToolResult};

const NAMESPACE: &str = "agent_memory";

pub struct KeyValueMemoryTool {
    store: Arc<dyn KvStore>,
}

impl KeyValueMemoryTool {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        KeyValueMemoryTool { store }
    }
}

#[async_trait]
impl Tool for KeyValueMemoryTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "memory".to_string(),
            description: "Store or recall a fact by key across the life of a goal".to_string(),
            parameters: vec![
                ParameterSpec {
                    name: "action".to_string(),
                    param_type: "string".to_string(),
                    description: "One of 'get', 'set', 'delete', or 'list'".to_string(),
                    required: true,
                    default: None,
                },
                ParameterSpec {
                    name: "key".to_string(),
                    param_type: "string".to_string(),
                    description: "The key to read or write".to_string(),
                    required: false,
                    default: None,
                },
                ParameterSpec {
                    name: "value".to_string(),
                    param_type: "string".to_string(),
                    description: "The value to store, required for 'set'".to_string(),
                    required: false,
                    default: None,
                },
            ],
            domain: Some("memory".to_string()),
            concepts: HashSet::from(["memory".to_string(), "recall".to_string(), "store".to_string()]),
            synonyms: HashSet::from(["remember".to_string(), "note".to_string()]),
            characteristics: ToolCharacteristics {
                safe_for_shadow: false,
                idempotent: false,
                side_effects: vec!["writes_memory".to_string()],
            },
        }
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let action = args
            .get("action")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::InvalidParameters("missing 'action' parameter".to_string()))?;

        match action {
            "set" => {
                let key = args
                    .get("key")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| Error::InvalidParameters("'set' requires 'key'".to_string()))?;
                let value = args
                    .get("value")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| Error::InvalidParameters("'set' requires 'value'".to_string()))?;
                self.store
                    .set(NAMESPACE, key, Value::String(value.to_string()), None)
                    .await?;
                Ok(ToolResult::success(format!("remembered {key}")))
            }
            "get" => {
                let key = args
                    .get("key")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| Error::InvalidParameters("'get' requires 'key'".to_string()))?;
                match self.store.get(NAMESPACE, key).await? {
                    Some(value) => Ok(ToolResult::success(
                        value.as_str().map(|s| s.to_string()).unwrap_or_else(|| value.to_string()),
                    )),
                    None => Ok(ToolResult::failure(format!("no memory for key {key}"))),
                }
            }
            "delete" => {
                let key = args
                    .get("key")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| Error::InvalidParameters("'delete' requires 'key'".to_string()))?;
                self.store.delete(NAMESPACE, key).await?;
                Ok(ToolResult::success(format!("forgot {key}")))
            }
            "list" => {
                let keys = self.store.keys(NAMESPACE).await?;
                Ok(ToolResult::success(keys.join(", ")))
            }
            other => Ok(ToolResult::failure(format!("unknown memory action: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::kv::InMemoryKvStore;

    #[tokio::test]
    async fn test_set_then_get() {
        let tool = KeyValueMemoryTool::new(Arc::new(InMemoryKvStore::new()));
        tool.execute(serde_json::json!({ "action": "set", "key": "color", "value": "blue" }))
            .await
            .unwrap();
        let result = tool
            .execute(serde_json::json!({ "action": "get", "key": "color" }))
            .await
            .unwrap();
        assert_eq!(result.content.as_deref(), Some("blue"));
    }

    #[tokio::test]
    async fn test_get_missing_key_fails() {
        let tool = KeyValueMemoryTool::new(Arc::new(InMemoryKvStore::new()));
        let result = tool
            .execute(serde_json::json!({ "action": "get", "key": "nothing" }))
            .await
            .unwrap();
        assert!(!result.success);
    }
}
