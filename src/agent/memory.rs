//! MemoryNeuron (§4.5.4): read/write against a goal-spanning key-value
//! store. Distinct from the `memory` built-in tool — that one is an
//! LLM-selectable `Tool` a ToolNeuron call can pick; this neuron is the
//! dedicated destination for the `memory_read`/`memory_write` intents.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::llm::LlmClient;
use crate::storage::KvStore;

use super::context::GoalContext;
use super::neuron::Neuron;

const NAMESPACE: &str = "agent_memory";
const MAX_WILDCARD_HITS: usize = 5;

const EXTRACT_SYSTEM_PROMPT: &str = "You extract a memory operation from a goal's text. \
Reply with JSON: {\"key\": \"<key>\", \"value\": \"<value or null>\"}. For a recall/read \
goal, value is null.";

pub struct MemoryNeuron {
    llm: Arc<LlmClient>,
    store: Arc<dyn KvStore>,
}

impl MemoryNeuron {
    pub fn new(llm: Arc<LlmClient>, store: Arc<dyn KvStore>) -> Self {
        MemoryNeuron { llm, store }
    }

    async fn extract(&self, goal_text: &str) -> (String, Option<String>) {
        let reply = self
            .llm
            .generate_json(goal_text, Some(EXTRACT_SYSTEM_PROMPT))
            .await
            .unwrap_or(Value::Null);

        let key = reply
            .get("key")
            .and_then(Value::as_str)
            .unwrap_or(goal_text)
            .to_string();
        let value = reply.get("value").and_then(Value::as_str).map(str::to_string);

        (key, value)
    }

    async fn read(&self, key: &str) -> Result<String> {
        if let Some(value) = self.store.get(NAMESPACE, key).await? {
            return Ok(format!("{key} = {value}"));
        }

        let all = self.store.get_all(NAMESPACE).await?;
        let hits: Vec<String> = all
            .iter()
            .filter(|(k, _)| k.contains(key))
            .take(MAX_WILDCARD_HITS)
            .map(|(k, v)| format!("{k} = {v}"))
            .collect();

        if hits.is_empty() {
            Ok(format!("No memory found for '{key}'"))
        } else {
            Ok(hits.join("\n"))
        }
    }

    async fn write(&self, key: &str, value: &str) -> Result<String> {
        self.store
            .set(NAMESPACE, key, Value::String(value.to_string()), None)
            .await?;
        Ok(format!("Remembered {key} = {value}"))
    }
}

#[async_trait]
impl Neuron for MemoryNeuron {
    fn name(&self) -> &str {
        "memory"
    }

    async fn process(&self, ctx: &mut GoalContext, _input: Value) -> Result<Value> {
        let (key, value) = self.extract(&ctx.goal_text).await;

        let is_write = ctx.intent.as_deref() == Some("memory_write") || value.is_some();

        let message = if is_write {
            let value = value.unwrap_or_default();
            self.write(&key, &value).await?
        } else {
            self.read(&key).await?
        };

        Ok(serde_json::json!({ "result": message }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryKvStore;

    fn neuron() -> MemoryNeuron {
        let llm = Arc::new(LlmClient::new(&crate::config::LlmConfig::default()).unwrap());
        let store: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
        MemoryNeuron::new(llm, store)
    }

    #[tokio::test]
    async fn test_write_then_read_exact() {
        let n = neuron();
        n.write("favorite_color", "blue").await.unwrap();
        let msg = n.read("favorite_color").await.unwrap();
        assert!(msg.contains("blue"));
    }

    #[tokio::test]
    async fn test_read_missing_returns_not_found_message() {
        let n = neuron();
        let msg = n.read("nonexistent").await.unwrap();
        assert!(msg.contains("No memory found"));
    }

    #[tokio::test]
    async fn test_wildcard_read_matches_substring() {
        let n = neuron();
        n.write("user_favorite_color", "blue").await.unwrap();
        let msg = n.read("favorite").await.unwrap();
        assert!(msg.contains("blue"));
    }
}
