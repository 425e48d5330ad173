//! IntentNeuron (§4.5.1): classifies goal text into one of `generative`,
//! `tool`, `memory_read`, `memory_write`, with a cache-only-what-worked
//! fast path ahead of the LLM call.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::llm::LlmClient;

use super::context::GoalContext;
use super::neuron::Neuron;
use super::pattern_cache::PatternCache;

const VALID_INTENTS: [&str; 4] = ["generative", "tool", "memory_read", "memory_write"];

const SYSTEM_PROMPT: &str = "You classify a user's goal into exactly one label: \
generative, tool, memory_read, or memory_write. Reply with only that single word.";

pub struct IntentNeuron {
    llm: Arc<LlmClient>,
    cache: Arc<PatternCache>,
}

impl IntentNeuron {
    pub fn new(llm: Arc<LlmClient>, cache: Arc<PatternCache>) -> Self {
        IntentNeuron { llm, cache }
    }

    /// Normalizes a free-text LLM reply into one of the four valid labels,
    /// defaulting to `generative` (§4.5.1).
    fn normalize(raw: &str) -> String {
        let lower = raw.trim().to_lowercase();

        if let Some(&exact) = VALID_INTENTS.iter().find(|&&i| i == lower) {
            return exact.to_string();
        }

        if lower.contains("memory") && lower.contains("write") {
            return "memory_write".to_string();
        }
        if lower.contains("memory") && (lower.contains("read") || lower.contains("recall") || lower.contains("get")) {
            return "memory_read".to_string();
        }
        if lower.contains("memory") {
            return "memory_read".to_string();
        }
        if lower.contains("tool") {
            return "tool".to_string();
        }

        "generative".to_string()
    }
}

#[async_trait]
impl Neuron for IntentNeuron {
    fn name(&self) -> &str {
        "intent"
    }

    async fn process(&self, ctx: &mut GoalContext, _input: Value) -> Result<Value> {
        if let Some(cached) = self.cache.get(&ctx.goal_text).await {
            ctx.intent = Some(cached.clone());
            return Ok(serde_json::json!({ "intent": cached, "cached": true }));
        }

        let prompt = format!("Goal: {}\n\nLabel:", ctx.goal_text);
        let reply = self.llm.generate(&prompt, Some(SYSTEM_PROMPT), 0.0, 16).await?;
        let intent = Self::normalize(&reply);

        ctx.intent = Some(intent.clone());
        Ok(serde_json::json!({ "intent": intent, "cached": false }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_exact_label() {
        assert_eq!(IntentNeuron::normalize("tool"), "tool");
        assert_eq!(IntentNeuron::normalize("  Memory_Read \n"), "memory_read");
    }

    #[test]
    fn test_normalize_substring_fallback() {
        assert_eq!(IntentNeuron::normalize("this needs memory write access"), "memory_write");
        assert_eq!(IntentNeuron::normalize("recall from memory"), "memory_read");
        assert_eq!(IntentNeuron::normalize("use a tool for this"), "tool");
    }

    #[test]
    fn test_normalize_unrecognized_defaults_generative() {
        assert_eq!(IntentNeuron::normalize("I have no idea"), "generative");
    }
}
