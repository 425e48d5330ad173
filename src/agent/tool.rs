//! ToolNeuron (§4.5.3): search → select → extract parameters → execute →
//! format. Failures are signaled as sentinel strings rather than `Err`, so
//! the orchestrator can drive recovery without exceptions crossing the
//! neuron boundary.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::llm::LlmClient;
use crate::tools::{ToolDefinition, ToolRegistry};

use super::context::GoalContext;
use super::neuron::Neuron;

const CANDIDATE_LIMIT: usize = 5;

const SELECT_SYSTEM_PROMPT: &str =
    "You select the single best tool for a goal from a list of candidates. \
Reply with JSON: {\"tool_name\": \"<name>\"}. The name must be exactly one of \
the candidates given.";

const EXTRACT_SYSTEM_PROMPT: &str =
    "You extract parameter values for a tool call from a goal's text. Reply \
with a JSON object whose keys are exactly the tool's parameter names.";

const EXTRACT_RETRY_SYSTEM_PROMPT: &str =
    "Your previous parameter extraction was rejected. Break the goal into \
steps, then extract parameter values for the tool call as a JSON object \
whose keys are exactly the tool's parameter names.";

pub struct ToolNeuron {
    llm: Arc<LlmClient>,
    registry: Arc<ToolRegistry>,
}

impl ToolNeuron {
    pub fn new(llm: Arc<LlmClient>, registry: Arc<ToolRegistry>) -> Self {
        ToolNeuron { llm, registry }
    }

    fn candidates(&self, goal_text: &str) -> Vec<ToolDefinition> {
        let hits = self.registry.search(goal_text, None, CANDIDATE_LIMIT);
        if !hits.is_empty() {
            return hits;
        }
        self.registry
            .definitions()
            .into_iter()
            .take(CANDIDATE_LIMIT)
            .collect()
    }

    async fn select(&self, goal_text: &str, candidates: &[ToolDefinition]) -> String {
        if candidates.len() == 1 {
            return candidates[0].name.clone();
        }

        let listing = candidates
            .iter()
            .map(|c| format!("- {}: {}", c.name, c.description))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!("Goal: {goal_text}\n\nCandidates:\n{listing}");

        let reply = self
            .llm
            .generate_json(&prompt, Some(SELECT_SYSTEM_PROMPT))
            .await
            .unwrap_or(Value::Null);

        let picked = reply
            .get("tool_name")
            .and_then(Value::as_str)
            .unwrap_or_default();

        if candidates.iter().any(|c| c.name == picked) {
            picked.to_string()
        } else {
            candidates[0].name.clone()
        }
    }

    async fn extract_parameters(&self, goal_text: &str, def: &ToolDefinition) -> Value {
        let schema = def.parameters_schema();

        for (attempt, system) in [EXTRACT_SYSTEM_PROMPT, EXTRACT_RETRY_SYSTEM_PROMPT]
            .into_iter()
            .enumerate()
        {
            let prompt = format!(
                "Goal: {goal_text}\n\nTool: {}\nParameter schema: {}",
                def.name, schema
            );
            let reply = self.llm.generate_json(&prompt, Some(system)).await.unwrap_or(Value::Null);

            if reply.is_object() && reply.get("error").is_none() {
                return reply;
            }

            if attempt == 0 {
                continue;
            }
        }

        Value::Object(Default::default())
    }

    fn format_output(result: &crate::tools::ToolResult) -> String {
        if !result.success {
            return format!("TOOL_ERROR:{}", result.error.clone().unwrap_or_default());
        }

        match &result.content {
            Some(content) => content.clone(),
            None => "done".to_string(),
        }
    }
}

#[async_trait]
impl Neuron for ToolNeuron {
    fn name(&self) -> &str {
        "tool"
    }

    async fn process(&self, ctx: &mut GoalContext, _input: Value) -> Result<Value> {
        let candidates = self.candidates(&ctx.goal_text);
        if candidates.is_empty() {
            let sentinel = "NO_MATCHING_TOOL:no candidates found in registry".to_string();
            return Ok(serde_json::json!({ "sentinel": sentinel }));
        }

        let tool_name = self.select(&ctx.goal_text, &candidates).await;
        ctx.tool_name = Some(tool_name.clone());

        let Some(tool) = self.registry.get(&tool_name) else {
            let sentinel = format!("TOOL_NOT_FOUND:{tool_name}");
            return Ok(serde_json::json!({ "sentinel": sentinel }));
        };

        let def = tool.definition();
        let params = self.extract_parameters(&ctx.goal_text, &def).await;
        ctx.parameters = params.clone();

        let result = tool.execute(params).await;

        match result {
            Ok(tool_result) if tool_result.success => {
                let text = Self::format_output(&tool_result);
                Ok(serde_json::json!({ "result": text }))
            }
            Ok(tool_result) => {
                let sentinel = Self::format_output(&tool_result);
                Ok(serde_json::json!({ "sentinel": sentinel }))
            }
            Err(e) => {
                let sentinel = format!("TOOL_EXCEPTION:{e}");
                Ok(serde_json::json!({ "sentinel": sentinel }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::builtin::CalculatorTool;

    fn registry_with_calculator() -> Arc<ToolRegistry> {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(CalculatorTool::new()));
        Arc::new(registry)
    }

    #[test]
    fn test_candidates_falls_back_to_first_n_when_search_empty() {
        let registry = registry_with_calculator();
        let llm = Arc::new(crate::llm::LlmClient::new(&crate::config::LlmConfig::default()).unwrap());
        let neuron = ToolNeuron::new(llm, registry);
        let candidates = neuron.candidates("totally unrelated gibberish query zzz");
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn test_format_output_wraps_error() {
        let result = crate::tools::ToolResult::failure("bad input");
        assert_eq!(ToolNeuron::format_output(&result), "TOOL_ERROR:bad input");
    }

    #[test]
    fn test_format_output_passes_through_content() {
        let result = crate::tools::ToolResult::success("42");
        assert_eq!(ToolNeuron::format_output(&result), "42");
    }
}
