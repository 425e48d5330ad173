//! GenerativeNeuron (§4.5.2): free-text response, concise and accurate
//! tone. The fallback destination whenever intent classification or tool
//! recovery gives up.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::llm::LlmClient;

use super::context::GoalContext;
use super::neuron::Neuron;

const SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Respond concisely and accurately to the user's goal.";

pub struct GenerativeNeuron {
    llm: Arc<LlmClient>,
}

impl GenerativeNeuron {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        GenerativeNeuron { llm }
    }
}

#[async_trait]
impl Neuron for GenerativeNeuron {
    fn name(&self) -> &str {
        "generative"
    }

    async fn process(&self, ctx: &mut GoalContext, _input: Value) -> Result<Value> {
        let reply = self
            .llm
            .generate(&ctx.goal_text, Some(SYSTEM_PROMPT), 0.7, 1024)
            .await?;

        Ok(serde_json::json!({ "response": reply }))
    }
}
