//! Orchestrator (§4.6): the thin coordinator that creates a `GoalContext`,
//! dispatches to the right neuron on intent, and drives tool-path recovery
//! off sentinel strings and classified error text.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::events::{EventBus, EventType};
use crate::forge::{ForgeSandbox, ForgedToolAdapter, ToolForge};
use crate::llm::LlmClient;
use crate::storage::{ExecutionStore, KvStore};
use crate::thought::{Thought, ThoughtStatus, ThoughtTree, ThoughtType};
use crate::tools::ToolRegistry;

use super::context::GoalContext;
use super::generative::GenerativeNeuron;
use super::intent::IntentNeuron;
use super::memory::MemoryNeuron;
use super::neuron::{self, NeuronResult};
use super::pattern_cache::PatternCache;
use super::recovery::{describe_auth, FailureType, RecoveryAction, RecoveryEngine};
use super::tool::ToolNeuron;

#[derive(Debug, Clone, Serialize)]
pub struct GoalResponse {
    pub success: bool,
    pub goal_id: Uuid,
    pub intent: Option<String>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub duration_ms: i64,
    pub message_count: usize,
}

pub struct Orchestrator {
    llm: Arc<LlmClient>,
    events: Arc<dyn EventBus>,
    thoughts: Arc<ThoughtTree>,
    registry: Arc<ToolRegistry>,
    forge: Arc<ToolForge>,
    sandbox: Arc<ForgeSandbox>,
    execution_store: Arc<dyn ExecutionStore>,
    memory_store: Arc<dyn KvStore>,
    recovery: RecoveryEngine,
    pattern_cache: Arc<PatternCache>,
    forge_enabled: bool,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        llm: Arc<LlmClient>,
        events: Arc<dyn EventBus>,
        thoughts: Arc<ThoughtTree>,
        registry: Arc<ToolRegistry>,
        forge: Arc<ToolForge>,
        sandbox: Arc<ForgeSandbox>,
        execution_store: Arc<dyn ExecutionStore>,
        memory_store: Arc<dyn KvStore>,
        forge_enabled: bool,
    ) -> Self {
        Orchestrator {
            llm,
            events,
            thoughts,
            registry,
            forge,
            sandbox,
            execution_store,
            memory_store,
            recovery: RecoveryEngine::new(),
            pattern_cache: Arc::new(PatternCache::new()),
            forge_enabled,
        }
    }

    pub async fn process(&self, goal_text: &str) -> GoalResponse {
        let mut ctx = GoalContext::new(goal_text);
        let root = match self.thoughts.create_root(ctx.goal_id, goal_text).await {
            Ok(root) => root,
            Err(err) => {
                warn!(goal_id = %ctx.goal_id, %err, "thought tree store unavailable, continuing without persisted root");
                Thought {
                    thought_id: Uuid::new_v4(),
                    goal_id: ctx.goal_id,
                    parent_id: None,
                    content: goal_text.to_string(),
                    thought_type: ThoughtType::Goal,
                    status: ThoughtStatus::Active,
                    timestamp: chrono::Utc::now(),
                    metadata: Value::Null,
                }
            }
        };

        let _ = self
            .events
            .emit(
                EventType::GoalStart,
                ctx.goal_id,
                None,
                None,
                None,
                serde_json::json!({ "goal_text": goal_text }),
            )
            .await;

        let intent_neuron = IntentNeuron::new(self.llm.clone(), self.pattern_cache.clone());
        let intent_result = neuron::run(
            &intent_neuron,
            &mut ctx,
            Value::Null,
            &self.events,
            &self.thoughts,
            root.thought_id,
        )
        .await;

        if !intent_result.success {
            return self.finish_failure(ctx, intent_result.error.unwrap_or_default()).await;
        }

        let intent = ctx.intent.clone().unwrap_or_else(|| "generative".to_string());
        let outcome = match intent.as_str() {
            "generative" => self.run_generative(&mut ctx, root.thought_id).await,
            "tool" => self.run_tool_with_recovery(&mut ctx, root.thought_id).await,
            "memory_read" | "memory_write" => self.run_memory(&mut ctx, root.thought_id).await,
            _ => self.run_generative(&mut ctx, root.thought_id).await,
        };

        match outcome {
            Ok(text) => {
                self.pattern_cache.record_success(goal_text, &intent).await;
                self.finish_success(ctx, text).await
            }
            Err(error) => self.finish_failure(ctx, error).await,
        }
    }

    async fn run_generative(&self, ctx: &mut GoalContext, root: Uuid) -> Result<String, String> {
        let neuron = GenerativeNeuron::new(self.llm.clone());
        let result = neuron::run(&neuron, ctx, Value::Null, &self.events, &self.thoughts, root).await;
        Self::result_to_text(result, "response")
    }

    async fn run_memory(&self, ctx: &mut GoalContext, root: Uuid) -> Result<String, String> {
        let neuron = MemoryNeuron::new(self.llm.clone(), self.memory_store.clone());
        let result = neuron::run(&neuron, ctx, Value::Null, &self.events, &self.thoughts, root).await;
        Self::result_to_text(result, "result")
    }

    async fn run_tool_with_recovery(&self, ctx: &mut GoalContext, root: Uuid) -> Result<String, String> {
        let tool_neuron = ToolNeuron::new(self.llm.clone(), self.registry.clone());
        let result = neuron::run(&tool_neuron, ctx, Value::Null, &self.events, &self.thoughts, root).await;

        let Some(sentinel) = Self::sentinel_from(&result) else {
            return Self::result_to_text(result, "result");
        };

        self.dispatch_recovery(ctx, root, &tool_neuron, &sentinel).await
    }

    async fn dispatch_recovery(
        &self,
        ctx: &mut GoalContext,
        root: Uuid,
        tool_neuron: &ToolNeuron,
        sentinel: &str,
    ) -> Result<String, String> {
        if sentinel.starts_with("NO_MATCHING_TOOL") || sentinel.starts_with("NO_TOOLS_AVAILABLE") {
            return self.run_generative(ctx, root).await;
        }

        if let Some(missing) = sentinel.strip_prefix("TOOL_NOT_FOUND:") {
            if self.forge_enabled {
                if let Some(text) = self.try_forge_and_retry(ctx, root, missing).await {
                    return Ok(text);
                }
            }
            return self.run_generative(ctx, root).await;
        }

        let underlying = sentinel
            .strip_prefix("TOOL_ERROR:")
            .or_else(|| sentinel.strip_prefix("TOOL_EXCEPTION:"))
            .unwrap_or(sentinel);

        let failure = FailureType::classify(underlying);
        let tool_name = ctx.tool_name.clone().unwrap_or_default();
        self.recovery.history().record_failure(&tool_name, underlying);

        if let Some(stats) = self.forge.get_performance(&tool_name) {
            self.recovery.set_success_rate(&tool_name, stats.success_rate());
        }

        let action = self
            .recovery
            .decide(&tool_name, failure, ctx.retried, ctx.params_refined);

        match action {
            RecoveryAction::Retry => {
                ctx.retried = true;
                ctx.retry_error = Some(underlying.to_string());
                let result = neuron::run(tool_neuron, ctx, Value::Null, &self.events, &self.thoughts, root).await;
                match Self::sentinel_from(&result) {
                    None => Self::result_to_text(result, "result"),
                    Some(_) => self.run_generative(ctx, root).await,
                }
            }
            RecoveryAction::RefineParams => {
                ctx.params_refined = true;
                let result = neuron::run(tool_neuron, ctx, Value::Null, &self.events, &self.thoughts, root).await;
                match Self::sentinel_from(&result) {
                    None => Self::result_to_text(result, "result"),
                    Some(_) => self.run_generative(ctx, root).await,
                }
            }
            RecoveryAction::RequestConfig => {
                let auth = describe_auth(&tool_name);
                Ok(format!(
                    "'{tool_name}' requires authentication for {}.\n{}",
                    auth.service, auth.instructions
                ))
            }
            RecoveryAction::FallbackGenerative => self.run_generative(ctx, root).await,
            RecoveryAction::RefactorTool => {
                warn!("tool {tool_name} success rate below threshold, marking degraded");
                let _ = self
                    .execution_store
                    .mark_tool_status(&tool_name, "degraded", "success rate below recovery threshold")
                    .await;
                self.run_generative(ctx, root).await
            }
        }
    }

    async fn try_forge_and_retry(&self, ctx: &mut GoalContext, root: Uuid, missing_tool: &str) -> Option<String> {
        let forged = self
            .forge
            .create_tool(missing_tool, &ctx.goal_text, "general")
            .await
            .ok()
            .flatten()?;

        self.registry.register(Arc::new(ForgedToolAdapter::new(forged, self.sandbox.clone())));

        let tool_neuron = ToolNeuron::new(self.llm.clone(), self.registry.clone());
        let result = neuron::run(&tool_neuron, ctx, Value::Null, &self.events, &self.thoughts, root).await;

        match Self::sentinel_from(&result) {
            None => Self::result_to_text(result, "result").ok(),
            Some(_) => None,
        }
    }

    fn sentinel_from(result: &NeuronResult) -> Option<String> {
        if !result.success {
            return None;
        }
        result
            .output
            .get("sentinel")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    fn result_to_text(result: NeuronResult, key: &str) -> Result<String, String> {
        if !result.success {
            return Err(result.error.unwrap_or_else(|| "neuron failed".to_string()));
        }
        let text = result
            .output
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| result.output.to_string());
        Ok(text)
    }

    async fn finish_success(&self, mut ctx: GoalContext, text: String) -> GoalResponse {
        ctx.complete(text.clone());
        let duration_ms = ctx.duration_ms().unwrap_or(0);

        let _ = self.thoughts.complete(ctx.goal_id, Some(&text)).await;
        let _ = self
            .events
            .emit(
                EventType::GoalComplete,
                ctx.goal_id,
                None,
                None,
                Some(duration_ms),
                serde_json::json!({ "success": true, "result": text }),
            )
            .await;
        let _ = self
            .execution_store
            .store_execution(
                ctx.goal_id,
                &ctx.goal_text,
                ctx.intent.as_deref().unwrap_or("generative"),
                true,
                None,
                duration_ms,
                None,
            )
            .await;

        info!(goal_id = %ctx.goal_id, "goal completed successfully");

        GoalResponse {
            success: true,
            goal_id: ctx.goal_id,
            intent: ctx.intent,
            result: Some(text),
            error: None,
            duration_ms,
            message_count: ctx.messages.len(),
        }
    }

    async fn finish_failure(&self, mut ctx: GoalContext, error: String) -> GoalResponse {
        ctx.fail(error.clone());
        let duration_ms = ctx.duration_ms().unwrap_or(0);

        let _ = self.thoughts.fail(ctx.goal_id, &error).await;
        let _ = self
            .events
            .emit(
                EventType::GoalComplete,
                ctx.goal_id,
                None,
                None,
                Some(duration_ms),
                serde_json::json!({ "success": false, "error": error }),
            )
            .await;
        let _ = self
            .execution_store
            .store_execution(
                ctx.goal_id,
                &ctx.goal_text,
                ctx.intent.as_deref().unwrap_or("unknown"),
                false,
                Some(&error),
                duration_ms,
                None,
            )
            .await;

        warn!(goal_id = %ctx.goal_id, %error, "goal failed");

        GoalResponse {
            success: false,
            goal_id: ctx.goal_id,
            intent: ctx.intent,
            result: None,
            error: Some(error),
            duration_ms,
            message_count: ctx.messages.len(),
        }
    }
}
