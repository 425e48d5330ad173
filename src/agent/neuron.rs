//! The `Neuron` contract (spec.md §4.5): each neuron implements `process`
//! only; `run` is a fixed wrapper that times the call, emits
//! `neuron_start`/`neuron_complete`/`neuron_error` on the Event Bus, records
//! a thought, and converts an `Err` into a failed `NeuronResult` instead of
//! propagating it — exceptions never reach the orchestrator.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;
use crate::events::{EventBus, EventType};
use crate::thought::{ThoughtTree, ThoughtType};

use super::context::GoalContext;

#[derive(Debug, Clone)]
pub struct NeuronResult {
    pub success: bool,
    pub output: Value,
    pub error: Option<String>,
    pub duration_ms: i64,
}

impl NeuronResult {
    pub fn ok(output: Value, duration_ms: i64) -> Self {
        NeuronResult {
            success: true,
            output,
            error: None,
            duration_ms,
        }
    }

    pub fn err(error: impl Into<String>, duration_ms: i64) -> Self {
        NeuronResult {
            success: false,
            output: Value::Null,
            error: Some(error.into()),
            duration_ms,
        }
    }
}

/// A single stage in the pipeline. Implementors only write `process`; the
/// event/thought/timing middleware is `run`, below, and is never overridden.
#[async_trait]
pub trait Neuron: Send + Sync {
    /// Short, stable identifier used in events, thoughts, and logs.
    fn name(&self) -> &str;

    async fn process(&self, ctx: &mut GoalContext, input: Value) -> Result<Value>;
}

/// Runs `neuron.process`, wrapping it with the event/thought middleware
/// every neuron gets for free. `parent_thought` is the thought this
/// neuron's action thought should hang off (typically the goal root).
pub async fn run(
    neuron: &dyn Neuron,
    ctx: &mut GoalContext,
    input: Value,
    events: &Arc<dyn EventBus>,
    thoughts: &Arc<ThoughtTree>,
    parent_thought: Uuid,
) -> NeuronResult {
    let name = neuron.name();
    let start = Instant::now();

    let _ = events
        .emit(
            EventType::NeuronStart,
            ctx.goal_id,
            Some(name),
            None,
            None,
            serde_json::json!({ "input": input }),
        )
        .await;

    let _ = thoughts
        .add_thought(
            ctx.goal_id,
            parent_thought,
            &format!("{name} processing"),
            ThoughtType::Action,
            None,
        )
        .await;

    let outcome = neuron.process(ctx, input).await;
    let duration_ms = start.elapsed().as_millis() as i64;

    match outcome {
        Ok(output) => {
            ctx.add_message(name, "output", output.clone());

            let _ = events
                .emit(
                    EventType::NeuronComplete,
                    ctx.goal_id,
                    Some(name),
                    None,
                    Some(duration_ms),
                    output.clone(),
                )
                .await;

            NeuronResult::ok(output, duration_ms)
        }
        Err(e) => {
            let message = e.to_string();
            ctx.add_message(name, "error", serde_json::json!({ "error": message }));

            let _ = events
                .emit(
                    EventType::NeuronError,
                    ctx.goal_id,
                    Some(name),
                    None,
                    Some(duration_ms),
                    serde_json::json!({ "error": message }),
                )
                .await;

            NeuronResult::err(message, duration_ms)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::InMemoryEventBus;
    use crate::storage::InMemoryKvStore;

    struct EchoNeuron;

    #[async_trait]
    impl Neuron for EchoNeuron {
        fn name(&self) -> &str {
            "echo"
        }

        async fn process(&self, _ctx: &mut GoalContext, input: Value) -> Result<Value> {
            Ok(input)
        }
    }

    struct FailingNeuron;

    #[async_trait]
    impl Neuron for FailingNeuron {
        fn name(&self) -> &str {
            "failing"
        }

        async fn process(&self, _ctx: &mut GoalContext, _input: Value) -> Result<Value> {
            Err(crate::error::Error::Execution("boom".to_string()))
        }
    }

    #[tokio::test]
    async fn test_run_success_emits_complete() {
        let events: Arc<dyn EventBus> = Arc::new(InMemoryEventBus::new());
        let thoughts = Arc::new(ThoughtTree::new(Arc::new(InMemoryKvStore::new())));
        let mut ctx = GoalContext::new("echo this");
        let root = thoughts.create_root(ctx.goal_id, &ctx.goal_text).await.unwrap();

        let result = run(
            &EchoNeuron,
            &mut ctx,
            serde_json::json!({"x": 1}),
            &events,
            &thoughts,
            root.thought_id,
        )
        .await;

        assert!(result.success);
        assert_eq!(result.output, serde_json::json!({"x": 1}));
        assert_eq!(ctx.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_run_error_is_caught_not_propagated() {
        let events: Arc<dyn EventBus> = Arc::new(InMemoryEventBus::new());
        let thoughts = Arc::new(ThoughtTree::new(Arc::new(InMemoryKvStore::new())));
        let mut ctx = GoalContext::new("fail this");
        let root = thoughts.create_root(ctx.goal_id, &ctx.goal_text).await.unwrap();

        let result = run(&FailingNeuron, &mut ctx, Value::Null, &events, &thoughts, root.thought_id).await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("boom"));
    }
}
