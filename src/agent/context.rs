//! `GoalContext`: messages, state, and result for a single goal as it moves
//! through the neuron pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextMessage {
    pub neuron: String,
    pub message_type: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct GoalContext {
    pub goal_id: Uuid,
    pub goal_text: String,

    pub intent: Option<String>,
    pub tool_name: Option<String>,
    pub parameters: Value,

    pub result: Option<String>,
    pub error: Option<String>,
    pub success: bool,

    pub messages: Vec<ContextMessage>,

    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,

    /// Recovery bookkeeping; each kind is attempted at most once per goal
    /// (spec.md §4.6).
    pub retried: bool,
    pub params_refined: bool,
    pub retry_error: Option<String>,
}

impl GoalContext {
    pub fn new(goal_text: impl Into<String>) -> Self {
        GoalContext {
            goal_id: Uuid::new_v4(),
            goal_text: goal_text.into(),
            intent: None,
            tool_name: None,
            parameters: Value::Null,
            result: None,
            error: None,
            success: false,
            messages: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
            retried: false,
            params_refined: false,
            retry_error: None,
        }
    }

    pub fn add_message(&mut self, neuron: impl Into<String>, message_type: impl Into<String>, data: impl Into<Value>) {
        self.messages.push(ContextMessage {
            neuron: neuron.into(),
            message_type: message_type.into(),
            data: data.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn complete(&mut self, result: impl Into<String>) {
        self.result = Some(result.into());
        self.success = true;
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        self.success = false;
        self.completed_at = Some(Utc::now());
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.completed_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_sets_success_and_duration() {
        let mut ctx = GoalContext::new("2+2");
        assert!(ctx.duration_ms().is_none());
        ctx.complete("4");
        assert!(ctx.success);
        assert!(ctx.duration_ms().is_some());
    }

    #[test]
    fn test_fail_clears_success() {
        let mut ctx = GoalContext::new("bad goal");
        ctx.fail("boom");
        assert!(!ctx.success);
        assert_eq!(ctx.error.as_deref(), Some("boom"));
    }
}
