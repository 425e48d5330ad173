//! Scheduler loop (§4.12): evaluates due goals, runs their conditions, and
//! dispatches to an injected executor — normally `Orchestrator::process`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::scheduler::models::{
    cron_matches, parse_cron, ConditionAction, ConditionRef, GoalState, ScheduleType, ScheduledGoal, ScheduledRun,
};
use crate::scheduler::store::{GoalStore, InMemoryGoalStore};

/// A named, in-process predicate over `GoalState`. Goals reference these by
/// name (`ConditionRef`) since the predicate itself can't be persisted.
pub type ConditionCheck = Arc<dyn Fn(&GoalState) -> bool + Send + Sync>;
/// A named, in-process goal-text rewriter, used by `ConditionAction::Modify`.
pub type ConditionModifier = Arc<dyn Fn(&str, &GoalState) -> String + Send + Sync>;

#[derive(Clone)]
struct NamedCondition {
    check: ConditionCheck,
    modifier: Option<ConditionModifier>,
}

/// Goal executor — normally `Orchestrator::process`, injected so the
/// scheduler has no compile-time dependency on the agent pipeline.
pub type GoalExecutor = Arc<dyn Fn(String) -> futures::future::BoxFuture<'static, Result<Value>> + Send + Sync>;

pub struct Scheduler {
    store: Arc<dyn GoalStore>,
    executor: RwLock<Option<GoalExecutor>>,
    conditions: RwLock<HashMap<String, NamedCondition>>,
    check_interval_secs: u64,
    last_cron_check: RwLock<HashMap<String, chrono::DateTime<Utc>>>,
    double_fire_guard_secs: i64,
}

impl Scheduler {
    pub fn new(store: Arc<dyn GoalStore>, check_interval_secs: u64) -> Self {
        Scheduler {
            store,
            executor: RwLock::new(None),
            conditions: RwLock::new(HashMap::new()),
            check_interval_secs,
            last_cron_check: RwLock::new(HashMap::new()),
            double_fire_guard_secs: 60,
        }
    }

    pub fn with_in_memory_store(check_interval_secs: u64) -> Self {
        Self::new(Arc::new(InMemoryGoalStore::new()), check_interval_secs)
    }

    pub fn set_executor(&self, executor: GoalExecutor) {
        *self.executor.write().unwrap() = Some(executor);
    }

    /// Registers a named condition so `ScheduledGoal::conditions` can
    /// reference it by name. Call before loading goals that use it.
    pub fn register_condition(&self, name: impl Into<String>, check: ConditionCheck, modifier: Option<ConditionModifier>) {
        self.conditions
            .write()
            .unwrap()
            .insert(name.into(), NamedCondition { check, modifier });
    }

    pub async fn add_goal(&self, goal: ScheduledGoal) -> Result<()> {
        self.store.save_goal(&goal).await?;
        info!("added goal: {}", goal.id);
        Ok(())
    }

    pub async fn remove_goal(&self, goal_id: &str) -> Result<bool> {
        self.store.delete_goal(goal_id).await
    }

    pub async fn get_goal(&self, goal_id: &str) -> Result<Option<ScheduledGoal>> {
        self.store.get_goal(goal_id).await
    }

    pub async fn list_goals(&self, enabled_only: bool) -> Result<Vec<ScheduledGoal>> {
        self.store.list_goals(enabled_only, &[]).await
    }

    pub async fn get_state(&self, goal_id: &str) -> Result<GoalState> {
        self.store.get_state(goal_id).await
    }

    pub async fn get_history(&self, goal_id: &str, limit: usize) -> Result<Vec<ScheduledRun>> {
        self.store.get_runs(goal_id, limit).await
    }

    pub async fn enable_goal(&self, goal_id: &str) -> Result<bool> {
        let Some(mut goal) = self.store.get_goal(goal_id).await? else {
            return Ok(false);
        };
        goal.enabled = true;
        self.store.save_goal(&goal).await?;

        let mut state = self.store.get_state(goal_id).await?;
        state.consecutive_failures = 0;
        self.store.save_state(&state).await?;
        Ok(true)
    }

    pub async fn disable_goal(&self, goal_id: &str) -> Result<bool> {
        let Some(mut goal) = self.store.get_goal(goal_id).await? else {
            return Ok(false);
        };
        goal.enabled = false;
        self.store.save_goal(&goal).await?;
        Ok(true)
    }

    pub async fn run_now(&self, goal_id: &str, force: bool) -> Result<ScheduledRun> {
        let goal = self
            .store
            .get_goal(goal_id)
            .await?
            .ok_or_else(|| crate::error::Error::InvalidInput(format!("goal not found: {goal_id}")))?;
        self.execute_goal(&goal, force).await
    }

    async fn execute_goal(&self, goal: &ScheduledGoal, force_run: bool) -> Result<ScheduledRun> {
        let mut run = ScheduledRun::new(goal.id.clone());
        let mut state = self.store.get_state(&goal.id).await?;
        let mut goal_text = goal.goal.clone();
        let mut goal = goal.clone();

        if !force_run {
            let conditions = self.conditions.read().unwrap().clone();
            for condition_ref in &goal.conditions {
                let Some(named) = conditions.get(&condition_ref.name) else {
                    warn!("goal {} references unknown condition {}", goal.id, condition_ref.name);
                    continue;
                };

                if !(named.check)(&state) {
                    continue;
                }

                match condition_ref.action {
                    ConditionAction::Skip => {
                        run.skipped = true;
                        run.skip_reason = Some(
                            condition_ref
                                .message
                                .clone()
                                .unwrap_or_else(|| format!("condition: {}", condition_ref.name)),
                        );
                        run.completed_at = Some(Utc::now());
                        self.store.save_run(&run).await?;
                        info!("skipped {}: {}", goal.id, run.skip_reason.as_deref().unwrap_or(""));
                        return Ok(run);
                    }
                    ConditionAction::Disable => {
                        goal.enabled = false;
                        self.store.save_goal(&goal).await?;
                        run.skipped = true;
                        run.skip_reason = Some(format!("disabled by condition: {}", condition_ref.name));
                        run.completed_at = Some(Utc::now());
                        self.store.save_run(&run).await?;
                        warn!("disabled {}: {}", goal.id, condition_ref.name);
                        return Ok(run);
                    }
                    ConditionAction::Modify => {
                        if let Some(modifier) = &named.modifier {
                            goal_text = (modifier)(&goal_text, &state);
                            info!("modified goal {} via condition {}", goal.id, condition_ref.name);
                        }
                    }
                    ConditionAction::Alert => {
                        warn!("condition {} matched for goal {}", condition_ref.name, goal.id);
                    }
                }
            }
        }

        let executor = self.executor.read().unwrap().clone();
        let Some(executor) = executor else {
            return Err(crate::error::Error::Internal(
                "no executor set; call set_executor() first".to_string(),
            ));
        };

        match executor(goal_text).await {
            Ok(result) => {
                run.success = result
                    .get("success")
                    .and_then(Value::as_bool)
                    .unwrap_or(true);
                run.result = Some(result);
                run.completed_at = Some(Utc::now());

                state.run_count += 1;
                state.last_run = Some(Utc::now());
                state.last_result = run.result.clone();
                state.last_success = run.success;
                state.consecutive_failures = if run.success { 0 } else { state.consecutive_failures + 1 };

                if let Some(max_runs) = goal.max_runs {
                    if state.run_count >= max_runs {
                        goal.enabled = false;
                        self.store.save_goal(&goal).await?;
                        info!("goal {} reached max_runs ({})", goal.id, max_runs);
                    }
                }
            }
            Err(e) => {
                run.success = false;
                run.error = Some(e.to_string());
                run.completed_at = Some(Utc::now());

                state.run_count += 1;
                state.last_run = Some(Utc::now());
                state.last_success = false;
                state.consecutive_failures += 1;

                if state.consecutive_failures >= goal.max_failures {
                    goal.enabled = false;
                    self.store.save_goal(&goal).await?;
                    warn!("goal {} disabled: {} consecutive failures", goal.id, goal.max_failures);
                }

                error!("goal {} failed: {}", goal.id, e);
            }
        }

        self.store.save_state(&state).await?;
        self.store.save_run(&run).await?;
        Ok(run)
    }

    fn should_run(&self, goal: &ScheduledGoal, state: &GoalState) -> bool {
        if !goal.enabled {
            return false;
        }

        match goal.schedule_type {
            ScheduleType::Once => state.run_count == 0,
            ScheduleType::Interval => {
                let Some(value) = &goal.schedule_value else { return false };
                let Ok(interval) = value.parse::<i64>() else { return false };
                match state.last_run {
                    None => true,
                    Some(last_run) => (Utc::now() - last_run).num_seconds() >= interval,
                }
            }
            ScheduleType::Cron => {
                let Some(value) = &goal.schedule_value else { return false };
                let Ok(cron) = parse_cron(value) else {
                    error!("invalid cron for {}: {}", goal.id, value);
                    return false;
                };

                let now = Utc::now();
                if !cron_matches(&cron, now) {
                    return false;
                }

                let mut last_check = self.last_cron_check.write().unwrap();
                let due = match last_check.get(&goal.id) {
                    Some(last) => (now - *last).num_seconds() >= self.double_fire_guard_secs,
                    None => true,
                };
                if due {
                    last_check.insert(goal.id.clone(), now);
                }
                due
            }
            ScheduleType::OnDemand => false,
        }
    }

    pub async fn check_and_run(&self) -> Result<Vec<ScheduledRun>> {
        let goals = self.store.list_goals(true, &[]).await?;
        let mut runs = Vec::new();

        for goal in goals {
            let state = self.store.get_state(&goal.id).await?;
            if self.should_run(&goal, &state) {
                info!("running scheduled goal: {}", goal.id);
                runs.push(self.execute_goal(&goal, false).await?);
            }
        }

        Ok(runs)
    }

    /// Background loop; cancel-safe at the sleep boundary (in-flight
    /// executions always complete before the task can be dropped).
    pub async fn run(self: Arc<Self>) {
        info!("scheduler started (check interval: {}s)", self.check_interval_secs);
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(self.check_interval_secs));
        interval.tick().await;

        loop {
            interval.tick().await;
            if let Err(e) = self.check_and_run().await {
                error!("scheduler error: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::models::ConditionRef;

    fn scheduler() -> Scheduler {
        Scheduler::with_in_memory_store(60)
    }

    fn ok_executor() -> GoalExecutor {
        Arc::new(|_goal_text: String| {
            Box::pin(async move { Ok(serde_json::json!({"success": true, "response": "done"})) })
        })
    }

    fn failing_executor() -> GoalExecutor {
        Arc::new(|_goal_text: String| {
            Box::pin(async move { Err(crate::error::Error::Execution("boom".to_string())) })
        })
    }

    #[tokio::test]
    async fn test_run_now_executes_and_records_state() {
        let scheduler = scheduler();
        scheduler.set_executor(ok_executor());
        scheduler.add_goal(ScheduledGoal::new("g1", "do a thing")).await.unwrap();

        let run = scheduler.run_now("g1", false).await.unwrap();
        assert!(run.success);

        let state = scheduler.get_state("g1").await.unwrap();
        assert_eq!(state.run_count, 1);
        assert!(state.last_success);
    }

    #[tokio::test]
    async fn test_once_schedule_runs_only_first_time() {
        let scheduler = scheduler();
        scheduler.set_executor(ok_executor());
        let goal = ScheduledGoal::new("once1", "run once").with_schedule(ScheduleType::Once, "");
        scheduler.add_goal(goal).await.unwrap();

        let runs = scheduler.check_and_run().await.unwrap();
        assert_eq!(runs.len(), 1);

        let runs_again = scheduler.check_and_run().await.unwrap();
        assert!(runs_again.is_empty());
    }

    #[tokio::test]
    async fn test_circuit_breaker_disables_after_max_failures() {
        let scheduler = scheduler();
        scheduler.set_executor(failing_executor());
        let goal = ScheduledGoal::new("fail1", "always fails").with_max_failures(2);
        scheduler.add_goal(goal).await.unwrap();

        scheduler.run_now("fail1", true).await.unwrap();
        scheduler.run_now("fail1", true).await.unwrap();

        let goal = scheduler.get_goal("fail1").await.unwrap().unwrap();
        assert!(!goal.enabled);
    }

    #[tokio::test]
    async fn test_max_runs_disables_goal() {
        let scheduler = scheduler();
        scheduler.set_executor(ok_executor());
        let goal = ScheduledGoal::new("limited", "run a couple times").with_max_runs(1);
        scheduler.add_goal(goal).await.unwrap();

        scheduler.run_now("limited", true).await.unwrap();
        let goal = scheduler.get_goal("limited").await.unwrap().unwrap();
        assert!(!goal.enabled);
    }

    #[tokio::test]
    async fn test_skip_condition_prevents_execution() {
        let scheduler = scheduler();
        scheduler.set_executor(ok_executor());
        scheduler.register_condition(
            "always_skip",
            Arc::new(|_state: &GoalState| true),
            None,
        );
        let goal = ScheduledGoal::new("skippable", "maybe run")
            .with_conditions(vec![ConditionRef::skip("always_skip").with_message("not now")]);
        scheduler.add_goal(goal).await.unwrap();

        let run = scheduler.run_now("skippable", false).await.unwrap();
        assert!(run.skipped);
        assert_eq!(run.skip_reason.as_deref(), Some("not now"));

        let state = scheduler.get_state("skippable").await.unwrap();
        assert_eq!(state.run_count, 0);
    }

    #[tokio::test]
    async fn test_force_run_bypasses_conditions() {
        let scheduler = scheduler();
        scheduler.set_executor(ok_executor());
        scheduler.register_condition("always_skip", Arc::new(|_state: &GoalState| true), None);
        let goal = ScheduledGoal::new("forceable", "run anyway")
            .with_conditions(vec![ConditionRef::skip("always_skip")]);
        scheduler.add_goal(goal).await.unwrap();

        let run = scheduler.run_now("forceable", true).await.unwrap();
        assert!(!run.skipped);
        assert!(run.success);
    }

    #[tokio::test]
    async fn test_modify_condition_rewrites_goal_text() {
        let scheduler = scheduler();
        let captured = Arc::new(std::sync::Mutex::new(String::new()));
        let captured_clone = captured.clone();
        scheduler.set_executor(Arc::new(move |goal_text: String| {
            let captured = captured_clone.clone();
            Box::pin(async move {
                *captured.lock().unwrap() = goal_text;
                Ok(serde_json::json!({"success": true}))
            })
        }));
        scheduler.register_condition(
            "add_context",
            Arc::new(|_state: &GoalState| true),
            Some(Arc::new(|text: &str, _state: &GoalState| format!("{text} (with context)"))),
        );
        let goal = ScheduledGoal::new("modifiable", "base goal").with_conditions(vec![ConditionRef {
            name: "add_context".to_string(),
            action: ConditionAction::Modify,
            message: None,
        }]);
        scheduler.add_goal(goal).await.unwrap();

        scheduler.run_now("modifiable", false).await.unwrap();
        assert_eq!(*captured.lock().unwrap(), "base goal (with context)");
    }
}
