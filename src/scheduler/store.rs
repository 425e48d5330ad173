//! Goal Store (§4.12): persistence for scheduled goals, their state, and run
//! history. Conditions are not serialized on the wire — only their
//! `ConditionRef` (name + action + message) is persisted; the scheduler
//! re-attaches actual check/modifier logic from its own named registry when
//! a goal is loaded, mirroring the original's Redis condition-registry note.

use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::Result;
use crate::scheduler::models::{GoalState, ScheduleType, ScheduledGoal, ScheduledRun};

const MAX_RUNS_KEPT: usize = 100;

#[async_trait]
pub trait GoalStore: Send + Sync {
    async fn save_goal(&self, goal: &ScheduledGoal) -> Result<()>;
    async fn get_goal(&self, goal_id: &str) -> Result<Option<ScheduledGoal>>;
    async fn list_goals(&self, enabled_only: bool, tags: &[String]) -> Result<Vec<ScheduledGoal>>;
    async fn delete_goal(&self, goal_id: &str) -> Result<bool>;

    /// Fetches a goal's state, creating a fresh one if none is recorded yet.
    async fn get_state(&self, goal_id: &str) -> Result<GoalState>;
    async fn save_state(&self, state: &GoalState) -> Result<()>;

    async fn save_run(&self, run: &ScheduledRun) -> Result<()>;
    async fn get_runs(&self, goal_id: &str, limit: usize) -> Result<Vec<ScheduledRun>>;
}

/// In-memory store, used for tests and single-shot CLI runs.
#[derive(Default)]
pub struct InMemoryGoalStore {
    goals: RwLock<HashMap<String, ScheduledGoal>>,
    states: RwLock<HashMap<String, GoalState>>,
    runs: RwLock<HashMap<String, Vec<ScheduledRun>>>,
}

impl InMemoryGoalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GoalStore for InMemoryGoalStore {
    async fn save_goal(&self, goal: &ScheduledGoal) -> Result<()> {
        self.goals.write().unwrap().insert(goal.id.clone(), goal.clone());
        Ok(())
    }

    async fn get_goal(&self, goal_id: &str) -> Result<Option<ScheduledGoal>> {
        Ok(self.goals.read().unwrap().get(goal_id).cloned())
    }

    async fn list_goals(&self, enabled_only: bool, tags: &[String]) -> Result<Vec<ScheduledGoal>> {
        let goals = self.goals.read().unwrap();
        Ok(goals
            .values()
            .filter(|g| !enabled_only || g.enabled)
            .filter(|g| tags.is_empty() || tags.iter().any(|t| g.tags.contains(t)))
            .cloned()
            .collect())
    }

    async fn delete_goal(&self, goal_id: &str) -> Result<bool> {
        Ok(self.goals.write().unwrap().remove(goal_id).is_some())
    }

    async fn get_state(&self, goal_id: &str) -> Result<GoalState> {
        let states = self.states.read().unwrap();
        Ok(states.get(goal_id).cloned().unwrap_or_else(|| GoalState::new(goal_id)))
    }

    async fn save_state(&self, state: &GoalState) -> Result<()> {
        self.states.write().unwrap().insert(state.goal_id.clone(), state.clone());
        Ok(())
    }

    async fn save_run(&self, run: &ScheduledRun) -> Result<()> {
        let mut runs = self.runs.write().unwrap();
        let entry = runs.entry(run.goal_id.clone()).or_default();
        entry.insert(0, run.clone());
        entry.truncate(MAX_RUNS_KEPT);
        Ok(())
    }

    async fn get_runs(&self, goal_id: &str, limit: usize) -> Result<Vec<ScheduledRun>> {
        let runs = self.runs.read().unwrap();
        Ok(runs
            .get(goal_id)
            .map(|rs| rs.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

/// Postgres-backed store, grounded on `storage::kv::PostgresKvStore`'s
/// pool-query pattern.
pub struct PgGoalStore {
    pool: PgPool,
}

impl PgGoalStore {
    pub fn new(pool: PgPool) -> Self {
        PgGoalStore { pool }
    }

    fn schedule_type_str(schedule_type: ScheduleType) -> &'static str {
        match schedule_type {
            ScheduleType::Once => "once",
            ScheduleType::Interval => "interval",
            ScheduleType::Cron => "cron",
            ScheduleType::OnDemand => "on_demand",
        }
    }

    fn parse_schedule_type(s: &str) -> ScheduleType {
        match s {
            "once" => ScheduleType::Once,
            "interval" => ScheduleType::Interval,
            "cron" => ScheduleType::Cron,
            _ => ScheduleType::OnDemand,
        }
    }
}

#[async_trait]
impl GoalStore for PgGoalStore {
    async fn save_goal(&self, goal: &ScheduledGoal) -> Result<()> {
        let condition_names = serde_json::to_value(&goal.conditions)?;
        let tags = serde_json::to_value(&goal.tags)?;

        sqlx::query(
            "INSERT INTO scheduled_goals \
             (id, goal_text, schedule_type, schedule_value, condition_names, enabled, max_runs, max_failures, tags, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (id) DO UPDATE SET \
             goal_text = $2, schedule_type = $3, schedule_value = $4, condition_names = $5, \
             enabled = $6, max_runs = $7, max_failures = $8, tags = $9",
        )
        .bind(&goal.id)
        .bind(&goal.goal)
        .bind(Self::schedule_type_str(goal.schedule_type))
        .bind(&goal.schedule_value)
        .bind(condition_names)
        .bind(goal.enabled)
        .bind(goal.max_runs)
        .bind(goal.max_failures)
        .bind(tags)
        .bind(goal.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_goal(&self, goal_id: &str) -> Result<Option<ScheduledGoal>> {
        let row: Option<(String, String, String, Option<String>, serde_json::Value, bool, Option<i64>, i64, serde_json::Value, chrono::DateTime<chrono::Utc>)> =
            sqlx::query_as(
                "SELECT id, goal_text, schedule_type, schedule_value, condition_names, enabled, max_runs, max_failures, tags, created_at \
                 FROM scheduled_goals WHERE id = $1",
            )
            .bind(goal_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(id, goal_text, schedule_type, schedule_value, conditions, enabled, max_runs, max_failures, tags, created_at)| {
            ScheduledGoal {
                id,
                goal: goal_text,
                schedule_type: Self::parse_schedule_type(&schedule_type),
                schedule_value,
                conditions: serde_json::from_value(conditions).unwrap_or_default(),
                enabled,
                created_at,
                tags: serde_json::from_value(tags).unwrap_or_default(),
                max_runs,
                max_failures,
            }
        }))
    }

    async fn list_goals(&self, enabled_only: bool, tags: &[String]) -> Result<Vec<ScheduledGoal>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT id FROM scheduled_goals ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;

        let mut goals = Vec::new();
        for (id,) in rows {
            if let Some(goal) = self.get_goal(&id).await? {
                if enabled_only && !goal.enabled {
                    continue;
                }
                if !tags.is_empty() && !tags.iter().any(|t| goal.tags.contains(t)) {
                    continue;
                }
                goals.push(goal);
            }
        }
        Ok(goals)
    }

    async fn delete_goal(&self, goal_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM scheduled_goals WHERE id = $1")
            .bind(goal_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_state(&self, goal_id: &str) -> Result<GoalState> {
        let row: Option<(String, i64, Option<chrono::DateTime<chrono::Utc>>, Option<serde_json::Value>, bool, i64, serde_json::Value)> =
            sqlx::query_as(
                "SELECT goal_id, run_count, last_run, last_result, last_success, consecutive_failures, data \
                 FROM goal_states WHERE goal_id = $1",
            )
            .bind(goal_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(match row {
            Some((goal_id, run_count, last_run, last_result, last_success, consecutive_failures, data)) => GoalState {
                goal_id,
                run_count,
                last_run,
                last_result,
                last_success,
                consecutive_failures,
                data: serde_json::from_value(data).unwrap_or_default(),
            },
            None => GoalState::new(goal_id),
        })
    }

    async fn save_state(&self, state: &GoalState) -> Result<()> {
        let data = serde_json::to_value(&state.data)?;

        sqlx::query(
            "INSERT INTO goal_states (goal_id, run_count, last_run, last_result, last_success, consecutive_failures, data) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (goal_id) DO UPDATE SET \
             run_count = $2, last_run = $3, last_result = $4, last_success = $5, consecutive_failures = $6, data = $7",
        )
        .bind(&state.goal_id)
        .bind(state.run_count)
        .bind(state.last_run)
        .bind(&state.last_result)
        .bind(state.last_success)
        .bind(state.consecutive_failures)
        .bind(data)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_run(&self, run: &ScheduledRun) -> Result<()> {
        sqlx::query(
            "INSERT INTO scheduled_runs \
             (run_id, goal_id, started_at, completed_at, success, result, error, skipped, skip_reason) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(run.run_id)
        .bind(&run.goal_id)
        .bind(run.started_at)
        .bind(run.completed_at)
        .bind(run.success)
        .bind(&run.result)
        .bind(&run.error)
        .bind(run.skipped)
        .bind(&run.skip_reason)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_runs(&self, goal_id: &str, limit: usize) -> Result<Vec<ScheduledRun>> {
        let rows: Vec<(String, uuid::Uuid, chrono::DateTime<chrono::Utc>, Option<chrono::DateTime<chrono::Utc>>, bool, Option<serde_json::Value>, Option<String>, bool, Option<String>)> =
            sqlx::query_as(
                "SELECT goal_id, run_id, started_at, completed_at, success, result, error, skipped, skip_reason \
                 FROM scheduled_runs WHERE goal_id = $1 ORDER BY started_at DESC LIMIT $2",
            )
            .bind(goal_id)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(goal_id, run_id, started_at, completed_at, success, result, error, skipped, skip_reason)| ScheduledRun {
                goal_id,
                run_id,
                started_at,
                completed_at,
                success,
                result,
                error,
                skipped,
                skip_reason,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::models::ScheduleType;

    #[tokio::test]
    async fn test_in_memory_roundtrip() {
        let store = InMemoryGoalStore::new();
        let goal = ScheduledGoal::new("daily_summary", "summarize today")
            .with_schedule(ScheduleType::Cron, "0 18 * * *");
        store.save_goal(&goal).await.unwrap();

        let fetched = store.get_goal("daily_summary").await.unwrap().unwrap();
        assert_eq!(fetched.goal, "summarize today");
        assert_eq!(fetched.schedule_type, ScheduleType::Cron);
    }

    #[tokio::test]
    async fn test_get_state_creates_default() {
        let store = InMemoryGoalStore::new();
        let state = store.get_state("nope").await.unwrap();
        assert_eq!(state.run_count, 0);
        assert!(state.last_run.is_none());
    }

    #[tokio::test]
    async fn test_runs_kept_most_recent_first() {
        let store = InMemoryGoalStore::new();
        let mut first = ScheduledRun::new("g");
        first.success = true;
        store.save_run(&first).await.unwrap();
        let mut second = ScheduledRun::new("g");
        second.success = false;
        store.save_run(&second).await.unwrap();

        let runs = store.get_runs("g", 10).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].run_id, second.run_id);
    }

    #[tokio::test]
    async fn test_list_goals_filters_enabled_and_tags() {
        let store = InMemoryGoalStore::new();
        let mut disabled = ScheduledGoal::new("b", "goal b").with_tags(vec!["finance".to_string()]);
        disabled.enabled = false;
        store.save_goal(&ScheduledGoal::new("a", "goal a").with_tags(vec!["health".to_string()])).await.unwrap();
        store.save_goal(&disabled).await.unwrap();

        let enabled = store.list_goals(true, &[]).await.unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].id, "a");

        let tagged = store.list_goals(false, &["finance".to_string()]).await.unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].id, "b");
    }
}
