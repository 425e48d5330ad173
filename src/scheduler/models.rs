//! Scheduler data model (§4.12): schedule kinds, per-goal state, and the
//! conditions that gate a run. Conditions reference a named predicate in the
//! `Scheduler`'s in-process registry rather than holding a closure directly —
//! goals round-trip through a `GoalStore`, and a closure can't.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a goal is scheduled to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleType {
    /// A single run, as soon as it is ever due (`run_count == 0`).
    Once,
    /// Every `schedule_value` seconds since the last run.
    Interval,
    /// Five-field cron expression in `schedule_value`.
    Cron,
    /// Never fires from `check_and_run`; only via `Scheduler::run_now`.
    OnDemand,
}

/// What a condition does when it matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionAction {
    /// Record a skipped run and return without executing.
    Skip,
    /// Disable the goal and record a skipped run.
    Disable,
    /// Rewrite the goal text before execution via the named modifier.
    Modify,
    /// Execute normally; the condition only surfaces in logs.
    Alert,
}

/// A named reference to a condition registered on the `Scheduler`. The
/// condition's actual check/modifier logic lives in the scheduler's
/// in-process registry, keyed by `name`; this struct is what gets persisted
/// alongside a `ScheduledGoal`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionRef {
    pub name: String,
    pub action: ConditionAction,
    pub message: Option<String>,
}

impl ConditionRef {
    pub fn skip(name: impl Into<String>) -> Self {
        ConditionRef {
            name: name.into(),
            action: ConditionAction::Skip,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Mutable per-goal state, carried between runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalState {
    pub goal_id: String,
    pub run_count: i64,
    pub last_run: Option<DateTime<Utc>>,
    pub last_result: Option<Value>,
    pub last_success: bool,
    pub consecutive_failures: i64,
    pub data: std::collections::HashMap<String, Value>,
}

impl GoalState {
    pub fn new(goal_id: impl Into<String>) -> Self {
        GoalState {
            goal_id: goal_id.into(),
            run_count: 0,
            last_run: None,
            last_result: None,
            last_success: true,
            consecutive_failures: 0,
            data: std::collections::HashMap::new(),
        }
    }
}

/// A goal on the schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledGoal {
    pub id: String,
    pub goal: String,
    pub schedule_type: ScheduleType,
    pub schedule_value: Option<String>,
    pub conditions: Vec<ConditionRef>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub tags: Vec<String>,
    pub max_runs: Option<i64>,
    pub max_failures: i64,
}

impl ScheduledGoal {
    pub fn new(id: impl Into<String>, goal: impl Into<String>) -> Self {
        ScheduledGoal {
            id: id.into(),
            goal: goal.into(),
            schedule_type: ScheduleType::OnDemand,
            schedule_value: None,
            conditions: Vec::new(),
            enabled: true,
            created_at: Utc::now(),
            tags: Vec::new(),
            max_runs: None,
            max_failures: 5,
        }
    }

    pub fn with_schedule(mut self, schedule_type: ScheduleType, schedule_value: impl Into<String>) -> Self {
        self.schedule_type = schedule_type;
        self.schedule_value = Some(schedule_value.into());
        self
    }

    pub fn with_conditions(mut self, conditions: Vec<ConditionRef>) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_max_runs(mut self, max_runs: i64) -> Self {
        self.max_runs = Some(max_runs);
        self
    }

    pub fn with_max_failures(mut self, max_failures: i64) -> Self {
        self.max_failures = max_failures;
        self
    }
}

/// Record of one goal execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledRun {
    pub goal_id: String,
    pub run_id: uuid::Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub success: bool,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub skipped: bool,
    pub skip_reason: Option<String>,
}

impl ScheduledRun {
    pub fn new(goal_id: impl Into<String>) -> Self {
        ScheduledRun {
            goal_id: goal_id.into(),
            run_id: uuid::Uuid::new_v4(),
            started_at: Utc::now(),
            completed_at: None,
            success: false,
            result: None,
            error: None,
            skipped: false,
            skip_reason: None,
        }
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.completed_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}

/// Parses a five-field cron expression (`minute hour day month weekday`).
pub fn parse_cron(expr: &str) -> crate::error::Result<[String; 5]> {
    let parts: Vec<&str> = expr.split_whitespace().collect();
    if parts.len() != 5 {
        return Err(crate::error::Error::InvalidInput(format!(
            "invalid cron expression: {expr}"
        )));
    }
    Ok([
        parts[0].to_string(),
        parts[1].to_string(),
        parts[2].to_string(),
        parts[3].to_string(),
        parts[4].to_string(),
    ])
}

fn field_matches(field: &str, value: u32) -> bool {
    if field == "*" {
        return true;
    }
    if let Some(step) = field.strip_prefix("*/") {
        return step.parse::<u32>().map(|s| s != 0 && value % s == 0).unwrap_or(false);
    }
    if field.contains(',') {
        return field.split(',').any(|part| part.trim().parse::<u32>() == Ok(value));
    }
    if let Some((start, end)) = field.split_once('-') {
        if let (Ok(start), Ok(end)) = (start.parse::<u32>(), end.parse::<u32>()) {
            return start <= value && value <= end;
        }
        return false;
    }
    field.parse::<u32>() == Ok(value)
}

/// Whether `dt` matches all five cron fields. Weekday is `0..=6` (Sunday=0),
/// matching `chrono::Weekday::num_days_from_sunday`.
pub fn cron_matches(cron: &[String; 5], dt: DateTime<Utc>) -> bool {
    use chrono::{Datelike, Timelike};

    field_matches(&cron[0], dt.minute())
        && field_matches(&cron[1], dt.hour())
        && field_matches(&cron[2], dt.day())
        && field_matches(&cron[3], dt.month())
        && field_matches(&cron[4], dt.weekday().num_days_from_sunday())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cron_rejects_wrong_field_count() {
        assert!(parse_cron("0 18 * *").is_err());
    }

    #[test]
    fn test_cron_matches_wildcard() {
        let cron = parse_cron("* * * * *").unwrap();
        assert!(cron_matches(&cron, Utc::now()));
    }

    #[test]
    fn test_cron_matches_step() {
        let cron = parse_cron("*/15 * * * *").unwrap();
        let dt = Utc::now().date_naive().and_hms_opt(12, 30, 0).unwrap().and_utc();
        assert!(cron_matches(&cron, dt));
        let dt = Utc::now().date_naive().and_hms_opt(12, 31, 0).unwrap().and_utc();
        assert!(!cron_matches(&cron, dt));
    }

    #[test]
    fn test_cron_matches_list_and_range() {
        let cron = parse_cron("0 9,17 * * 1-5").unwrap();
        let monday_9am = chrono::NaiveDate::from_ymd_opt(2026, 7, 27)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
            .and_utc();
        assert!(cron_matches(&cron, monday_9am));
    }

    #[test]
    fn test_duration_ms_none_until_completed() {
        let run = ScheduledRun::new("g");
        assert!(run.duration_ms().is_none());
    }
}
