//! Scheduler (§4.12): persistent job queue for one-shot, interval, and
//! cron-style recurring goals, with per-goal state carried between runs and
//! a circuit breaker on repeated failure.

pub mod models;
pub mod scheduler;
pub mod store;

pub use models::{
    cron_matches, parse_cron, ConditionAction, ConditionRef, GoalState, ScheduleType, ScheduledGoal, ScheduledRun,
};
pub use scheduler::{ConditionCheck, ConditionModifier, GoalExecutor, Scheduler};
pub use store::{GoalStore, InMemoryGoalStore, PgGoalStore};
