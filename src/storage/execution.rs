//! Execution Store (§4.7): durable record of every goal and tool execution.
//!
//! Tables: `executions`, `tool_executions`, `tool_statistics`,
//! `deployment_monitoring`, `deployment_health_checks`, `deployment_rollbacks`,
//! `tool_creation_events`, `shadow_test_results`. Migrations live under
//! `migrations/`, applied with `sqlx::migrate!`, matching the teacher's
//! `database::postgres` pool-init pattern.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct ToolStatistics {
    pub tool_name: String,
    pub total_calls: i64,
    pub successful_calls: i64,
    pub failed_calls: i64,
    pub success_rate: f64,
    pub avg_duration_ms: f64,
    pub last_used: Option<DateTime<Utc>>,
}

/// A tool's recorded lifecycle status, as tracked by `mark_tool_status`.
#[derive(Debug, Clone)]
pub struct ToolStatusRecord {
    pub tool_name: String,
    pub status: String,
    pub status_reason: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DurationPercentiles {
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

#[derive(Debug, Clone)]
pub struct WindowStats {
    pub total_executions: i64,
    pub successes: i64,
    pub success_rate: f64,
    pub avg_duration_ms: f64,
}

/// A deployment still under post-deployment regression watch (spec.md §4.11).
#[derive(Debug, Clone)]
pub struct ActiveMonitoringSession {
    pub session_id: Uuid,
    pub tool_name: String,
    pub deployment_time: DateTime<Utc>,
}

/// Durable record of every goal and tool execution, plus the autonomous
/// loop's own bookkeeping tables. One trait with a Postgres-backed and an
/// in-memory implementation, matching `storage::kv`'s two-implementation
/// shape.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn store_execution(
        &self,
        goal_id: Uuid,
        goal_text: &str,
        intent: &str,
        success: bool,
        error: Option<&str>,
        duration_ms: i64,
        metadata: Option<Value>,
    ) -> Result<Uuid>;

    async fn store_tool_execution(
        &self,
        execution_id: Uuid,
        tool_name: &str,
        parameters: Value,
        result: Option<&str>,
        success: bool,
        error: Option<&str>,
        duration_ms: Option<i64>,
    ) -> Result<()>;

    async fn get_tool_statistics(&self, tool_name: &str) -> Result<Option<ToolStatistics>>;

    /// Tools ranked worst-first by success rate, with at least `min_executions`.
    async fn get_bottom_tools(&self, limit: usize, min_executions: i64) -> Result<Vec<ToolStatistics>>;

    /// Tools ranked best-first by success rate, with at least `min_executions`.
    async fn get_top_tools(&self, limit: usize, min_executions: i64) -> Result<Vec<ToolStatistics>>;

    /// Tools with at least `min_failures` tool_execution failures in the
    /// last `hours` hours.
    async fn get_recent_failure_counts(&self, hours: i64, min_failures: i64) -> Result<Vec<(String, i64)>>;

    async fn mark_tool_status(&self, tool_name: &str, status: &str, reason: &str) -> Result<()>;

    async fn duration_percentiles(&self, tool_name: &str, window_hours: i64) -> Result<Option<DurationPercentiles>>;

    async fn keyword_aggregates(&self, window_hours: i64, limit: usize) -> Result<Vec<(String, i64)>>;

    async fn window_stats(&self, tool_name: &str, since: DateTime<Utc>, until: DateTime<Utc>) -> Result<WindowStats>;

    async fn record_shadow_test(
        &self,
        tool_name: &str,
        agreement_rate: f64,
        passed: bool,
        sample_count: i64,
    ) -> Result<()>;

    async fn record_deployment_monitoring(
        &self,
        tool_name: &str,
        deployment_time: DateTime<Utc>,
        status: &str,
    ) -> Result<Uuid>;

    async fn record_deployment_rollback(&self, tool_name: &str, reason: &str) -> Result<()>;

    async fn record_tool_creation_event(&self, tool_name: &str, goal_text: &str, source: &str) -> Result<()>;

    /// All tools with a recorded lifecycle status.
    async fn list_known_tools(&self) -> Result<Vec<ToolStatusRecord>>;

    /// Deployments still under their post-deployment monitoring window,
    /// i.e. not yet rolled back or otherwise closed out.
    async fn list_active_monitoring_sessions(&self) -> Result<Vec<ActiveMonitoringSession>>;
}

pub struct PgExecutionStore {
    pool: PgPool,
}

impl PgExecutionStore {
    pub fn new(pool: PgPool) -> Self {
        PgExecutionStore { pool }
    }
}

#[async_trait]
impl ExecutionStore for PgExecutionStore {
    async fn store_execution(
        &self,
        goal_id: Uuid,
        goal_text: &str,
        intent: &str,
        success: bool,
        error: Option<&str>,
        duration_ms: i64,
        metadata: Option<Value>,
    ) -> Result<Uuid> {
        let execution_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO executions (execution_id, goal_id, goal_text, intent, success, error, duration_ms, metadata, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now())",
        )
        .bind(execution_id)
        .bind(goal_id)
        .bind(goal_text)
        .bind(intent)
        .bind(success)
        .bind(error)
        .bind(duration_ms)
        .bind(metadata.unwrap_or(Value::Null))
        .execute(&self.pool)
        .await?;

        Ok(execution_id)
    }

    async fn store_tool_execution(
        &self,
        execution_id: Uuid,
        tool_name: &str,
        parameters: Value,
        result: Option<&str>,
        success: bool,
        error: Option<&str>,
        duration_ms: Option<i64>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO tool_executions (execution_id, tool_name, parameters, result, success, error, duration_ms, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, now())",
        )
        .bind(execution_id)
        .bind(tool_name)
        .bind(parameters)
        .bind(result)
        .bind(success)
        .bind(error)
        .bind(duration_ms)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_tool_statistics(&self, tool_name: &str) -> Result<Option<ToolStatistics>> {
        let row: Option<(i64, i64, i64, Option<f64>, Option<DateTime<Utc>>)> = sqlx::query_as(
            "SELECT count(*), count(*) FILTER (WHERE success), count(*) FILTER (WHERE NOT success), \
             avg(duration_ms) FILTER (WHERE success), max(created_at) \
             FROM tool_executions WHERE tool_name = $1",
        )
        .bind(tool_name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(total, successful, failed, avg_duration, last_used)| {
            ToolStatistics {
                tool_name: tool_name.to_string(),
                total_calls: total,
                successful_calls: successful,
                failed_calls: failed,
                success_rate: if total > 0 { successful as f64 / total as f64 } else { 0.0 },
                avg_duration_ms: avg_duration.unwrap_or(0.0),
                last_used,
            }
        }))
    }

    async fn get_bottom_tools(&self, limit: usize, min_executions: i64) -> Result<Vec<ToolStatistics>> {
        self.ranked_tools(limit, min_executions, true).await
    }

    async fn get_top_tools(&self, limit: usize, min_executions: i64) -> Result<Vec<ToolStatistics>> {
        self.ranked_tools(limit, min_executions, false).await
    }

    async fn get_recent_failure_counts(&self, hours: i64, min_failures: i64) -> Result<Vec<(String, i64)>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT tool_name, count(*) FROM tool_executions \
             WHERE NOT success AND created_at > now() - ($1 || ' hours')::interval \
             GROUP BY tool_name HAVING count(*) >= $2",
        )
        .bind(hours.to_string())
        .bind(min_failures)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn mark_tool_status(&self, tool_name: &str, status: &str, reason: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO tool_statistics (tool_name, status, status_reason, updated_at) \
             VALUES ($1, $2, $3, now()) \
             ON CONFLICT (tool_name) DO UPDATE SET status = $2, status_reason = $3, updated_at = now()",
        )
        .bind(tool_name)
        .bind(status)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn duration_percentiles(&self, tool_name: &str, window_hours: i64) -> Result<Option<DurationPercentiles>> {
        let row: Option<(Option<f64>, Option<f64>, Option<f64>)> = sqlx::query_as(
            "SELECT percentile_cont(0.5) WITHIN GROUP (ORDER BY duration_ms), \
                    percentile_cont(0.95) WITHIN GROUP (ORDER BY duration_ms), \
                    percentile_cont(0.99) WITHIN GROUP (ORDER BY duration_ms) \
             FROM tool_executions \
             WHERE tool_name = $1 AND created_at > now() - ($2 || ' hours')::interval",
        )
        .bind(tool_name)
        .bind(window_hours.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.and_then(|(p50, p95, p99)| match (p50, p95, p99) {
            (Some(p50), Some(p95), Some(p99)) => Some(DurationPercentiles {
                p50_ms: p50,
                p95_ms: p95,
                p99_ms: p99,
            }),
            _ => None,
        }))
    }

    async fn keyword_aggregates(&self, window_hours: i64, limit: usize) -> Result<Vec<(String, i64)>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT tool_name, count(*) FROM tool_executions \
             WHERE created_at > now() - ($1 || ' hours')::interval \
             GROUP BY tool_name ORDER BY count(*) DESC LIMIT $2",
        )
        .bind(window_hours.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn window_stats(&self, tool_name: &str, since: DateTime<Utc>, until: DateTime<Utc>) -> Result<WindowStats> {
        let row: (i64, i64, Option<f64>) = sqlx::query_as(
            "SELECT count(*), count(*) FILTER (WHERE success), avg(duration_ms) \
             FROM tool_executions WHERE tool_name = $1 AND created_at >= $2 AND created_at < $3",
        )
        .bind(tool_name)
        .bind(since)
        .bind(until)
        .fetch_one(&self.pool)
        .await?;

        let (total, successes, avg_duration) = row;
        Ok(WindowStats {
            total_executions: total,
            successes,
            success_rate: if total > 0 { successes as f64 / total as f64 } else { 0.0 },
            avg_duration_ms: avg_duration.unwrap_or(0.0),
        })
    }

    async fn record_shadow_test(
        &self,
        tool_name: &str,
        agreement_rate: f64,
        passed: bool,
        sample_count: i64,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO shadow_test_results (tool_name, agreement_rate, passed, sample_count, created_at) \
             VALUES ($1, $2, $3, $4, now())",
        )
        .bind(tool_name)
        .bind(agreement_rate)
        .bind(passed)
        .bind(sample_count)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_deployment_monitoring(
        &self,
        tool_name: &str,
        deployment_time: DateTime<Utc>,
        status: &str,
    ) -> Result<Uuid> {
        let session_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO deployment_monitoring (session_id, tool_name, deployment_time, status, created_at) \
             VALUES ($1, $2, $3, $4, now())",
        )
        .bind(session_id)
        .bind(tool_name)
        .bind(deployment_time)
        .bind(status)
        .execute(&self.pool)
        .await?;

        Ok(session_id)
    }

    async fn record_deployment_rollback(&self, tool_name: &str, reason: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO deployment_rollbacks (tool_name, reason, created_at) VALUES ($1, $2, now())",
        )
        .bind(tool_name)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "UPDATE deployment_monitoring SET status = 'rolled_back' WHERE tool_name = $1 AND status = 'active'",
        )
        .bind(tool_name)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_tool_creation_event(&self, tool_name: &str, goal_text: &str, source: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO tool_creation_events (tool_name, goal_text, source, created_at) VALUES ($1, $2, $3, now())",
        )
        .bind(tool_name)
        .bind(goal_text)
        .bind(source)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_active_monitoring_sessions(&self) -> Result<Vec<ActiveMonitoringSession>> {
        let rows: Vec<(Uuid, String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT session_id, tool_name, deployment_time FROM deployment_monitoring WHERE status = 'active'",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(session_id, tool_name, deployment_time)| ActiveMonitoringSession {
                session_id,
                tool_name,
                deployment_time,
            })
            .collect())
    }

    async fn list_known_tools(&self) -> Result<Vec<ToolStatusRecord>> {
        let rows: Vec<(String, String, String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT tool_name, status, status_reason, updated_at FROM tool_statistics",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(tool_name, status, status_reason, updated_at)| ToolStatusRecord {
                tool_name,
                status,
                status_reason,
                updated_at,
            })
            .collect())
    }
}

impl PgExecutionStore {
    async fn ranked_tools(&self, limit: usize, min_executions: i64, ascending: bool) -> Result<Vec<ToolStatistics>> {
        let order = if ascending { "ASC" } else { "DESC" };
        let query = format!(
            "SELECT tool_name, count(*) AS total, count(*) FILTER (WHERE success) AS successful, \
                    count(*) FILTER (WHERE NOT success) AS failed, avg(duration_ms) FILTER (WHERE success), \
                    max(created_at) \
             FROM tool_executions GROUP BY tool_name HAVING count(*) >= $1 \
             ORDER BY (count(*) FILTER (WHERE success))::float / count(*) {order} LIMIT $2",
        );

        let rows: Vec<(String, i64, i64, i64, Option<f64>, Option<DateTime<Utc>>)> = sqlx::query_as(&query)
            .bind(min_executions)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(tool_name, total, successful, failed, avg_duration, last_used)| ToolStatistics {
                tool_name,
                total_calls: total,
                successful_calls: successful,
                failed_calls: failed,
                success_rate: if total > 0 { successful as f64 / total as f64 } else { 0.0 },
                avg_duration_ms: avg_duration.unwrap_or(0.0),
                last_used,
            })
            .collect())
    }
}

/// In-memory double for tests and for single-shot CLI invocations with no
/// Postgres backend configured.
#[derive(Default)]
pub struct InMemoryExecutionStore {
    executions: RwLock<Vec<ExecutionRow>>,
    tool_executions: RwLock<Vec<ToolExecutionRow>>,
    statuses: RwLock<HashMap<String, (String, String, DateTime<Utc>)>>,
    shadow_tests: RwLock<Vec<(String, f64, bool, i64)>>,
    rollbacks: RwLock<Vec<(String, String)>>,
    creation_events: RwLock<Vec<(String, String, String)>>,
    monitoring_sessions: RwLock<Vec<MonitoringSessionRow>>,
}

#[derive(Clone)]
struct MonitoringSessionRow {
    session_id: Uuid,
    tool_name: String,
    deployment_time: DateTime<Utc>,
    status: String,
}

#[derive(Clone)]
struct ExecutionRow {
    #[allow(dead_code)]
    goal_id: Uuid,
    #[allow(dead_code)]
    goal_text: String,
    #[allow(dead_code)]
    intent: String,
    #[allow(dead_code)]
    success: bool,
}

#[derive(Clone)]
struct ToolExecutionRow {
    tool_name: String,
    success: bool,
    duration_ms: Option<i64>,
    created_at: DateTime<Utc>,
}

impl InMemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn store_execution(
        &self,
        goal_id: Uuid,
        goal_text: &str,
        intent: &str,
        success: bool,
        _error: Option<&str>,
        _duration_ms: i64,
        _metadata: Option<Value>,
    ) -> Result<Uuid> {
        let execution_id = Uuid::new_v4();
        self.executions.write().unwrap().push(ExecutionRow {
            goal_id,
            goal_text: goal_text.to_string(),
            intent: intent.to_string(),
            success,
        });
        Ok(execution_id)
    }

    async fn store_tool_execution(
        &self,
        _execution_id: Uuid,
        tool_name: &str,
        _parameters: Value,
        _result: Option<&str>,
        success: bool,
        _error: Option<&str>,
        duration_ms: Option<i64>,
    ) -> Result<()> {
        self.tool_executions.write().unwrap().push(ToolExecutionRow {
            tool_name: tool_name.to_string(),
            success,
            duration_ms,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn get_tool_statistics(&self, tool_name: &str) -> Result<Option<ToolStatistics>> {
        let rows = self.tool_executions.read().unwrap();
        let matching: Vec<&ToolExecutionRow> = rows.iter().filter(|r| r.tool_name == tool_name).collect();
        if matching.is_empty() {
            return Ok(None);
        }

        let total = matching.len() as i64;
        let successful = matching.iter().filter(|r| r.success).count() as i64;
        let failed = total - successful;
        let success_durations: Vec<i64> = matching
            .iter()
            .filter(|r| r.success)
            .filter_map(|r| r.duration_ms)
            .collect();
        let avg_duration_ms = if success_durations.is_empty() {
            0.0
        } else {
            success_durations.iter().sum::<i64>() as f64 / success_durations.len() as f64
        };

        Ok(Some(ToolStatistics {
            tool_name: tool_name.to_string(),
            total_calls: total,
            successful_calls: successful,
            failed_calls: failed,
            success_rate: successful as f64 / total as f64,
            avg_duration_ms,
            last_used: matching.iter().map(|r| r.created_at).max(),
        }))
    }

    async fn get_bottom_tools(&self, limit: usize, min_executions: i64) -> Result<Vec<ToolStatistics>> {
        self.ranked(limit, min_executions, true).await
    }

    async fn get_top_tools(&self, limit: usize, min_executions: i64) -> Result<Vec<ToolStatistics>> {
        self.ranked(limit, min_executions, false).await
    }

    async fn get_recent_failure_counts(&self, hours: i64, min_failures: i64) -> Result<Vec<(String, i64)>> {
        let cutoff = Utc::now() - chrono::Duration::hours(hours);
        let rows = self.tool_executions.read().unwrap();
        let mut counts: HashMap<String, i64> = HashMap::new();
        for row in rows.iter().filter(|r| !r.success && r.created_at > cutoff) {
            *counts.entry(row.tool_name.clone()).or_insert(0) += 1;
        }
        Ok(counts.into_iter().filter(|(_, c)| *c >= min_failures).collect())
    }

    async fn mark_tool_status(&self, tool_name: &str, status: &str, reason: &str) -> Result<()> {
        self.statuses
            .write()
            .unwrap()
            .insert(tool_name.to_string(), (status.to_string(), reason.to_string(), Utc::now()));
        Ok(())
    }

    async fn duration_percentiles(&self, tool_name: &str, window_hours: i64) -> Result<Option<DurationPercentiles>> {
        let cutoff = Utc::now() - chrono::Duration::hours(window_hours);
        let rows = self.tool_executions.read().unwrap();
        let mut durations: Vec<i64> = rows
            .iter()
            .filter(|r| r.tool_name == tool_name && r.created_at > cutoff)
            .filter_map(|r| r.duration_ms)
            .collect();
        if durations.is_empty() {
            return Ok(None);
        }
        durations.sort_unstable();
        let percentile = |p: f64| -> f64 {
            let idx = ((durations.len() - 1) as f64 * p).round() as usize;
            durations[idx] as f64
        };
        Ok(Some(DurationPercentiles {
            p50_ms: percentile(0.5),
            p95_ms: percentile(0.95),
            p99_ms: percentile(0.99),
        }))
    }

    async fn keyword_aggregates(&self, window_hours: i64, limit: usize) -> Result<Vec<(String, i64)>> {
        let cutoff = Utc::now() - chrono::Duration::hours(window_hours);
        let rows = self.tool_executions.read().unwrap();
        let mut counts: HashMap<String, i64> = HashMap::new();
        for row in rows.iter().filter(|r| r.created_at > cutoff) {
            *counts.entry(row.tool_name.clone()).or_insert(0) += 1;
        }
        let mut pairs: Vec<(String, i64)> = counts.into_iter().collect();
        pairs.sort_by(|a, b| b.1.cmp(&a.1));
        pairs.truncate(limit);
        Ok(pairs)
    }

    async fn window_stats(&self, tool_name: &str, since: DateTime<Utc>, until: DateTime<Utc>) -> Result<WindowStats> {
        let rows = self.tool_executions.read().unwrap();
        let matching: Vec<&ToolExecutionRow> = rows
            .iter()
            .filter(|r| r.tool_name == tool_name && r.created_at >= since && r.created_at < until)
            .collect();
        let total = matching.len() as i64;
        let successes = matching.iter().filter(|r| r.success).count() as i64;
        let durations: Vec<i64> = matching.iter().filter_map(|r| r.duration_ms).collect();
        let avg_duration_ms = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<i64>() as f64 / durations.len() as f64
        };

        Ok(WindowStats {
            total_executions: total,
            successes,
            success_rate: if total > 0 { successes as f64 / total as f64 } else { 0.0 },
            avg_duration_ms,
        })
    }

    async fn record_shadow_test(&self, tool_name: &str, agreement_rate: f64, passed: bool, sample_count: i64) -> Result<()> {
        self.shadow_tests
            .write()
            .unwrap()
            .push((tool_name.to_string(), agreement_rate, passed, sample_count));
        Ok(())
    }

    async fn record_deployment_monitoring(&self, tool_name: &str, deployment_time: DateTime<Utc>, status: &str) -> Result<Uuid> {
        let session_id = Uuid::new_v4();
        self.monitoring_sessions.write().unwrap().push(MonitoringSessionRow {
            session_id,
            tool_name: tool_name.to_string(),
            deployment_time,
            status: status.to_string(),
        });
        Ok(session_id)
    }

    async fn record_deployment_rollback(&self, tool_name: &str, reason: &str) -> Result<()> {
        self.rollbacks.write().unwrap().push((tool_name.to_string(), reason.to_string()));
        for session in self.monitoring_sessions.write().unwrap().iter_mut() {
            if session.tool_name == tool_name && session.status == "active" {
                session.status = "rolled_back".to_string();
            }
        }
        Ok(())
    }

    async fn list_active_monitoring_sessions(&self) -> Result<Vec<ActiveMonitoringSession>> {
        Ok(self
            .monitoring_sessions
            .read()
            .unwrap()
            .iter()
            .filter(|s| s.status == "active")
            .map(|s| ActiveMonitoringSession {
                session_id: s.session_id,
                tool_name: s.tool_name.clone(),
                deployment_time: s.deployment_time,
            })
            .collect())
    }

    async fn record_tool_creation_event(&self, tool_name: &str, goal_text: &str, source: &str) -> Result<()> {
        self.creation_events
            .write()
            .unwrap()
            .push((tool_name.to_string(), goal_text.to_string(), source.to_string()));
        Ok(())
    }

    async fn list_known_tools(&self) -> Result<Vec<ToolStatusRecord>> {
        Ok(self
            .statuses
            .read()
            .unwrap()
            .iter()
            .map(|(name, (status, reason, updated_at))| ToolStatusRecord {
                tool_name: name.clone(),
                status: status.clone(),
                status_reason: reason.clone(),
                updated_at: *updated_at,
            })
            .collect())
    }
}

impl InMemoryExecutionStore {
    async fn ranked(&self, limit: usize, min_executions: i64, ascending: bool) -> Result<Vec<ToolStatistics>> {
        let rows = self.tool_executions.read().unwrap();
        let mut names: Vec<String> = rows.iter().map(|r| r.tool_name.clone()).collect();
        names.sort();
        names.dedup();
        drop(rows);

        let mut stats = Vec::new();
        for name in names {
            if let Some(s) = self.get_tool_statistics(&name).await? {
                if s.total_calls >= min_executions {
                    stats.push(s);
                }
            }
        }

        stats.sort_by(|a, b| {
            if ascending {
                a.success_rate.partial_cmp(&b.success_rate).unwrap()
            } else {
                b.success_rate.partial_cmp(&a.success_rate).unwrap()
            }
        });
        stats.truncate(limit);
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tool_statistics_roundtrip() {
        let store = InMemoryExecutionStore::new();
        let exec_id = store
            .store_execution(Uuid::new_v4(), "do the thing", "tool", true, None, 12, None)
            .await
            .unwrap();

        store
            .store_tool_execution(exec_id, "calculate", serde_json::json!({}), Some("42"), true, None, Some(10))
            .await
            .unwrap();
        store
            .store_tool_execution(exec_id, "calculate", serde_json::json!({}), None, false, Some("boom"), Some(5))
            .await
            .unwrap();

        let stats = store.get_tool_statistics("calculate").await.unwrap().unwrap();
        assert_eq!(stats.total_calls, 2);
        assert_eq!(stats.successful_calls, 1);
        assert_eq!(stats.failed_calls, 1);
        assert!((stats.success_rate - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_bottom_tools_respects_min_executions() {
        let store = InMemoryExecutionStore::new();
        let exec_id = store
            .store_execution(Uuid::new_v4(), "g", "tool", true, None, 1, None)
            .await
            .unwrap();
        store
            .store_tool_execution(exec_id, "rare", serde_json::json!({}), None, false, None, Some(1))
            .await
            .unwrap();

        let bottom = store.get_bottom_tools(10, 10).await.unwrap();
        assert!(bottom.is_empty());

        let bottom = store.get_bottom_tools(10, 1).await.unwrap();
        assert_eq!(bottom.len(), 1);
    }
}
