//! Deployment Monitor (§4.11): compares a tool's success rate and duration
//! in the window since deployment against a historical baseline, flags
//! regressions, and triggers rollback when the drop is severe enough.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::events::{EventBus, EventType};
use crate::forge::{ForgeSandbox, ForgedToolAdapter, ToolForge};
use crate::storage::execution::WindowStats;
use crate::storage::ExecutionStore;
use crate::tools::ToolRegistry;

const DEFAULT_BASELINE_WINDOW_DAYS: i64 = 7;
const REGRESSION_THRESHOLD: f64 = 0.15;
const MIN_EXECUTIONS: i64 = 10;
const DURATION_REGRESSION_RATIO: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RegressionSeverity {
    None,
    Medium,
    High,
    Critical,
}

impl RegressionSeverity {
    fn from_drop(drop: f64) -> Self {
        if drop >= 0.30 {
            RegressionSeverity::Critical
        } else if drop >= 0.20 {
            RegressionSeverity::High
        } else if drop >= REGRESSION_THRESHOLD {
            RegressionSeverity::Medium
        } else {
            RegressionSeverity::None
        }
    }

    fn triggers_rollback(self) -> bool {
        !matches!(self, RegressionSeverity::None)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsComparison {
    pub has_sufficient_data: bool,
    pub success_rate_change: Option<f64>,
    pub success_rate_drop: Option<f64>,
    pub duration_change_ratio: Option<f64>,
    pub performance_degradation: bool,
    pub regression_detected: bool,
    pub regression_severity: RegressionSeverity,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub tool_name: String,
    pub deployment_time: DateTime<Utc>,
    pub baseline: WindowStats,
    pub current: WindowStats,
    pub comparison: MetricsComparison,
    pub needs_rollback: bool,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RollbackOutcome {
    pub tool_name: String,
    pub rolled_back: bool,
    pub reason: String,
}

pub struct DeploymentMonitor {
    execution_store: Arc<dyn ExecutionStore>,
    registry: Arc<ToolRegistry>,
    forge: Arc<ToolForge>,
    sandbox: Arc<ForgeSandbox>,
    events: Arc<dyn EventBus>,
    baseline_window_days: i64,
    regression_threshold: f64,
    min_executions: i64,
}

impl DeploymentMonitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        execution_store: Arc<dyn ExecutionStore>,
        registry: Arc<ToolRegistry>,
        forge: Arc<ToolForge>,
        sandbox: Arc<ForgeSandbox>,
        events: Arc<dyn EventBus>,
    ) -> Self {
        DeploymentMonitor {
            execution_store,
            registry,
            forge,
            sandbox,
            events,
            baseline_window_days: DEFAULT_BASELINE_WINDOW_DAYS,
            regression_threshold: REGRESSION_THRESHOLD,
            min_executions: MIN_EXECUTIONS,
        }
    }

    pub async fn start_monitoring(&self, tool_name: &str, deployment_time: DateTime<Utc>) -> Result<uuid::Uuid> {
        info!("starting post-deployment monitoring for {tool_name}, baseline {}d", self.baseline_window_days);
        self.execution_store.record_deployment_monitoring(tool_name, deployment_time, "active").await
    }

    pub async fn check_health(&self, tool_name: &str, deployment_time: DateTime<Utc>) -> Result<HealthReport> {
        let baseline_start = deployment_time - Duration::days(self.baseline_window_days);
        let now = Utc::now();

        let baseline = self.execution_store.window_stats(tool_name, baseline_start, deployment_time).await?;
        let current = self.execution_store.window_stats(tool_name, deployment_time, now).await?;

        let comparison = self.compare_metrics(&baseline, &current);
        let needs_rollback = comparison.regression_detected && comparison.regression_severity.triggers_rollback();

        Ok(HealthReport {
            tool_name: tool_name.to_string(),
            deployment_time,
            baseline,
            current,
            comparison,
            needs_rollback,
            checked_at: now,
        })
    }

    fn compare_metrics(&self, baseline: &WindowStats, current: &WindowStats) -> MetricsComparison {
        let has_sufficient_data = baseline.total_executions >= self.min_executions && current.total_executions >= self.min_executions;

        if !has_sufficient_data {
            return MetricsComparison {
                has_sufficient_data,
                success_rate_change: None,
                success_rate_drop: None,
                duration_change_ratio: None,
                performance_degradation: false,
                regression_detected: false,
                regression_severity: RegressionSeverity::None,
            };
        }

        let change = current.success_rate - baseline.success_rate;
        let drop = if change < 0.0 { -change } else { 0.0 };
        let severity = RegressionSeverity::from_drop(drop);
        let regression_detected = drop >= self.regression_threshold;

        let duration_change_ratio = if baseline.avg_duration_ms > 0.0 {
            Some((current.avg_duration_ms - baseline.avg_duration_ms) / baseline.avg_duration_ms)
        } else {
            None
        };
        let performance_degradation = duration_change_ratio.map(|r| r > DURATION_REGRESSION_RATIO).unwrap_or(false);

        MetricsComparison {
            has_sufficient_data,
            success_rate_change: Some(change),
            success_rate_drop: Some(drop),
            duration_change_ratio,
            performance_degradation,
            regression_detected,
            regression_severity: severity,
        }
    }

    /// Checks health and rolls back automatically if the regression is
    /// severe enough: restores the previous on-disk tool version (or
    /// unregisters it if no backup exists), records the rollback, and
    /// emits an event.
    pub async fn auto_rollback_if_needed(&self, tool_name: &str, deployment_time: DateTime<Utc>) -> Result<RollbackOutcome> {
        let health = self.check_health(tool_name, deployment_time).await?;

        if !health.needs_rollback {
            return Ok(RollbackOutcome {
                tool_name: tool_name.to_string(),
                rolled_back: false,
                reason: "no regression detected".to_string(),
            });
        }

        let reason = format!(
            "regression detected: {:?} severity, {:.1}% success rate drop",
            health.comparison.regression_severity,
            health.comparison.success_rate_drop.unwrap_or(0.0) * 100.0,
        );
        warn!("rolling back {tool_name}: {reason}");

        let restored_previous_version = match self.forge.get_backup(tool_name) {
            Some(backup) => {
                self.registry.register(Arc::new(ForgedToolAdapter::new(backup, self.sandbox.clone())));
                true
            }
            None => {
                self.registry.unregister(tool_name);
                false
            }
        };

        self.execution_store.record_deployment_rollback(tool_name, &reason).await?;

        let _ = self
            .events
            .emit(
                EventType::ToolRollback,
                Uuid::nil(),
                Some(tool_name),
                None,
                None,
                serde_json::json!({ "reason": reason, "restored_previous_version": restored_previous_version }),
            )
            .await;

        Ok(RollbackOutcome {
            tool_name: tool_name.to_string(),
            rolled_back: true,
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryExecutionStore;
    use uuid::Uuid;

    fn monitor() -> (DeploymentMonitor, Arc<dyn ExecutionStore>) {
        let store: Arc<dyn ExecutionStore> = Arc::new(InMemoryExecutionStore::new());
        let registry = Arc::new(ToolRegistry::new());
        let kv = Arc::new(crate::storage::InMemoryKvStore::new());
        let llm = Arc::new(crate::llm::LlmClient::new(&crate::config::LlmConfig::default()).unwrap());
        let forge = Arc::new(ToolForge::new(llm, kv));
        let sandbox = Arc::new(ForgeSandbox::new(std::env::temp_dir()));
        let events: Arc<dyn EventBus> = Arc::new(crate::events::InMemoryEventBus::new());
        (
            DeploymentMonitor::new(store.clone(), registry, forge, sandbox, events),
            store,
        )
    }

    async fn seed_executions(store: &Arc<dyn ExecutionStore>, tool_name: &str, count: usize, successes: usize, duration_ms: i64) {
        for i in 0..count {
            let execution_id = store
                .store_execution(Uuid::new_v4(), "goal", "tool", i < successes, None, 10, None)
                .await
                .unwrap();
            store
                .store_tool_execution(execution_id, tool_name, serde_json::json!({}), None, i < successes, None, Some(duration_ms))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_insufficient_data_skips_regression() {
        let (monitor, store) = monitor();
        seed_executions(&store, "flaky", 2, 2, 100).await;
        let report = monitor.check_health("flaky", Utc::now() - Duration::hours(1)).await.unwrap();
        assert!(!report.comparison.has_sufficient_data);
        assert!(!report.needs_rollback);
    }

    #[tokio::test]
    async fn test_severe_drop_triggers_rollback() {
        let (monitor, store) = monitor();
        seed_executions(&store, "degraded", 20, 20, 100).await;
        let deployment_time = Utc::now();
        seed_executions(&store, "degraded", 20, 5, 100).await;
        let report = monitor.check_health("degraded", deployment_time).await.unwrap();
        assert!(report.needs_rollback);
        assert_eq!(report.comparison.regression_severity, RegressionSeverity::Critical);
    }

    #[tokio::test]
    async fn test_auto_rollback_records_rollback() {
        let (monitor, store) = monitor();
        seed_executions(&store, "degraded", 20, 20, 100).await;
        let deployment_time = Utc::now();
        seed_executions(&store, "degraded", 20, 5, 100).await;
        let outcome = monitor.auto_rollback_if_needed("degraded", deployment_time).await.unwrap();
        assert!(outcome.rolled_back);
    }
}
