//! Tool Lifecycle Manager (§4.9): reconciles the tools actually present
//! (registry + forge) against the execution store's tracked status,
//! surfaces alerts when a useful or recently-used tool disappears, and
//! auto-archives stale deletions during maintenance.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::forge::ToolForge;
use crate::storage::ExecutionStore;
use crate::tools::ToolRegistry;

const USEFUL_SUCCESS_RATE: f64 = 0.85;
const USEFUL_MIN_USES: i64 = 20;
const RECENTLY_USED_DAYS: i64 = 7;
const ARCHIVE_AFTER_DAYS: i64 = 90;
const ARCHIVE_MAX_USES: i64 = 10;

#[derive(Debug, Clone, Serialize)]
pub struct DeletionAlert {
    pub tool_name: String,
    pub alert: bool,
    pub severity: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct ReconcileReport {
    pub newly_deleted: Vec<String>,
    pub restored: Vec<String>,
    pub new_manual: Vec<String>,
    pub alerts: Vec<DeletionAlert>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct MaintenanceReport {
    pub sync: ReconcileReport,
    pub archived: Vec<String>,
    pub previewed: Vec<String>,
}

pub struct ToolLifecycleManager {
    registry: Arc<ToolRegistry>,
    forge: Arc<ToolForge>,
    execution_store: Arc<dyn ExecutionStore>,
}

impl ToolLifecycleManager {
    pub fn new(registry: Arc<ToolRegistry>, forge: Arc<ToolForge>, execution_store: Arc<dyn ExecutionStore>) -> Self {
        ToolLifecycleManager {
            registry,
            forge,
            execution_store,
        }
    }

    /// Tools actually loadable right now: compile-time built-ins plus
    /// anything the forge holds source for, whether or not it has been
    /// registered into the live `ToolRegistry` yet.
    fn present_tools(&self) -> HashSet<String> {
        let mut present: HashSet<String> = self.registry.names().into_iter().collect();
        present.extend(self.forge.list_forged_tools());
        present
    }

    /// Compares the present-tool set against the execution store's tracked
    /// status and reconciles the two, mirroring the filesystem/DB diff of
    /// the original tool lifecycle manager but against the store that
    /// actually backs this port (`tool_statistics`, via `list_known_tools`).
    pub async fn sync_and_reconcile(&self) -> Result<ReconcileReport> {
        let present = self.present_tools();
        let known = self.execution_store.list_known_tools().await?;
        let known_names: HashSet<String> = known.iter().map(|r| r.tool_name.clone()).collect();

        let mut report = ReconcileReport::default();

        for record in &known {
            match record.status.as_str() {
                "active" if !present.contains(&record.tool_name) => {
                    report.newly_deleted.push(record.tool_name.clone());
                    let alert = self.analyze_deleted_tool(&record.tool_name).await?;
                    if alert.alert {
                        warn!("tool {} disappeared: {}", record.tool_name, alert.reason);
                    }
                    report.alerts.push(alert);
                    self.execution_store.mark_tool_status(&record.tool_name, "deleted", "missing_from_runtime").await?;
                }
                "deleted" if present.contains(&record.tool_name) => {
                    info!("tool {} reappeared, marking active", record.tool_name);
                    self.execution_store.mark_tool_status(&record.tool_name, "active", "restored").await?;
                    report.restored.push(record.tool_name.clone());
                }
                _ => {}
            }
        }

        for name in &present {
            if !known_names.contains(name) {
                report.new_manual.push(name.clone());
            }
        }
        report.new_manual.sort();

        Ok(report)
    }

    /// Alert severity for a tool that just dropped out of the present set:
    /// warning when it was genuinely useful, info when merely recent,
    /// otherwise no alert.
    async fn analyze_deleted_tool(&self, tool_name: &str) -> Result<DeletionAlert> {
        let stats = self.execution_store.get_tool_statistics(tool_name).await?;

        let Some(stats) = stats else {
            return Ok(DeletionAlert {
                tool_name: tool_name.to_string(),
                alert: false,
                severity: "none".to_string(),
                reason: "never_used".to_string(),
            });
        };

        if stats.total_calls == 0 {
            return Ok(DeletionAlert {
                tool_name: tool_name.to_string(),
                alert: false,
                severity: "none".to_string(),
                reason: "never_used".to_string(),
            });
        }

        if stats.success_rate > USEFUL_SUCCESS_RATE && stats.total_calls > USEFUL_MIN_USES {
            return Ok(DeletionAlert {
                tool_name: tool_name.to_string(),
                alert: true,
                severity: "warning".to_string(),
                reason: "useful_tool_deleted".to_string(),
            });
        }

        if let Some(last_used) = stats.last_used {
            if (Utc::now() - last_used).num_days() < RECENTLY_USED_DAYS {
                return Ok(DeletionAlert {
                    tool_name: tool_name.to_string(),
                    alert: true,
                    severity: "info".to_string(),
                    reason: "recently_used".to_string(),
                });
            }
        }

        Ok(DeletionAlert {
            tool_name: tool_name.to_string(),
            alert: false,
            severity: "none".to_string(),
            reason: "cleanup_ok".to_string(),
        })
    }

    /// Sync plus archival of deletions old enough and little-used enough to
    /// no longer carry learning value. `dry_run` computes what would be
    /// archived without calling `mark_tool_status`.
    pub async fn maintenance(&self, dry_run: bool) -> Result<MaintenanceReport> {
        let sync = self.sync_and_reconcile().await?;
        let known = self.execution_store.list_known_tools().await?;

        let mut archived = Vec::new();
        let mut previewed = Vec::new();

        for record in known.iter().filter(|r| r.status == "deleted") {
            let days_deleted = (Utc::now() - record.updated_at).num_days();
            if days_deleted < ARCHIVE_AFTER_DAYS {
                continue;
            }

            let stats = self.execution_store.get_tool_statistics(&record.tool_name).await?;
            let total_uses = stats.map(|s| s.total_calls).unwrap_or(0);
            if total_uses >= ARCHIVE_MAX_USES {
                continue;
            }

            if dry_run {
                previewed.push(record.tool_name.clone());
            } else {
                self.execution_store
                    .mark_tool_status(&record.tool_name, "archived", "auto_archive_stale_deletion")
                    .await?;
                archived.push(record.tool_name.clone());
            }
        }

        Ok(MaintenanceReport {
            sync,
            archived,
            previewed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmClient;
    use crate::storage::{InMemoryExecutionStore, InMemoryKvStore};
    use crate::tools::builtin::CalculatorTool;

    fn manager() -> (ToolLifecycleManager, Arc<dyn ExecutionStore>) {
        let registry = Arc::new(ToolRegistry::new());
        registry.register(Arc::new(CalculatorTool::new()));
        let llm = Arc::new(LlmClient::new(&crate::config::LlmConfig::default()).unwrap());
        let kv = Arc::new(InMemoryKvStore::new());
        let forge = Arc::new(ToolForge::new(llm, kv));
        let store: Arc<dyn ExecutionStore> = Arc::new(InMemoryExecutionStore::new());
        (ToolLifecycleManager::new(registry, forge, store.clone()), store)
    }

    #[tokio::test]
    async fn test_new_manual_tool_noted() {
        let (manager, _store) = manager();
        let report = manager.sync_and_reconcile().await.unwrap();
        assert!(report.new_manual.contains(&"calculate".to_string()));
        assert!(report.newly_deleted.is_empty());
    }

    #[tokio::test]
    async fn test_newly_deleted_tool_detected() {
        let (manager, store) = manager();
        store.mark_tool_status("ghost_tool", "active", "seed").await.unwrap();
        let report = manager.sync_and_reconcile().await.unwrap();
        assert!(report.newly_deleted.contains(&"ghost_tool".to_string()));
        assert_eq!(report.alerts.len(), 1);
        assert_eq!(report.alerts[0].severity, "none");
    }

    #[tokio::test]
    async fn test_restored_tool_marked_active() {
        let (manager, store) = manager();
        store.mark_tool_status("calculate", "deleted", "seed").await.unwrap();
        let report = manager.sync_and_reconcile().await.unwrap();
        assert!(report.restored.contains(&"calculate".to_string()));
    }

    #[tokio::test]
    async fn test_maintenance_dry_run_previews_without_archiving() {
        let (manager, store) = manager();
        store.mark_tool_status("old_tool", "deleted", "seed").await.unwrap();
        let report = manager.maintenance(true).await.unwrap();
        let known = store.list_known_tools().await.unwrap();
        let still_deleted = known.iter().any(|r| r.tool_name == "old_tool" && r.status == "deleted");
        assert!(still_deleted);
        assert!(report.archived.is_empty());
    }
}
