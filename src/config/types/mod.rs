//! Core configuration types.
//!
//! Split into focused modules the way the teacher crate does: `llm.rs` for
//! the LLM endpoint, `storage.rs` for the KV/relational backends, `paths`
//! (sibling module) for filesystem layout.

pub mod llm;
pub mod storage;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration. Immutable after creation; passed by reference
/// everywhere. Created once per process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: llm::LlmConfig,

    #[serde(default)]
    pub storage: storage::StorageConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub autonomous_loop: AutonomousLoopConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            llm: llm::LlmConfig::default(),
            storage: storage::StorageConfig::default(),
            paths: PathsConfig::default(),
            autonomous_loop: AutonomousLoopConfig::default(),
            scheduler: SchedulerConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    /// Load from config file or environment, mirroring the teacher's
    /// `Config::from_env()` convenience constructor.
    pub fn from_env() -> crate::error::Result<Self> {
        crate::config::load_config()
    }
}

/// Filesystem layout for tools and prompts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_tools_dir")]
    pub tools_dir: PathBuf,

    #[serde(default = "default_prompts_dir")]
    pub prompts_dir: PathBuf,

    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,

    #[serde(default = "default_sandbox_dir")]
    pub sandbox_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        PathsConfig {
            tools_dir: default_tools_dir(),
            prompts_dir: default_prompts_dir(),
            backup_dir: default_backup_dir(),
            sandbox_dir: default_sandbox_dir(),
        }
    }
}

fn default_tools_dir() -> PathBuf {
    super::paths::state_dir().join("tools")
}

fn default_prompts_dir() -> PathBuf {
    super::paths::state_dir().join("prompts")
}

fn default_backup_dir() -> PathBuf {
    super::paths::state_dir().join("tools_backup")
}

fn default_sandbox_dir() -> PathBuf {
    super::paths::state_dir().join("sandbox")
}

/// Tuning for the autonomous improvement loop (§4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutonomousLoopConfig {
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,

    #[serde(default = "default_maintenance_interval_secs")]
    pub maintenance_interval_secs: u64,

    #[serde(default = "default_improvement_threshold")]
    pub improvement_threshold: f64,

    #[serde(default = "default_high_priority_threshold")]
    pub high_priority_threshold: f64,

    #[serde(default = "default_min_executions")]
    pub min_executions: i64,

    #[serde(default = "default_shadow_pass_threshold")]
    pub shadow_pass_threshold: f64,

    #[serde(default = "default_synthetic_pass_threshold")]
    pub synthetic_pass_threshold: f64,

    #[serde(default)]
    pub auto_approve_manual_review: bool,
}

impl Default for AutonomousLoopConfig {
    fn default() -> Self {
        AutonomousLoopConfig {
            check_interval_secs: default_check_interval_secs(),
            maintenance_interval_secs: default_maintenance_interval_secs(),
            improvement_threshold: default_improvement_threshold(),
            high_priority_threshold: default_high_priority_threshold(),
            min_executions: default_min_executions(),
            shadow_pass_threshold: default_shadow_pass_threshold(),
            synthetic_pass_threshold: default_synthetic_pass_threshold(),
            auto_approve_manual_review: false,
        }
    }
}

fn default_check_interval_secs() -> u64 {
    300
}
fn default_maintenance_interval_secs() -> u64 {
    86_400
}
fn default_improvement_threshold() -> f64 {
    0.7
}
fn default_high_priority_threshold() -> f64 {
    0.5
}
fn default_min_executions() -> i64 {
    10
}
fn default_shadow_pass_threshold() -> f64 {
    0.95
}
fn default_synthetic_pass_threshold() -> f64 {
    0.9
}

/// Tuning for the scheduler's poll loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_max_failures")]
    pub default_max_failures: u32,

    #[serde(default = "default_double_fire_guard_secs")]
    pub double_fire_guard_secs: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            poll_interval_secs: default_poll_interval_secs(),
            default_max_failures: default_max_failures(),
            double_fire_guard_secs: default_double_fire_guard_secs(),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    30
}
fn default_max_failures() -> u32 {
    5
}
fn default_double_fire_guard_secs() -> i64 {
    60
}

/// The HTTP API surface (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: default_port(),
            bind: default_bind(),
        }
    }
}

fn default_port() -> u16 {
    8787
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server.port, 8787);
        assert_eq!(config.autonomous_loop.check_interval_secs, 300);
    }
}
