//! Configuration module — modular configuration management.
//!
//! Split into focused modules the way the teacher crate does:
//! - types/mod.rs: core `Config`, path layout, loop/scheduler/server tuning
//! - types/llm.rs: LLM endpoint configuration
//! - types/storage.rs: storage backend configuration
//! - io.rs: configuration loading and saving
//! - validation.rs: configuration validation
//! - paths.rs: configuration file paths

mod io;
mod paths;
mod types;
mod validation;

pub use types::{AutonomousLoopConfig, Config, PathsConfig, SchedulerConfig, ServerConfig};
pub use types::llm::LlmConfig;
pub use types::storage::{PostgresConfig, StorageBackendType, StorageConfig};

pub use io::{load_config, load_config_from_env, load_config_from_path, save_config, ConfigSnapshot};
pub use paths::{config_dir, config_path, state_dir, workspace_dir};
pub use validation::{validate_config, ConfigValidationResult, ValidationIssue};
