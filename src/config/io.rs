//! Configuration loading and saving: layered TOML file + env overrides
//! via `dotenvy`, per the single recognized-env-vars list in §6.

use std::path::Path;

use super::types::Config;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    pub path: std::path::PathBuf,
    pub exists: bool,
    pub raw: Option<String>,
    pub config: Option<Config>,
    pub issues: Vec<String>,
}

/// Load configuration: file at the default path if present, else
/// environment-variable overrides on top of defaults.
pub fn load_config() -> Result<Config> {
    dotenvy::dotenv().ok();

    let path = super::paths::config_path();
    let mut config = if path.exists() {
        load_config_from_path(&path)?
    } else {
        Config::default()
    };

    apply_env_overrides(&mut config);
    Ok(config)
}

pub fn load_config_from_path(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("failed to read config file {}: {}", path.display(), e))
    })?;

    toml::from_str(&content).map_err(|e| Error::Config(format!("invalid TOML config: {}", e)))
}

/// Apply the environment variables listed in §6 on top of an already-loaded
/// config (file values win only where the env var is absent).
pub fn apply_env_overrides(config: &mut Config) {
    if let Ok(base_url) = std::env::var("NEUROMARK_LLM_BASE_URL") {
        config.llm.base_url = base_url;
    }
    if let Ok(model) = std::env::var("NEUROMARK_LLM_MODEL") {
        config.llm.model = model;
    }
    if let Ok(api_key) = std::env::var("NEUROMARK_LLM_API_KEY") {
        config.llm.api_key = Some(api_key);
    }

    if let Ok(database_url) = std::env::var("DATABASE_URL") {
        config.storage.postgres = Some(super::types::storage::PostgresConfig {
            url: database_url,
            max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            connect_timeout_secs: std::env::var("DATABASE_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        });
        config.storage.backend = super::types::storage::StorageBackendType::Postgres;
    }

    if let Ok(dir) = std::env::var("NEUROMARK_TOOLS_DIR") {
        config.paths.tools_dir = std::path::PathBuf::from(dir);
    }
    if let Ok(dir) = std::env::var("NEUROMARK_PROMPTS_DIR") {
        config.paths.prompts_dir = std::path::PathBuf::from(dir);
    }

    if let Ok(port) = std::env::var("NEUROMARK_PORT") {
        if let Ok(port) = port.parse() {
            config.server.port = port;
        }
    }
}

/// Load configuration straight from the environment, skipping any config
/// file lookup. Mirrors the teacher's `load_config_from_env` entry point,
/// kept for callers (tests, single-shot CLI invocations) that want to skip
/// the filesystem entirely.
pub fn load_config_from_env() -> Result<Config> {
    dotenvy::dotenv().ok();
    let mut config = Config::default();
    apply_env_overrides(&mut config);
    Ok(config)
}

pub fn save_config(config: &Config, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("failed to serialize config: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test_config.toml");

        let config = Config::default();
        save_config(&config, &path).unwrap();

        let loaded = load_config_from_path(&path).unwrap();
        assert_eq!(loaded.llm.model, config.llm.model);
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("NEUROMARK_LLM_MODEL", "test-model");
        let mut config = Config::default();
        apply_env_overrides(&mut config);
        assert_eq!(config.llm.model, "test-model");
        std::env::remove_var("NEUROMARK_LLM_MODEL");
    }
}
