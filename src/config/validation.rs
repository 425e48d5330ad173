//! Configuration validation: reports issues without necessarily aborting
//! startup. `ConfigError` per §7 is raised by the caller on `errors` being
//! non-empty, not by this module.

use super::types::Config;

#[derive(Debug, Clone)]
pub struct ConfigValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ConfigValidationResult {
    pub fn valid() -> Self {
        ConfigValidationResult {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn with_error(mut self, issue: ValidationIssue) -> Self {
        self.valid = false;
        self.errors.push(issue);
        self
    }

    pub fn with_warning(mut self, issue: ValidationIssue) -> Self {
        self.warnings.push(issue);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationIssue {
            path: path.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

pub fn validate_config(config: &Config) -> ConfigValidationResult {
    let mut result = ConfigValidationResult::valid();

    if config.llm.base_url.is_empty() {
        result = result.with_error(ValidationIssue::new(
            "llm.base_url",
            "LLM base URL must not be empty",
        ));
    }

    use super::types::storage::StorageBackendType;
    if config.storage.backend == StorageBackendType::Postgres && config.storage.postgres.is_none()
    {
        result = result.with_error(
            ValidationIssue::new(
                "storage.postgres",
                "Postgres backend selected but not configured",
            )
            .with_suggestion("set DATABASE_URL or configure storage.postgres"),
        );
    }

    if config.autonomous_loop.improvement_threshold <= 0.0
        || config.autonomous_loop.improvement_threshold > 1.0
    {
        result = result.with_error(ValidationIssue::new(
            "autonomous_loop.improvement_threshold",
            "must be in (0, 1]",
        ));
    }

    if !config.paths.tools_dir.exists() {
        result = result.with_warning(
            ValidationIssue::new(
                "paths.tools_dir",
                format!("tools directory does not exist: {}", config.paths.tools_dir.display()),
            )
            .with_suggestion("it will be created on first use"),
        );
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        let config = Config::default();
        let result = validate_config(&config);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_validate_postgres_without_dsn() {
        use super::super::types::storage::StorageBackendType;
        let mut config = Config::default();
        config.storage.backend = StorageBackendType::Postgres;
        let result = validate_config(&config);
        assert!(!result.valid);
    }
}
