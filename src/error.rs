//! Crate-wide error type.
//!
//! Kinds mirror the contract neurons and background loops classify errors
//! into: `Llm`/`Parse` at the client boundary, `ToolNotFound`/
//! `NoMatchingTool`/`InvalidParameters`/`AuthRequired`/`Timeout`/
//! `Execution` on the tool path, `Config` at startup, `Store` for
//! persistence failures that should be logged but not fatal.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Config malformed at startup. Fatal, abort.
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport / non-2xx / timeout from the LLM endpoint.
    #[error("LLM error: {0}")]
    Llm(String),

    /// LLM returned malformed JSON where structured output was expected.
    #[error("failed to parse LLM response: {0}")]
    Parse(String),

    /// Requested tool absent from the registry.
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// Registry search returned no candidates.
    #[error("no matching tool for: {0}")]
    NoMatchingTool(String),

    /// Parameter extraction failed or the tool rejected its arguments.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// Downstream authentication failure; carries a human instruction block.
    #[error("authentication required: {0}")]
    AuthRequired(String),

    /// LLM or tool call exceeded its wall-clock budget.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Tool raised or returned an error during execution.
    #[error("execution error: {0}")]
    Execution(String),

    /// Subprocess sandbox failure (compile or run) unrelated to the tool's
    /// own logic.
    #[error("sandbox error: {0}")]
    Sandbox(String),

    /// Forge validation rejected generated source.
    #[error("forge validation failed: {0}")]
    ForgeValidation(String),

    /// Persistence-layer failure. Logged, non-fatal; callers keep the
    /// in-memory result.
    #[error("store error: {0}")]
    Store(String),

    /// Relational store error (sqlx).
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP transport error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON (de)serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input from a caller.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether a retry is likely to help.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Llm(_) | Error::Http(_) | Error::Timeout(_) | Error::Database(_)
        )
    }

    /// Whether this is the caller's fault (vs. ours).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidInput(_) | Error::InvalidParameters(_) | Error::ToolNotFound(_)
        )
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<syn::Error> for Error {
    fn from(err: syn::Error) -> Self {
        Error::ForgeValidation(err.to_string())
    }
}
