//! Tool-path recovery (§4.6): classify a tool failure into a `FailureType`,
//! consult recent history for similar failures, and pick one `RecoveryAction`
//! — attempted at most once per goal by the orchestrator.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

/// Tool success-rate floor below which `refactor_tool` becomes eligible
/// (§4.6).
pub const REFACTOR_SUCCESS_RATE_THRESHOLD: f64 = 0.3;
/// Fraction of overlapping words for two failure texts to count as
/// "similar" when scanning history.
const SIMILARITY_WORD_OVERLAP: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    NoMatchingTool,
    ToolExecutionError,
    InvalidParameters,
    InvalidResult,
    Timeout,
    AuthRequired,
}

impl FailureType {
    /// Classifies free-text error content by substring heuristic, mirroring
    /// the sentinel vocabulary ToolNeuron emits plus generic tool errors.
    pub fn classify(text: &str) -> Self {
        let lower = text.to_lowercase();

        if lower.contains("no_matching_tool") || lower.contains("no matching tool") {
            FailureType::NoMatchingTool
        } else if lower.contains("auth") || lower.contains("unauthorized") || lower.contains("credential") {
            FailureType::AuthRequired
        } else if lower.contains("timeout") || lower.contains("timed out") {
            FailureType::Timeout
        } else if lower.contains("invalid_parameters") || lower.contains("invalid parameter") {
            FailureType::InvalidParameters
        } else if lower.contains("invalid_result") || lower.contains("invalid result") {
            FailureType::InvalidResult
        } else {
            FailureType::ToolExecutionError
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    Retry,
    RefineParams,
    RequestConfig,
    FallbackGenerative,
    RefactorTool,
}

/// What a `RequestConfig` recovery needs to tell the caller: which service
/// is missing credentials, where to put them, and how to get them (§4.6).
#[derive(Debug, Clone)]
pub struct ServiceAuthInfo {
    pub service: String,
    pub config_key: String,
    pub instructions: String,
}

/// Best-effort identification of which external service a tool name
/// belongs to, from the name alone. Unrecognized names fall back to a
/// title-cased version of the name itself.
pub fn detect_service(tool_name: &str) -> String {
    let lower = tool_name.to_lowercase();
    if lower.contains("github") {
        return "GitHub".to_string();
    }
    title_case(&tool_name.replace('_', " "))
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// The key under which a service's credential is stored in the `config`
/// key-value namespace.
pub fn config_key_for(service: &str) -> String {
    format!("{}:token", service.to_lowercase().replace(' ', "_"))
}

/// Human-readable setup instructions for a service. GitHub gets a named
/// template; anything else falls back to a generic OAuth/API-token
/// template naming the service and its config key.
fn auth_instructions_for(service: &str, config_key: &str) -> String {
    match service {
        "GitHub" => format!(
            "To connect GitHub:\n\
             1. Go to https://github.com/settings/tokens and create a Personal Access Token\n\
             2. Store it under the '{config_key}' key in the config key-value namespace"
        ),
        _ => format!(
            "To connect {service}:\n\
             1. Obtain an API token or OAuth access token from {service}\n\
             2. Store it under the '{config_key}' key in the config key-value namespace"
        ),
    }
}

/// Full auth-setup description for the service a tool belongs to.
pub fn describe_auth(tool_name: &str) -> ServiceAuthInfo {
    let service = detect_service(tool_name);
    let config_key = config_key_for(&service);
    let instructions = auth_instructions_for(&service, &config_key);
    ServiceAuthInfo {
        service,
        config_key,
        instructions,
    }
}

#[derive(Debug, Clone)]
pub struct FailureRecord {
    pub tool_name: String,
    pub error_text: String,
    pub timestamp: DateTime<Utc>,
}

/// Rolling record of recent tool failures, used both to detect "similar
/// failures" (for refine-params heuristics) and to answer success-rate
/// questions the orchestrator can't get cheaply from the execution store
/// on the hot path.
#[derive(Default)]
pub struct ExecutionHistory {
    failures: RwLock<Vec<FailureRecord>>,
}

impl ExecutionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_failure(&self, tool_name: &str, error_text: &str) {
        self.failures.write().unwrap().push(FailureRecord {
            tool_name: tool_name.to_string(),
            error_text: error_text.to_string(),
            timestamp: Utc::now(),
        });
    }

    fn word_overlap(a: &str, b: &str) -> f64 {
        let words_a: std::collections::HashSet<&str> = a.split_whitespace().collect();
        let words_b: std::collections::HashSet<&str> = b.split_whitespace().collect();
        if words_a.is_empty() || words_b.is_empty() {
            return 0.0;
        }
        let overlap = words_a.intersection(&words_b).count();
        overlap as f64 / words_a.len().max(words_b.len()) as f64
    }

    /// Failures for `tool_name` whose error text overlaps the given text by
    /// at least `SIMILARITY_WORD_OVERLAP`.
    pub fn similar_failures(&self, tool_name: &str, error_text: &str) -> Vec<FailureRecord> {
        let lower_error = error_text.to_lowercase();
        self.failures
            .read()
            .unwrap()
            .iter()
            .filter(|f| f.tool_name == tool_name)
            .filter(|f| Self::word_overlap(&f.error_text.to_lowercase(), &lower_error) >= SIMILARITY_WORD_OVERLAP)
            .cloned()
            .collect()
    }
}

/// Decides the single recovery action for a tool-path failure. Each kind is
/// attempted at most once per goal — the caller (the orchestrator) tracks
/// that via `GoalContext::retried`/`params_refined`.
pub struct RecoveryEngine {
    history: ExecutionHistory,
    success_rates: RwLock<HashMap<String, f64>>,
}

impl Default for RecoveryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RecoveryEngine {
    pub fn new() -> Self {
        RecoveryEngine {
            history: ExecutionHistory::new(),
            success_rates: RwLock::new(HashMap::new()),
        }
    }

    pub fn history(&self) -> &ExecutionHistory {
        &self.history
    }

    pub fn set_success_rate(&self, tool_name: &str, rate: f64) {
        self.success_rates
            .write()
            .unwrap()
            .insert(tool_name.to_string(), rate);
    }

    pub fn success_rate(&self, tool_name: &str) -> Option<f64> {
        self.success_rates.read().unwrap().get(tool_name).copied()
    }

    /// Chooses a recovery action given a classified failure and whether the
    /// `retry`/`refine_params` budgets for this goal are already spent.
    pub fn decide(
        &self,
        tool_name: &str,
        failure: FailureType,
        already_retried: bool,
        already_refined: bool,
    ) -> RecoveryAction {
        match failure {
            FailureType::AuthRequired => RecoveryAction::RequestConfig,
            FailureType::NoMatchingTool => RecoveryAction::FallbackGenerative,
            FailureType::InvalidParameters | FailureType::InvalidResult => {
                if !already_refined {
                    RecoveryAction::RefineParams
                } else {
                    RecoveryAction::FallbackGenerative
                }
            }
            FailureType::Timeout | FailureType::ToolExecutionError => {
                if let Some(rate) = self.success_rate(tool_name) {
                    if rate < REFACTOR_SUCCESS_RATE_THRESHOLD {
                        return RecoveryAction::RefactorTool;
                    }
                }
                if !already_retried {
                    RecoveryAction::Retry
                } else if !already_refined {
                    RecoveryAction::RefineParams
                } else {
                    RecoveryAction::FallbackGenerative
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_auth() {
        assert_eq!(FailureType::classify("401 unauthorized: missing api key"), FailureType::AuthRequired);
    }

    #[test]
    fn test_classify_timeout() {
        assert_eq!(FailureType::classify("request timed out after 30s"), FailureType::Timeout);
    }

    #[test]
    fn test_classify_default_execution_error() {
        assert_eq!(FailureType::classify("connection refused"), FailureType::ToolExecutionError);
    }

    #[test]
    fn test_decide_retries_once_then_refines_then_falls_back() {
        let engine = RecoveryEngine::new();
        let a = engine.decide("search", FailureType::ToolExecutionError, false, false);
        assert_eq!(a, RecoveryAction::Retry);
        let b = engine.decide("search", FailureType::ToolExecutionError, true, false);
        assert_eq!(b, RecoveryAction::RefineParams);
        let c = engine.decide("search", FailureType::ToolExecutionError, true, true);
        assert_eq!(c, RecoveryAction::FallbackGenerative);
    }

    #[test]
    fn test_decide_refactor_when_success_rate_below_threshold() {
        let engine = RecoveryEngine::new();
        engine.set_success_rate("flaky_tool", 0.1);
        let action = engine.decide("flaky_tool", FailureType::ToolExecutionError, false, false);
        assert_eq!(action, RecoveryAction::RefactorTool);
    }

    #[test]
    fn test_detect_service_github() {
        assert_eq!(detect_service("github_create_issue"), "GitHub");
    }

    #[test]
    fn test_detect_service_falls_back_to_title_case() {
        assert_eq!(detect_service("weather_lookup"), "Weather Lookup");
    }

    #[test]
    fn test_describe_auth_github_names_the_service() {
        let info = describe_auth("github_create_issue");
        assert_eq!(info.service, "GitHub");
        assert_eq!(info.config_key, "github:token");
        assert!(info.instructions.contains("github.com/settings/tokens"));
    }

    #[test]
    fn test_describe_auth_generic_service_still_names_keys() {
        let info = describe_auth("spotify_now_playing");
        assert_eq!(info.config_key, "spotify_now_playing:token");
        assert!(info.instructions.contains("Spotify Now Playing"));
    }

    #[test]
    fn test_similar_failures_overlap() {
        let history = ExecutionHistory::new();
        history.record_failure("search", "connection refused by remote host");
        let similar = history.similar_failures("search", "connection refused unexpectedly");
        assert_eq!(similar.len(), 1);
        let dissimilar = history.similar_failures("search", "completely unrelated text here");
        assert!(dissimilar.is_empty());
    }
}
