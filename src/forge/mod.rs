//! Tool Forge (§4.4): creates a tool at runtime when no existing one
//! matches a goal's need, validates the generated source, runs it inside
//! a sandbox, and tracks its performance through the draft/testing/active/
//! degraded/retired lifecycle.

pub mod sandbox;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::llm::LlmClient;
use crate::storage::kv::KvStore;
use crate::tools::{ParameterSpec, Tool, ToolCharacteristics, ToolDefinition, ToolResult};

pub use sandbox::ForgeSandbox;

const KV_NAMESPACE: &str = "forge";
const KV_TOOLS_KEY: &str = "forged_tools";
const KV_PERFORMANCE_KEY: &str = "performance";
const KV_BACKUPS_KEY: &str = "backups";

/// Lifecycle status of a forged tool (spec.md §4.1 `ToolPerformance`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Draft,
    Testing,
    Active,
    Degraded,
    Retired,
}

/// Running statistics for a single tool, built or forged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolPerformance {
    pub tool_name: String,
    pub created_at: DateTime<Utc>,
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub total_duration_ms: u64,
    pub last_used: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub status: ToolStatus,
}

impl ToolPerformance {
    pub fn new(tool_name: impl Into<String>, status: ToolStatus) -> Self {
        ToolPerformance {
            tool_name: tool_name.into(),
            created_at: Utc::now(),
            total_calls: 0,
            successful_calls: 0,
            failed_calls: 0,
            total_duration_ms: 0,
            last_used: None,
            last_error: None,
            status,
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_calls == 0 {
            1.0
        } else {
            self.successful_calls as f64 / self.total_calls as f64
        }
    }

    pub fn avg_duration_ms(&self) -> f64 {
        if self.successful_calls == 0 {
            0.0
        } else {
            self.total_duration_ms as f64 / self.successful_calls as f64
        }
    }

    /// `testing -> active` after 3 successes (spec.md §4.1).
    pub fn record_success(&mut self, duration_ms: u64) {
        self.total_calls += 1;
        self.successful_calls += 1;
        self.total_duration_ms += duration_ms;
        self.last_used = Some(Utc::now());

        if self.status == ToolStatus::Testing && self.successful_calls >= 3 {
            self.status = ToolStatus::Active;
        }
    }

    /// `active -> degraded` once `total_calls >= 5` and success-rate `< 0.5`
    /// (spec.md §4.1).
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.total_calls += 1;
        self.failed_calls += 1;
        self.last_used = Some(Utc::now());
        self.last_error = Some(error.into());

        if self.total_calls >= 5 && self.success_rate() < 0.5 {
            self.status = ToolStatus::Degraded;
        }
    }
}

/// A dynamically created tool (spec.md §4.1 `ForgedTool`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgedTool {
    pub name: String,
    pub description: String,
    pub code: String,
    pub parameters: Vec<ParameterSpec>,
    pub domain: String,
    pub concepts: HashSet<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub version: u32,
    /// Set from static analysis of the generated source; feeds
    /// `ToolCharacteristics.safe_for_shadow` so host-I/O tools are excluded
    /// from shadow testing rather than run twice against production side
    /// effects. Every forged tool still executes through the same
    /// subprocess sandbox regardless of this flag.
    pub requires_host_io: bool,
}

impl ForgedTool {
    pub fn code_hash(&self) -> String {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.code.hash(&mut hasher);
        format!("{:012x}", hasher.finish())
    }

    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
            domain: Some(self.domain.clone()),
            concepts: self.concepts.clone(),
            synonyms: HashSet::new(),
            characteristics: ToolCharacteristics {
                safe_for_shadow: !self.requires_host_io,
                idempotent: !self.requires_host_io,
                side_effects: if self.requires_host_io {
                    vec!["host_io".to_string()]
                } else {
                    vec!["none".to_string()]
                },
            },
        }
    }
}

/// Bridges a `ForgedTool` into the `Tool` trait so the registry can hold it
/// next to the compile-time built-ins. Execution goes through the forge's
/// own JSON-pipe sandbox rather than an in-process call, since forged code
/// is untrusted source compiled at runtime.
pub struct ForgedToolAdapter {
    tool: ForgedTool,
    sandbox: Arc<ForgeSandbox>,
}

impl ForgedToolAdapter {
    pub fn new(tool: ForgedTool, sandbox: Arc<ForgeSandbox>) -> Self {
        ForgedToolAdapter { tool, sandbox }
    }
}

#[async_trait]
impl Tool for ForgedToolAdapter {
    fn definition(&self) -> ToolDefinition {
        self.tool.definition()
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        match self.sandbox.run(&self.tool, args).await {
            Ok(value) => {
                if let Some(err) = value.get("error").and_then(Value::as_str) {
                    Ok(ToolResult::failure(err.to_string()))
                } else {
                    Ok(ToolResult::success_with_metadata(value.to_string(), value))
                }
            }
            Err(e) => Ok(ToolResult::failure(e.to_string())),
        }
    }
}

/// Tokens that reject a generated source outright: anything that could
/// spawn a process, touch the network, or read/write outside the sandbox
/// scratch directory (spec.md REDESIGN FLAGS, tool-creation section).
const BANNED_TOKENS: &[&str] = &[
    "std::process",
    "Command::new",
    "std::net",
    "TcpStream",
    "TcpListener",
    "UdpSocket",
    "std::fs::",
    "File::create",
    "File::open",
    "std::env::",
    "unsafe",
    "include!",
    "include_str!",
    "include_bytes!",
    "asm!",
    "extern \"C\"",
    "libc::",
];

fn required_function_present(code: &str) -> bool {
    let Ok(file) = syn::parse_file(code) else {
        return false;
    };
    file.items.iter().any(|item| {
        if let syn::Item::Fn(f) = item {
            f.sig.ident == "execute" && f.sig.inputs.len() == 1
        } else {
            false
        }
    })
}

/// Checks the generated source is syntactically valid Rust, defines the
/// required `execute(input: serde_json::Value) -> serde_json::Value`
/// entry point, and contains none of the banned tokens.
pub fn validate_code(code: &str) -> Result<()> {
    syn::parse_file(code).map_err(Error::from)?;

    if !required_function_present(code) {
        return Err(Error::ForgeValidation(
            "generated code is missing a one-argument `execute` function".to_string(),
        ));
    }

    for token in BANNED_TOKENS {
        if code.contains(token) {
            return Err(Error::ForgeValidation(format!(
                "generated code contains banned token: {token}"
            )));
        }
    }

    Ok(())
}

/// Template the LLM must follow; the forge appends its own harness `main`
/// around the returned `execute` body, so the model only needs to produce
/// pure tool logic.
const TOOL_FORGE_PROMPT: &str = r#"Write a single Rust function for this capability.

Capability needed: {capability}
User's original request: {request}

The function MUST:
1. Be named `execute`, take one parameter `input: serde_json::Value`, and
   return `serde_json::Value`.
2. Use only `serde_json` from the standard prelude plus the value passed in;
   no file, process, or network access.
3. Return `serde_json::json!({{"error": "..."}})` on failure instead of
   panicking.

Respond with ONLY the Rust code for the function, no explanation, no main,
no imports beyond `serde_json::json`."#;

const TOOL_DEFINITION_PROMPT: &str = r#"Extract a tool definition from this Rust function.

Code:
```rust
{code}
```

Respond with JSON:
{{
  "name": "tool_name",
  "description": "what the tool does",
  "parameters": [
    {{"name": "param1", "type": "string", "description": "...", "required": true}}
  ],
  "domain": "general",
  "concepts": ["concept1", "concept2"],
  "requires_host_io": false
}}"#;

fn generate_tool_name(capability: &str) -> String {
    const STOP_WORDS: &[&str] = &["a", "an", "the", "for", "to", "from", "in", "on", "get", "do"];

    let words: Vec<String> = capability
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty() && !STOP_WORDS.contains(w))
        .take(4)
        .map(|w| w.to_string())
        .collect();

    if words.is_empty() {
        "custom_tool".to_string()
    } else {
        words.join("_")
    }
}

fn strip_rust_fence(response: &str) -> String {
    let trimmed = response.trim();
    if let Some(rest) = trimmed.strip_prefix("```rust") {
        return rest.trim_end_matches("```").trim().to_string();
    }
    if let Some(rest) = trimmed.strip_prefix("```") {
        return rest.trim_end_matches("```").trim().to_string();
    }
    trimmed.to_string()
}

/// Dynamic tool creation and lifecycle management (spec.md §4.4).
pub struct ToolForge {
    llm: Arc<LlmClient>,
    kv: Arc<dyn KvStore>,
    performance: RwLock<HashMap<String, ToolPerformance>>,
    forged_tools: RwLock<HashMap<String, ForgedTool>>,
    /// Previous version of a tool, kept so a regressing deployment can be
    /// rolled back to it (spec.md §4.11).
    backups: RwLock<HashMap<String, ForgedTool>>,
}

impl ToolForge {
    pub fn new(llm: Arc<LlmClient>, kv: Arc<dyn KvStore>) -> Self {
        ToolForge {
            llm,
            kv,
            performance: RwLock::new(HashMap::new()),
            forged_tools: RwLock::new(HashMap::new()),
            backups: RwLock::new(HashMap::new()),
        }
    }

    /// Create a new tool from a capability description. Returns `Ok(None)`
    /// (not an error) when generation or validation fails, since a forge
    /// miss is an expected outcome the caller falls back from.
    pub async fn create_tool(
        &self,
        capability: &str,
        request: &str,
        domain: &str,
    ) -> Result<Option<ForgedTool>> {
        let tool_name = generate_tool_name(capability);

        if self.forged_tools.read().unwrap().contains_key(&tool_name) {
            info!("tool {tool_name} already forged, reusing");
            return Ok(self.forged_tools.read().unwrap().get(&tool_name).cloned());
        }

        let prompt = TOOL_FORGE_PROMPT
            .replace("{capability}", capability)
            .replace("{request}", request);

        let raw = self.llm.generate(&prompt, None, 0.2, 800).await?;
        let code = strip_rust_fence(&raw);

        if code.is_empty() {
            warn!("forge: empty code generated for capability {capability}");
            return Ok(None);
        }

        if let Err(e) = validate_code(&code) {
            warn!("forge: generated code failed validation: {e}");
            return Ok(None);
        }

        let definition_prompt = TOOL_DEFINITION_PROMPT.replace("{code}", &code);
        let definition = match self.llm.generate_json(&definition_prompt, None).await {
            Ok(value) => value,
            Err(e) => {
                error!("forge: failed to extract definition: {e}");
                return Ok(None);
            }
        };

        let parameters = parse_parameters(&definition);
        let concepts: HashSet<String> = definition
            .get("concepts")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();
        let requires_host_io = definition
            .get("requires_host_io")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let forged = ForgedTool {
            name: tool_name.clone(),
            description: definition
                .get("description")
                .and_then(|v| v.as_str())
                .unwrap_or("forged tool")
                .to_string(),
            code,
            parameters,
            domain: domain.to_string(),
            concepts,
            created_by: "forge".to_string(),
            created_at: Utc::now(),
            version: 1,
            requires_host_io,
        };

        self.forged_tools.write().unwrap().insert(tool_name.clone(), forged.clone());
        self.performance
            .write()
            .unwrap()
            .insert(tool_name.clone(), ToolPerformance::new(&forged.name, ToolStatus::Testing));

        info!("forge: created new tool {}", forged.name);
        self.persist().await?;

        Ok(Some(forged))
    }

    pub fn record_success(&self, tool_name: &str, duration_ms: u64) {
        let mut perf = self.performance.write().unwrap();
        perf.entry(tool_name.to_string())
            .or_insert_with(|| ToolPerformance::new(tool_name, ToolStatus::Active))
            .record_success(duration_ms);
    }

    pub fn record_failure(&self, tool_name: &str, error: &str) {
        let mut perf = self.performance.write().unwrap();
        perf.entry(tool_name.to_string())
            .or_insert_with(|| ToolPerformance::new(tool_name, ToolStatus::Active))
            .record_failure(error);
    }

    pub fn get_performance(&self, tool_name: &str) -> Option<ToolPerformance> {
        self.performance.read().unwrap().get(tool_name).cloned()
    }

    pub fn get_all_performance(&self) -> HashMap<String, ToolPerformance> {
        self.performance.read().unwrap().clone()
    }

    pub fn get_degraded_tools(&self) -> Vec<String> {
        self.performance
            .read()
            .unwrap()
            .iter()
            .filter(|(_, perf)| perf.status == ToolStatus::Degraded)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn retire_tool(&self, tool_name: &str) -> bool {
        let mut perf = self.performance.write().unwrap();
        if let Some(p) = perf.get_mut(tool_name) {
            p.status = ToolStatus::Retired;
            info!("forge: retired tool {tool_name}");
            true
        } else {
            false
        }
    }

    pub fn get_forged_tool(&self, tool_name: &str) -> Option<ForgedTool> {
        self.forged_tools.read().unwrap().get(tool_name).cloned()
    }

    pub fn list_forged_tools(&self) -> Vec<String> {
        self.forged_tools.read().unwrap().keys().cloned().collect()
    }

    /// Snapshot the currently forged tool under `tool_name`, if one exists,
    /// as the rollback target for the replacement about to be deployed.
    /// Call this before the new version is registered.
    pub fn backup_current(&self, tool_name: &str) {
        if let Some(current) = self.forged_tools.read().unwrap().get(tool_name).cloned() {
            self.backups.write().unwrap().insert(tool_name.to_string(), current);
        }
    }

    /// The tool version that was active immediately before the last
    /// deployment of `tool_name`, if a backup was taken.
    pub fn get_backup(&self, tool_name: &str) -> Option<ForgedTool> {
        self.backups.read().unwrap().get(tool_name).cloned()
    }

    async fn persist(&self) -> Result<()> {
        let tools: HashMap<String, ForgedTool> = self.forged_tools.read().unwrap().clone();
        let performance: HashMap<String, ToolPerformance> = self.performance.read().unwrap().clone();
        let backups: HashMap<String, ForgedTool> = self.backups.read().unwrap().clone();
        self.kv
            .set(KV_NAMESPACE, KV_TOOLS_KEY, serde_json::to_value(tools)?, None)
            .await?;
        self.kv
            .set(
                KV_NAMESPACE,
                KV_PERFORMANCE_KEY,
                serde_json::to_value(performance)?,
                None,
            )
            .await?;
        self.kv
            .set(KV_NAMESPACE, KV_BACKUPS_KEY, serde_json::to_value(backups)?, None)
            .await?;
        Ok(())
    }

    /// Restore forged tools, performance history, and rollback backups from
    /// the KV store, typically called once at startup.
    pub async fn load(&self) -> Result<()> {
        if let Some(value) = self.kv.get(KV_NAMESPACE, KV_TOOLS_KEY).await? {
            let tools: HashMap<String, ForgedTool> = serde_json::from_value(value)?;
            info!("forge: restored {} forged tools", tools.len());
            *self.forged_tools.write().unwrap() = tools;
        }
        if let Some(value) = self.kv.get(KV_NAMESPACE, KV_PERFORMANCE_KEY).await? {
            let performance: HashMap<String, ToolPerformance> = serde_json::from_value(value)?;
            *self.performance.write().unwrap() = performance;
        }
        if let Some(value) = self.kv.get(KV_NAMESPACE, KV_BACKUPS_KEY).await? {
            let backups: HashMap<String, ForgedTool> = serde_json::from_value(value)?;
            *self.backups.write().unwrap() = backups;
        }
        Ok(())
    }
}

fn parse_parameters(definition: &Value) -> Vec<ParameterSpec> {
    definition
        .get("parameters")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|p| {
                    Some(ParameterSpec {
                        name: p.get("name")?.as_str()?.to_string(),
                        param_type: p
                            .get("type")
                            .and_then(|v| v.as_str())
                            .unwrap_or("string")
                            .to_string(),
                        description: p
                            .get("description")
                            .and_then(|v| v.as_str())
                            .unwrap_or("")
                            .to_string(),
                        required: p.get("required").and_then(|v| v.as_bool()).unwrap_or(false),
                        default: None,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_tool_name_strips_stopwords() {
        assert_eq!(generate_tool_name("Get the phase of the moon"), "phase_moon");
    }

    #[test]
    fn test_generate_tool_name_empty_falls_back() {
        assert_eq!(generate_tool_name("a the for"), "custom_tool");
    }

    #[test]
    fn test_validate_code_requires_execute_fn() {
        let code = "pub fn other(input: serde_json::Value) -> serde_json::Value { input }";
        assert!(validate_code(code).is_err());
    }

    #[test]
    fn test_validate_code_rejects_banned_token() {
        let code = r#"pub fn execute(input: serde_json::Value) -> serde_json::Value {
            std::process::Command::new("ls");
            input
        }"#;
        assert!(validate_code(code).is_err());
    }

    #[test]
    fn test_validate_code_accepts_clean_source() {
        let code = r#"pub fn execute(input: serde_json::Value) -> serde_json::Value {
            serde_json::json!({"ok": true, "echo": input})
        }"#;
        assert!(validate_code(code).is_ok());
    }

    #[test]
    fn test_tool_performance_testing_to_active() {
        let mut perf = ToolPerformance::new("t", ToolStatus::Testing);
        perf.record_success(10);
        perf.record_success(10);
        assert_eq!(perf.status, ToolStatus::Testing);
        perf.record_success(10);
        assert_eq!(perf.status, ToolStatus::Active);
    }

    #[test]
    fn test_tool_performance_degrades() {
        let mut perf = ToolPerformance::new("t", ToolStatus::Active);
        perf.record_success(10);
        perf.record_failure("boom");
        perf.record_failure("boom");
        perf.record_failure("boom");
        perf.record_failure("boom");
        assert_eq!(perf.status, ToolStatus::Degraded);
    }
}
