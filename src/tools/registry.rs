//! Tool registry (§4.4): keyed by name, keyword-ranked search,
//! filesystem reload.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::warn;

use crate::error::Result;

use super::traits::{Tool, ToolCall, ToolDefinition, ToolResult};

pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        ToolRegistry {
            tools: RwLock::new(HashMap::new()),
        }
    }

    /// Registers (or replaces) a tool. Takes `&self` — the forge and the
    /// lifecycle manager both register/restore tools into a registry shared
    /// behind an `Arc` at runtime, not just during startup wiring.
    pub fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.definition().name.clone();
        self.tools.write().unwrap().insert(name, tool);
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.write().unwrap().remove(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().unwrap().get(name).cloned()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.read().unwrap().values().map(|t| t.definition()).collect()
    }

    pub async fn execute(&self, call: &ToolCall) -> Result<ToolResult> {
        match self.get(&call.tool_name) {
            Some(tool) => tool.execute(call.arguments.clone()).await,
            None => Ok(ToolResult::failure(format!("Unknown tool: {}", call.tool_name))),
        }
    }

    pub fn count(&self) -> usize {
        self.tools.read().unwrap().len()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.read().unwrap().keys().cloned().collect()
    }

    /// Keyword-ranked search: name hits x3, description hits x2, domain
    /// match +1, each concept/synonym hit +1 (§4.4).
    pub fn search(&self, query: &str, domain: Option<&str>, limit: usize) -> Vec<ToolDefinition> {
        let query_lower = query.to_lowercase();
        let terms: Vec<&str> = query_lower.split_whitespace().collect();

        let tools = self.tools.read().unwrap();
        let mut scored: Vec<(i64, ToolDefinition)> = tools
            .values()
            .map(|t| t.definition())
            .map(|def| {
                let mut score = 0i64;
                let name_lower = def.name.to_lowercase();
                let desc_lower = def.description.to_lowercase();

                for term in &terms {
                    if name_lower.contains(term) {
                        score += 3;
                    }
                    if desc_lower.contains(term) {
                        score += 2;
                    }
                }

                if let (Some(query_domain), Some(def_domain)) = (domain, def.domain.as_deref()) {
                    if query_domain.eq_ignore_ascii_case(def_domain) {
                        score += 1;
                    }
                }

                for concept in &def.concepts {
                    if terms.iter().any(|t| concept.to_lowercase().contains(t)) {
                        score += 1;
                    }
                }
                for syn in &def.synonyms {
                    if terms.iter().any(|t| syn.to_lowercase().contains(t)) {
                        score += 1;
                    }
                }

                (score, def)
            })
            .filter(|(score, _)| *score > 0)
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.truncate(limit);
        scored.into_iter().map(|(_, def)| def).collect()
    }

    /// Scan a directory for tool-bearing source units (forged tools saved to
    /// disk); failures to load a single unit are logged and skipped. Real
    /// instantiation goes through the Forge's sandbox; this just counts what
    /// is present, matching the registry's own reload contract — the Forge
    /// re-registers parsed units after validating them.
    pub fn count_loadable(&self, path: &Path) -> usize {
        let Ok(entries) = std::fs::read_dir(path) else {
            return 0;
        };

        let mut count = 0;
        for entry in entries.flatten() {
            let file_path = entry.path();
            let Some(name) = file_path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.starts_with('_') || name == "base.rs" || !name.ends_with(".rs") {
                continue;
            }
            match std::fs::read_to_string(&file_path) {
                Ok(_) => count += 1,
                Err(e) => warn!("failed to load tool unit {}: {e}", file_path.display()),
            }
        }
        count
    }

    /// Names of tools currently registered whose source file under `path`
    /// (stem, minus a `_tool` suffix) no longer exists — used by the
    /// lifecycle manager to detect deletions without forcing it to reach
    /// into the registry's internals.
    pub fn names_missing_from(&self, path: &Path) -> Vec<String> {
        let on_disk = scan_tool_stems(path);
        self.names().into_iter().filter(|n| !on_disk.contains(n)).collect()
    }
}

/// Tool name stems present on disk: `*.rs` files minus `_tool.rs`/`mod.rs`/
/// `base.rs`, with a trailing `_tool` stripped.
pub fn scan_tool_stems(path: &Path) -> std::collections::HashSet<String> {
    let mut stems = std::collections::HashSet::new();
    let Ok(entries) = std::fs::read_dir(path) else {
        return stems;
    };
    for entry in entries.flatten() {
        let file_path = entry.path();
        let Some(stem) = file_path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if file_path.extension().and_then(|e| e.to_str()) != Some("rs") {
            continue;
        }
        if stem == "mod" || stem == "base" || stem.starts_with('_') {
            continue;
        }
        let name = stem.strip_suffix("_tool").unwrap_or(stem);
        stems.insert(name.to_string());
    }
    stems
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::builtin::CalculatorTool;

    #[test]
    fn test_register_and_get() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(CalculatorTool::new()));
        assert!(registry.get("calculate").is_some());
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_search_ranks_name_over_description() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(CalculatorTool::new()));
        let results = registry.search("calculate", None, 5);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "calculate");
    }

    #[test]
    fn test_search_no_match_returns_empty() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(CalculatorTool::new()));
        let results = registry.search("moon phase astrology", None, 5);
        assert!(results.is_empty());
    }

    #[test]
    fn test_unregister_removes_tool() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(CalculatorTool::new()));
        assert!(registry.unregister("calculate").is_some());
        assert!(registry.get("calculate").is_none());
    }
}
