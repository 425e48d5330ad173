//! Shadow testing (§4.10): runs an old and a new tool version on the same
//! inputs in parallel and compares outputs with a comparison cascade —
//! exact equality, normalized-JSON equality, semantic-dict, semantic-list.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::storage::ExecutionStore;
use crate::tools::Tool;

const AGREEMENT_THRESHOLD: f64 = 0.95;

#[derive(Debug, Clone, Serialize)]
pub struct Disagreement {
    pub test_number: usize,
    pub input: Value,
    pub old_output: Value,
    pub new_output: Value,
    pub difference: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShadowTestResult {
    pub tool_name: String,
    pub test_count: usize,
    pub agreements: usize,
    pub disagreements: usize,
    pub errors: Vec<String>,
    pub differences: Vec<Disagreement>,
    pub agreement_rate: f64,
    pub passed: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

pub struct ShadowTester {
    execution_store: Option<Arc<dyn ExecutionStore>>,
}

impl ShadowTester {
    pub fn new(execution_store: Option<Arc<dyn ExecutionStore>>) -> Self {
        ShadowTester { execution_store }
    }

    pub async fn shadow_test(
        &self,
        tool_name: &str,
        old_tool: &dyn Tool,
        new_tool: &dyn Tool,
        test_inputs: &[Value],
    ) -> ShadowTestResult {
        let started_at = Utc::now();
        let mut agreements = 0usize;
        let mut disagreements = 0usize;
        let mut errors = Vec::new();
        let mut differences = Vec::new();

        for (idx, input) in test_inputs.iter().enumerate() {
            let (old_result, new_result) =
                tokio::join!(old_tool.execute(input.clone()), new_tool.execute(input.clone()));

            let old_output = match old_result {
                Ok(r) => serde_json::to_value(&r).unwrap_or(Value::Null),
                Err(e) => {
                    errors.push(format!("old version error: {e}"));
                    continue;
                }
            };
            let new_output = match new_result {
                Ok(r) => serde_json::to_value(&r).unwrap_or(Value::Null),
                Err(e) => {
                    errors.push(format!("new version error: {e}"));
                    continue;
                }
            };

            if outputs_agree(&old_output, &new_output) {
                agreements += 1;
            } else {
                disagreements += 1;
                differences.push(Disagreement {
                    test_number: idx + 1,
                    difference: describe_difference(&old_output, &new_output),
                    old_output,
                    new_output,
                    input: input.clone(),
                });
            }
        }

        let total_valid = agreements + disagreements;
        let agreement_rate = if total_valid > 0 {
            agreements as f64 / total_valid as f64
        } else {
            0.0
        };
        let passed = agreement_rate >= AGREEMENT_THRESHOLD;
        let completed_at = Utc::now();

        let result = ShadowTestResult {
            tool_name: tool_name.to_string(),
            test_count: test_inputs.len(),
            agreements,
            disagreements,
            errors,
            differences,
            agreement_rate,
            passed,
            started_at,
            completed_at,
        };

        if let Some(store) = &self.execution_store {
            let _ = store
                .record_shadow_test(tool_name, agreement_rate, passed, result.test_count as i64)
                .await;
        }

        result
    }
}

/// Cascade: exact equality, normalized-JSON (keys sorted by `serde_json`'s
/// map ordering already), semantic-dict, semantic-list.
fn outputs_agree(old: &Value, new: &Value) -> bool {
    if old == new {
        return true;
    }

    match (old, new) {
        (Value::Object(a), Value::Object(b)) => compare_objects(a, b),
        (Value::Array(a), Value::Array(b)) => compare_arrays(a, b),
        _ => false,
    }
}

fn compare_objects(a: &serde_json::Map<String, Value>, b: &serde_json::Map<String, Value>) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().all(|(k, v)| b.get(k).map(|bv| outputs_agree(v, bv)).unwrap_or(false))
}

fn compare_arrays(a: &[Value], b: &[Value]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    if a == b {
        return true;
    }
    // Multiset comparison when elements are hashable (strings/numbers/bools);
    // otherwise fall back to element-wise.
    let hashable = a.iter().all(is_hashable) && b.iter().all(is_hashable);
    if hashable {
        let mut a_sorted: Vec<String> = a.iter().map(|v| v.to_string()).collect();
        let mut b_sorted: Vec<String> = b.iter().map(|v| v.to_string()).collect();
        a_sorted.sort();
        b_sorted.sort();
        a_sorted == b_sorted
    } else {
        a.iter().zip(b.iter()).all(|(x, y)| outputs_agree(x, y))
    }
}

fn is_hashable(v: &Value) -> bool {
    matches!(v, Value::String(_) | Value::Number(_) | Value::Bool(_) | Value::Null)
}

fn describe_difference(old: &Value, new: &Value) -> String {
    if std::mem::discriminant(old) != std::mem::discriminant(new) {
        return format!("type mismatch: {old} vs {new}");
    }

    match (old, new) {
        (Value::Object(a), Value::Object(b)) => {
            let keys_a: std::collections::HashSet<&String> = a.keys().collect();
            let keys_b: std::collections::HashSet<&String> = b.keys().collect();
            if keys_a != keys_b {
                let missing: Vec<_> = keys_a.difference(&keys_b).collect();
                let extra: Vec<_> = keys_b.difference(&keys_a).collect();
                return format!("missing keys {missing:?}, extra keys {extra:?}");
            }
            let diffs: Vec<String> = a
                .iter()
                .filter(|(k, v)| b.get(*k).map(|bv| bv != *v).unwrap_or(true))
                .take(3)
                .map(|(k, v)| format!("{k}: {v} -> {}", b.get(k).cloned().unwrap_or(Value::Null)))
                .collect();
            format!("value differences: {}", diffs.join("; "))
        }
        (Value::Array(a), Value::Array(b)) => format!("list length {} vs {}", a.len(), b.len()),
        _ => format!("'{old}' vs '{new}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::builtin::CalculatorTool;

    #[tokio::test]
    async fn test_identical_tools_fully_agree() {
        let tool = CalculatorTool::new();
        let tester = ShadowTester::new(None);
        let inputs = vec![
            serde_json::json!({"expression": "2+2"}),
            serde_json::json!({"expression": "3*3"}),
        ];
        let result = tester.shadow_test("calculate", &tool, &tool, &inputs).await;
        assert_eq!(result.agreements, 2);
        assert_eq!(result.disagreements, 0);
        assert!(result.passed);
        assert_eq!(result.agreement_rate, 1.0);
    }

    #[test]
    fn test_outputs_agree_semantic_list_multiset() {
        let a = serde_json::json!(["x", "y", "z"]);
        let b = serde_json::json!(["z", "x", "y"]);
        assert!(outputs_agree(&a, &b));
    }

    #[test]
    fn test_outputs_disagree_type_mismatch() {
        let a = serde_json::json!("text");
        let b = serde_json::json!(42);
        assert!(!outputs_agree(&a, &b));
    }
}
