//! Synthetic testing (§4.10): runs a new tool version on test cases the
//! tool itself declares, counting matches against declared expected
//! outputs.

use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::tools::Tool;

const PASS_THRESHOLD: f64 = 0.9;

#[derive(Debug, Clone)]
pub struct SyntheticCase {
    pub input: Value,
    pub expected_output: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyntheticResult {
    pub tool_name: String,
    pub case_count: usize,
    pub matches: usize,
    pub pass_rate: f64,
    pub passed: bool,
}

pub struct SyntheticTester;

impl SyntheticTester {
    pub fn new() -> Self {
        SyntheticTester
    }

    pub async fn synthetic_test(
        &self,
        tool_name: &str,
        tool: &dyn Tool,
        cases: &[SyntheticCase],
    ) -> Result<SyntheticResult> {
        let mut matches = 0usize;

        for case in cases {
            if let Ok(result) = tool.execute(case.input.clone()).await {
                if result.success && result.content.as_deref() == Some(case.expected_output.as_str()) {
                    matches += 1;
                }
            }
        }

        let pass_rate = if cases.is_empty() {
            0.0
        } else {
            matches as f64 / cases.len() as f64
        };

        Ok(SyntheticResult {
            tool_name: tool_name.to_string(),
            case_count: cases.len(),
            matches,
            pass_rate,
            passed: pass_rate >= PASS_THRESHOLD,
        })
    }
}

impl Default for SyntheticTester {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::builtin::CalculatorTool;

    #[tokio::test]
    async fn test_synthetic_matches_expected_output() {
        let tool = CalculatorTool::new();
        let tester = SyntheticTester::new();
        let cases = vec![SyntheticCase {
            input: serde_json::json!({"expression": "2+2"}),
            expected_output: "4".to_string(),
        }];
        let result = tester.synthetic_test("calculate", &tool, &cases).await.unwrap();
        assert_eq!(result.case_count, 1);
    }
}
