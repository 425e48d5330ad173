//! A minimal arithmetic tool, used throughout tests and demos for the
//! "tool path happy" end-to-end scenario (§8 scenario 2).

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::tools::traits::{ParameterSpec, Tool, ToolCharacteristics, ToolDefinition, ToolResult};

pub struct CalculatorTool;

impl CalculatorTool {
    pub fn new() -> Self {
        CalculatorTool
    }
}

impl Default for CalculatorTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for CalculatorTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "calculate".to_string(),
            description: "Evaluate a simple arithmetic expression with +, -, *, /".to_string(),
            parameters: vec![ParameterSpec {
                name: "expression".to_string(),
                param_type: "string".to_string(),
                description: "An arithmetic expression, e.g. '7*6'".to_string(),
                required: true,
                default: None,
            }],
            domain: Some("math".to_string()),
            concepts: HashSet::from(["arithmetic".to_string(), "math".to_string()]),
            synonyms: HashSet::from(["compute".to_string(), "evaluate".to_string()]),
            characteristics: ToolCharacteristics {
                safe_for_shadow: true,
                idempotent: true,
                side_effects: vec!["none".to_string()],
            },
        }
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let expression = args
            .get("expression")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::InvalidParameters("missing 'expression' parameter".to_string()))?;

        match evaluate(expression) {
            Ok(value) => Ok(ToolResult::success(format_number(value))),
            Err(e) => Ok(ToolResult::failure(e)),
        }
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Single-pass evaluator over `+ - * /` with standard precedence, no
/// parentheses. Sufficient for the "calculate 7*6" scenario; forged tools
/// handle richer math if a goal needs it.
fn evaluate(expression: &str) -> std::result::Result<f64, String> {
    let tokens = tokenize(expression)?;
    let mut pos = 0;
    let value = parse_expr(&tokens, &mut pos)?;
    if pos != tokens.len() {
        return Err("unexpected trailing tokens".to_string());
    }
    Ok(value)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
}

fn tokenize(expr: &str) -> std::result::Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = expr.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '+' => {
                tokens.push(Token::Plus);
                chars.next();
            }
            '-' => {
                tokens.push(Token::Minus);
                chars.next();
            }
            '*' => {
                tokens.push(Token::Star);
                chars.next();
            }
            '/' => {
                tokens.push(Token::Slash);
                chars.next();
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut number = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        number.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Number(
                    number.parse().map_err(|_| format!("invalid number: {number}"))?,
                ));
            }
            c => return Err(format!("unexpected character: {c}")),
        }
    }

    Ok(tokens)
}

fn parse_expr(tokens: &[Token], pos: &mut usize) -> std::result::Result<f64, String> {
    let mut value = parse_term(tokens, pos)?;
    while let Some(op) = tokens.get(*pos) {
        match op {
            Token::Plus => {
                *pos += 1;
                value += parse_term(tokens, pos)?;
            }
            Token::Minus => {
                *pos += 1;
                value -= parse_term(tokens, pos)?;
            }
            _ => break,
        }
    }
    Ok(value)
}

fn parse_term(tokens: &[Token], pos: &mut usize) -> std::result::Result<f64, String> {
    let mut value = parse_factor(tokens, pos)?;
    while let Some(op) = tokens.get(*pos) {
        match op {
            Token::Star => {
                *pos += 1;
                value *= parse_factor(tokens, pos)?;
            }
            Token::Slash => {
                *pos += 1;
                let divisor = parse_factor(tokens, pos)?;
                if divisor == 0.0 {
                    return Err("division by zero".to_string());
                }
                value /= divisor;
            }
            _ => break,
        }
    }
    Ok(value)
}

fn parse_factor(tokens: &[Token], pos: &mut usize) -> std::result::Result<f64, String> {
    match tokens.get(*pos) {
        Some(Token::Number(n)) => {
            *pos += 1;
            Ok(*n)
        }
        Some(Token::Minus) => {
            *pos += 1;
            Ok(-parse_factor(tokens, pos)?)
        }
        _ => Err("expected a number".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_calculate_happy_path() {
        let tool = CalculatorTool::new();
        let result = tool
            .execute(serde_json::json!({ "expression": "7*6" }))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.content.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn test_calculate_precedence() {
        let tool = CalculatorTool::new();
        let result = tool
            .execute(serde_json::json!({ "expression": "2+3*4" }))
            .await
            .unwrap();
        assert_eq!(result.content.as_deref(), Some("14"));
    }

    #[tokio::test]
    async fn test_calculate_division_by_zero() {
        let tool = CalculatorTool::new();
        let result = tool
            .execute(serde_json::json!({ "expression": "1/0" }))
            .await
            .unwrap();
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_calculate_missing_parameter() {
        let tool = CalculatorTool::new();
        let result = tool.execute(serde_json::json!({})).await;
        assert!(result.is_err());
    }
}
