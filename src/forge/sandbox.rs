//! Sandboxed execution of forged tools: an out-of-process sandbox invoked
//! over a pipe with a JSON protocol (spec.md REDESIGN FLAGS). The forge
//! appends a small harness around the validated `execute` function, builds
//! it with a subprocess `rustc`, then runs the resulting binary with its
//! JSON argument on stdin and its JSON result read back from stdout. This
//! is the only execution path for forged tools; `requires_host_io` only
//! affects a tool's shadow-test eligibility, not which sandbox runs it.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::forge::ForgedTool;

const DEFAULT_COMPILE_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(10);

/// Wraps a validated `execute` function with a `main` that reads one JSON
/// value from stdin and writes one JSON value to stdout.
fn build_harness(tool_code: &str) -> String {
    format!(
        r#"use std::io::Read;

{tool_code}

fn main() {{
    let mut input = String::new();
    if std::io::stdin().read_to_string(&mut input).is_err() {{
        println!("{{}}", serde_json::json!({{"error": "failed to read stdin"}}));
        return;
    }}
    let value: serde_json::Value = serde_json::from_str(input.trim())
        .unwrap_or(serde_json::Value::Null);
    let result = execute(value);
    println!("{{}}", result);
}}
"#
    )
}

/// Compiles and runs a forged tool's code inside the sandbox scratch
/// directory, returning its JSON result.
pub struct ForgeSandbox {
    scratch_dir: PathBuf,
    compile_timeout: Duration,
    run_timeout: Duration,
}

impl ForgeSandbox {
    pub fn new(scratch_dir: PathBuf) -> Self {
        ForgeSandbox {
            scratch_dir,
            compile_timeout: DEFAULT_COMPILE_TIMEOUT,
            run_timeout: DEFAULT_RUN_TIMEOUT,
        }
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    pub async fn run(&self, tool: &ForgedTool, input: Value) -> Result<Value> {
        tokio::fs::create_dir_all(&self.scratch_dir).await?;

        let hash = tool.code_hash();
        let source_path = self.scratch_dir.join(format!("{}_{}.rs", tool.name, hash));
        let binary_path = self.scratch_dir.join(format!("{}_{}", tool.name, hash));

        let harness = build_harness(&tool.code);
        tokio::fs::write(&source_path, harness).await?;

        if !binary_path.exists() {
            self.compile(&source_path, &binary_path).await?;
        }

        self.execute(&binary_path, input).await
    }

    async fn compile(&self, source_path: &Path, binary_path: &Path) -> Result<()> {
        debug!("forge sandbox: compiling {}", source_path.display());

        let mut command = Command::new("rustc");
        command
            .arg("--edition")
            .arg("2021")
            .arg("--crate-type")
            .arg("bin")
            .arg("-C")
            .arg("opt-level=1")
            .arg("-o")
            .arg(binary_path)
            .arg(source_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let child = command
            .spawn()
            .map_err(|e| Error::Sandbox(format!("failed to spawn rustc: {e}")))?;

        let output = tokio::time::timeout(self.compile_timeout, child.wait_with_output())
            .await
            .map_err(|_| Error::Sandbox("compiling forged tool timed out".to_string()))?
            .map_err(|e| Error::Sandbox(format!("rustc process error: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(Error::ForgeValidation(format!(
                "forged tool failed to compile: {stderr}"
            )));
        }

        Ok(())
    }

    async fn execute(&self, binary_path: &Path, input: Value) -> Result<Value> {
        let start = Instant::now();

        let mut command = Command::new(binary_path);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command
            .spawn()
            .map_err(|e| Error::Sandbox(format!("failed to spawn forged tool: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input.to_string().as_bytes()).await?;
        }

        let result = tokio::time::timeout(self.run_timeout, child.wait_with_output()).await;

        match result {
            Ok(Ok(output)) if output.status.success() => {
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                serde_json::from_str(stdout.trim())
                    .map_err(|e| Error::Sandbox(format!("forged tool returned invalid JSON: {e}")))
            }
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                Err(Error::Execution(format!("forged tool exited non-zero: {stderr}")))
            }
            Ok(Err(e)) => Err(Error::Sandbox(format!("forged tool process error: {e}"))),
            Err(_) => {
                warn!("forged tool execution timed out after {:?}", self.run_timeout);
                Err(Error::Timeout("forged tool execution timed out".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_harness_contains_entry_points() {
        let harness = build_harness("pub fn execute(input: serde_json::Value) -> serde_json::Value { input }");
        assert!(harness.contains("fn main()"));
        assert!(harness.contains("fn execute"));
    }
}
