//! Compile-time built-in tools: a small vector of `(ToolDefinition,
//! executor)` pairs per spec.md §9's design note replacing runtime class
//! discovery.

mod calculator;
mod files;
mod memory;

pub use calculator::CalculatorTool;
pub use files::{ReadFileTool, WriteFileTool};
pub use memory::KeyValueMemoryTool;
