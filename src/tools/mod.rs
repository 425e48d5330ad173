//! Tool layer: the declarative contract (`traits`), the in-process registry
//! with keyword search (`registry`), and the handful of compile-time
//! built-ins (`builtin`). Forged tools register into the same `ToolRegistry`
//! once the forge validates and sandboxes them.

pub mod builtin;
pub mod registry;
pub mod traits;

pub use registry::ToolRegistry;
pub use traits::{
    ParameterSpec, Tool, ToolCall, ToolCharacteristics, ToolDefinition, ToolResult,
};
