//! The neuron pipeline (§4.5-§4.6): a `GoalContext` carries a goal through
//! a chain of single-responsibility neurons, each wrapped by the same
//! event/thought middleware, coordinated by a thin `Orchestrator` that
//! dispatches on intent and drives tool-path recovery.

pub mod context;
pub mod generative;
pub mod intent;
pub mod memory;
pub mod neuron;
pub mod orchestrator;
pub mod pattern_cache;
pub mod recovery;
pub mod tool;

pub use context::GoalContext;
pub use generative::GenerativeNeuron;
pub use intent::IntentNeuron;
pub use memory::MemoryNeuron;
pub use neuron::{Neuron, NeuronResult};
pub use orchestrator::{GoalResponse, Orchestrator};
pub use pattern_cache::PatternCache;
pub use recovery::{ExecutionHistory, FailureType, RecoveryAction, RecoveryEngine};
pub use tool::ToolNeuron;
