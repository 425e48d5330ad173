//! # Neuromark
//!
//! A self-improving agentic orchestration engine: a goal is routed through a
//! fixed pipeline of neurons, every step is recorded on an append-only event
//! bus and a thought tree, and a background loop watches tool performance and
//! forges replacements for the ones that are failing.
//!
//! ## Architecture
//!
//! - **Agent** (`agent`): the orchestrator and its neuron pipeline (intent,
//!   memory, tool, generative), plus pattern cache and recovery.
//! - **Tools** (`tools`): the tool contract, in-process registry, built-ins.
//! - **Forge** (`forge`): runtime tool synthesis, validation against a
//!   banned-token allowlist, and execution of forged tools through a
//!   subprocess sandbox (`forge::sandbox`) that compiles and runs each
//!   tool's generated source in isolation.
//! - **Lifecycle** (`lifecycle`) / **Monitor** (`monitor`) / **Testing**
//!   (`testing`): the draft/testing/active/degraded/retired tool lifecycle,
//!   post-deployment regression monitoring, and the shadow/synthetic/replay
//!   test strategies that gate a promotion.
//! - **Autonomous** (`autonomous`): the background loop tying detection,
//!   investigation, forging, testing, and deployment together.
//! - **Events** (`events`) / **Thought** (`thought`): the append-only event
//!   bus and the per-goal thought tree.
//! - **Scheduler** (`scheduler`): persistent one-shot/interval/cron goals.
//! - **Storage** (`storage`): the key-value and relational execution store
//!   contracts, each with an in-memory and a Postgres backend.
//! - **Config** (`config`): modular configuration, loaded from file or env.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use neuromark::config::Config;
//! use neuromark::Result;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::from_env()?;
//!     let _ = config;
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod autonomous;
#[path = "config/mod.rs"]
pub mod config;
pub mod error;
pub mod events;
pub mod forge;
pub mod lifecycle;
pub mod llm;
pub mod monitor;
pub mod scheduler;
pub mod storage;
pub mod testing;
pub mod thought;
pub mod tools;

pub use error::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const NAME: &str = env!("CARGO_PKG_NAME");
