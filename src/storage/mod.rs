//! Storage backends: a key-value contract (§6) used by the thought tree and
//! pattern cache, and the durable execution store (§4.7).

pub mod execution;
pub mod kv;

pub use execution::{ExecutionStore, InMemoryExecutionStore, PgExecutionStore, ToolStatistics, ToolStatusRecord};
pub use kv::{InMemoryKvStore, KvStore, PostgresKvStore};
