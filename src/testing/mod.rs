//! Testing strategies (§4.10): shadow, replay, and synthetic testers, plus
//! the selection policy the autonomous loop's "Test" step uses to pick
//! among them for a given tool.

pub mod replay;
pub mod shadow;
pub mod strategy;
pub mod synthetic;

pub use replay::{ReplayCase, ReplayResult, ReplayTester};
pub use shadow::{ShadowTestResult, ShadowTester};
pub use strategy::{select_strategy, TestStrategy};
pub use synthetic::{SyntheticCase, SyntheticResult, SyntheticTester};
