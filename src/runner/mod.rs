//! Scenario execution and run orchestration.

pub mod harness;
pub mod interrupt;
pub mod scenario;

#[cfg(test)]
pub(crate) mod testing;

pub use harness::{discover_scenarios, Harness, Summary};
pub use scenario::{Executor, Scenario, Step};
