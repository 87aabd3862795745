//! MachineHealthCheck scenarios
//!
//! A scenario stops the kubelet on a ready worker and expects the health
//! check controller to delete the backing Machine, then waits for the worker
//! pool to heal back to its original size.

mod runner;
mod types;

pub use runner::{ScenarioRunner, Target};
pub use types::{ScenarioKind, ScenarioOutcome, ScenarioReport};
