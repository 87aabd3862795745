//! MachineHealthCheck end-to-end scenario runner
//!
//! Exercises the MachineHealthCheck controller of a live cluster by stopping
//! the kubelet on a worker and observing the controller remediate its Machine.

pub mod chaos;
pub mod config;
pub mod error;
pub mod k8s;
pub mod poll;
pub mod provider;
pub mod scenario;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use scenario::{ScenarioKind, ScenarioOutcome, ScenarioReport, ScenarioRunner};
