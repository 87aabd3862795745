//! Scenario kinds and run reports

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::config::Config;

/// Which health-check configuration a scenario exercises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString, EnumIter, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScenarioKind {
    /// Controller defaults, no unhealthy-conditions override
    Default,
    /// `Ready=Unknown` for 60s marks a node unhealthy
    #[strum(to_string = "custom", serialize = "custom_conditions")]
    #[serde(rename = "custom")]
    CustomConditions,
}

impl ScenarioKind {
    /// Budget for the Machine to disappear once the node is unhealthy
    pub fn machine_deletion_timeout(&self, config: &Config) -> Duration {
        match self {
            ScenarioKind::Default => Duration::from_secs(config.default_scenario_timeout_secs),
            ScenarioKind::CustomConditions => {
                Duration::from_secs(config.custom_scenario_timeout_secs)
            }
        }
    }

    pub fn uses_custom_conditions(&self) -> bool {
        matches!(self, ScenarioKind::CustomConditions)
    }
}

/// Final verdict of one scenario run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ScenarioOutcome {
    Passed,
    Skipped { reason: String },
    Failed { error: String },
}

impl ScenarioOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ScenarioOutcome::Passed => "passed",
            ScenarioOutcome::Skipped { .. } => "skipped",
            ScenarioOutcome::Failed { .. } => "failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ScenarioOutcome::Failed { .. })
    }
}

/// Everything observed during one run
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub kind: ScenarioKind,
    pub outcome: ScenarioOutcome,
    pub node: Option<String>,
    pub machine: Option<String>,
    pub ready_workers: Option<usize>,
    /// Teardown failures, reported even when the body already failed
    pub teardown_errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
}
