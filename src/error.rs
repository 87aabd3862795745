//! Error types for the scenario runner

use std::time::Duration;

use thiserror::Error;

/// Result alias used across the crate
pub type AppResult<T> = Result<T, AppError>;

/// Everything that can abort a scenario step
#[derive(Debug, Error)]
pub enum AppError {
    /// Transport or API error from the control plane
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// The requested object does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// A polled condition was not reached within its budget
    #[error("timed out after {after:?} waiting for {what}")]
    Timeout { what: String, after: Duration },

    /// Discovery or precondition failure before the fault is injected
    #[error("setup failed: {0}")]
    Setup(String),

    /// The fault injector could not stop the node agent
    #[error("fault injection failed: {0}")]
    FaultInjection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn timeout(what: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            what: what.into(),
            after,
        }
    }

    pub fn setup(msg: impl Into<String>) -> Self {
        Self::Setup(msg.into())
    }

    pub fn fault_injection(msg: impl Into<String>) -> Self {
        Self::FaultInjection(msg.into())
    }

    /// True for the distinguished "object is gone" outcome
    pub fn is_not_found(&self) -> bool {
        match self {
            AppError::NotFound(_) => true,
            AppError::Kube(kube::Error::Api(e)) => e.code == 404,
            _ => false,
        }
    }

    /// True when a polled assertion ran out of time
    pub fn is_timeout(&self) -> bool {
        matches!(self, AppError::Timeout { .. })
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

/// Map a kube error into `NotFound` when the API server answered 404
pub(crate) fn from_kube(err: kube::Error, what: impl FnOnce() -> String) -> AppError {
    match err {
        kube::Error::Api(ref e) if e.code == 404 => AppError::NotFound(what()),
        other => AppError::Kube(other),
    }
}
