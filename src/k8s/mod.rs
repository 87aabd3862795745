//! Kubernetes integration
//!
//! - `client`: the [`ClusterApi`] seam and its kube-rs implementation
//! - `resources`: Machine API custom resources and manifest builders
//! - `conditions`: node condition accessors and the unhealthy-conditions document

mod client;
pub mod conditions;
pub mod resources;

#[cfg(test)]
pub use client::MockClusterApi;
pub use client::{ClusterApi, KubeCluster};
pub use conditions::{
    count_ready, is_ready, node_condition, ready_status, ConditionStatus, UnhealthyCondition,
    UnhealthyConditions, NODE_READY,
};
pub use resources::{Machine, MachineHealthCheck, MachineHealthCheckSpec, MachineSpec, MachineStatus};
