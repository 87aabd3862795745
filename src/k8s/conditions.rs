//! Node condition helpers and the unhealthy-conditions document

use k8s_openapi::api::core::v1::{Node, NodeCondition};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// The standard node health signal
pub const NODE_READY: &str = "Ready";

/// Tri-state status carried by node conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// Return the condition of type `condition_type` reported by `node`
pub fn node_condition<'a>(node: &'a Node, condition_type: &str) -> Option<&'a NodeCondition> {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conds| conds.iter().find(|c| c.type_ == condition_type))
}

/// Status of the `Ready` condition; `None` when the node reports none
/// or an unrecognised value.
pub fn ready_status(node: &Node) -> Option<ConditionStatus> {
    node_condition(node, NODE_READY).and_then(|c| c.status.parse().ok())
}

pub fn is_ready(node: &Node) -> bool {
    ready_status(node) == Some(ConditionStatus::True)
}

pub fn count_ready(nodes: &[Node]) -> usize {
    nodes.iter().filter(|n| is_ready(n)).count()
}

/// One override entry: a node is unhealthy once `name` has had `status`
/// for longer than `timeout`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnhealthyCondition {
    pub name: String,
    pub status: String,
    pub timeout: String,
}

impl UnhealthyCondition {
    pub fn new(name: &str, status: &str, timeout: &str) -> Self {
        Self {
            name: name.to_string(),
            status: status.to_string(),
            timeout: timeout.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnhealthyConditions {
    pub items: Vec<UnhealthyCondition>,
}
