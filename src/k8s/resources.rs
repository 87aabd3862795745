//! Machine API resource types and manifest builders
//!
//! Typed views of the `Machine` and `MachineHealthCheck` custom resources,
//! plus builders for every object the scenario creates.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    ConfigMap, Container, ObjectReference, Pod, PodSpec, SecurityContext, Toleration,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::CustomResource;
use serde::{Deserialize, Serialize};

use super::conditions::UnhealthyConditions;
use crate::error::AppResult;

/// Key inside the unhealthy-conditions ConfigMap holding the YAML document
pub const UNHEALTHY_CONDITIONS_KEY: &str = "conditions";

/// A provisioned compute instance, optionally backing a Node
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "machine.openshift.io",
    version = "v1beta1",
    kind = "Machine",
    namespaced,
    status = "MachineStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct MachineSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_spec: Option<ProviderSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
}

/// Opaque provider configuration embedded in a Machine
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct ProviderSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MachineStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_ref: Option<ObjectReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}

impl Machine {
    /// Name of the Node this Machine is bound to, if any
    pub fn node_name(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.node_ref.as_ref())
            .and_then(|r| r.name.as_deref())
    }

    pub fn labels(&self) -> BTreeMap<String, String> {
        self.metadata.labels.clone().unwrap_or_default()
    }
}

/// Remediation policy for Machines whose Node fails health conditions
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "healthchecking.openshift.io",
    version = "v1alpha1",
    kind = "MachineHealthCheck",
    namespaced,
    schema = "disabled"
)]
pub struct MachineHealthCheckSpec {
    pub selector: LabelSelector,
}

/// Build the health check selecting Machines carrying `labels`
pub fn machine_health_check(
    name: &str,
    namespace: &str,
    labels: BTreeMap<String, String>,
) -> MachineHealthCheck {
    let mut mhc = MachineHealthCheck::new(
        name,
        MachineHealthCheckSpec {
            selector: LabelSelector {
                match_labels: Some(labels),
                ..Default::default()
            },
        },
    );
    mhc.metadata.namespace = Some(namespace.to_string());
    mhc
}

/// Build the ConfigMap overriding the controller's unhealthy conditions
pub fn unhealthy_conditions_config_map(
    name: &str,
    namespace: &str,
    conditions: &UnhealthyConditions,
) -> AppResult<ConfigMap> {
    let document = serde_yaml::to_string(conditions)?;

    Ok(ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        data: Some(
            [(UNHEALTHY_CONDITIONS_KEY.to_string(), document)]
                .into_iter()
                .collect(),
        ),
        ..Default::default()
    })
}

/// Build a privileged pod that freezes the kubelet on `node_name`
pub fn kubelet_killer_pod(
    name: &str,
    namespace: &str,
    label: &str,
    image: &str,
    node_name: &str,
) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some([(label.to_string(), String::new())].into_iter().collect()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            node_name: Some(node_name.to_string()),
            host_pid: Some(true),
            restart_policy: Some("Never".to_string()),
            // Workers may carry NoSchedule/NoExecute taints
            tolerations: Some(vec![Toleration {
                operator: Some("Exists".to_string()),
                ..Default::default()
            }]),
            containers: vec![Container {
                name: label.to_string(),
                image: Some(image.to_string()),
                command: Some(vec![
                    "pkill".to_string(),
                    "-STOP".to_string(),
                    "kubelet".to_string(),
                ]),
                security_context: Some(SecurityContext {
                    privileged: Some(true),
                    ..Default::default()
                }),
                ..Default::default()
            }],
            ..Default::default()
        }),
        ..Default::default()
    }
}
