//! In-memory cluster for driving scenarios without an API server
//!
//! The fake plays the controller under test on tokio's clock: once a kubelet
//! killer pod lands on a node, the node turns `Ready=Unknown`, the health
//! check deletes its Machine and a replacement node joins later. Run tests
//! with `start_paused = true` so those minutes pass instantly.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, Container, Node, NodeCondition, NodeStatus, ObjectReference, Pod, PodSpec,
    PodTemplateSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::error::ErrorResponse;
use tokio::time::Instant;

use mhc_e2e::k8s::{ClusterApi, Machine, MachineHealthCheck, MachineSpec, MachineStatus};
use mhc_e2e::{AppError, AppResult};

/// How the simulated control plane reacts to a stopped kubelet
#[derive(Clone, Debug)]
pub struct Behavior {
    pub kubemark: bool,
    pub reject_fault_pods: bool,
    /// Delay between the kubelet stop and `Ready=Unknown`; `None` never
    pub node_unknown_after: Option<Duration>,
    /// Remediation delay with controller defaults
    pub remediation_after: Duration,
    /// Remediation delay while the unhealthy-conditions override exists
    pub remediation_after_custom: Duration,
    /// Delay between Machine deletion and a ready replacement; `None` never
    pub replacement_ready_after: Option<Duration>,
    /// Node reads answer with a server error
    pub node_lookup_fails: bool,
    /// Machine reads answer with a server error
    pub machine_lookup_fails: bool,
    /// Someone else removes the health check once remediation happened
    pub health_check_removed_after_remediation: bool,
    /// Successful reads of the controllers deployment before it starts
    /// failing; `None` never fails
    pub controllers_lookup_fails_after: Option<usize>,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            kubemark: false,
            reject_fault_pods: false,
            node_unknown_after: Some(Duration::from_secs(40)),
            remediation_after: Duration::from_secs(300),
            remediation_after_custom: Duration::from_secs(60),
            replacement_ready_after: Some(Duration::from_secs(240)),
            node_lookup_fails: false,
            machine_lookup_fails: false,
            health_check_removed_after_remediation: false,
            controllers_lookup_fails_after: None,
        }
    }
}

#[derive(Default)]
struct Inner {
    /// (name, Ready status)
    nodes: Vec<(String, String)>,
    machines: Vec<Machine>,
    health_checks: BTreeMap<String, MachineHealthCheck>,
    config_maps: BTreeMap<String, ConfigMap>,
    pods: BTreeMap<String, Pod>,
    stopped: Option<(String, Instant)>,
    unknown_at: Option<Instant>,
    deleted: Option<(String, Instant)>,
    replaced: bool,
    controllers_lookups: usize,
    history: Vec<String>,
}

pub struct FakeCluster {
    behavior: Behavior,
    inner: Mutex<Inner>,
}

impl FakeCluster {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Four workers, `worker-1` not ready: three ready workers and
    /// `worker-2` is the first ready one.
    pub fn standard(behavior: Behavior) -> Self {
        let cluster = Self::new(behavior);
        cluster.add_worker("worker-1", "False");
        cluster.add_worker("worker-2", "True");
        cluster.add_worker("worker-3", "True");
        cluster.add_worker("worker-4", "True");
        cluster.add_machine("spare-machine", None);
        cluster
    }

    pub fn add_worker(&self, name: &str, ready: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.nodes.push((name.to_string(), ready.to_string()));
        inner.machines.push(machine(&format!("{}-machine", name), Some(name)));
    }

    pub fn add_node_without_machine(&self, name: &str, ready: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.nodes.push((name.to_string(), ready.to_string()));
    }

    pub fn add_machine(&self, name: &str, node: Option<&str>) {
        self.inner.lock().unwrap().machines.push(machine(name, node));
    }

    /// Objects a crashed earlier run left behind
    pub fn seed_health_check(&self, name: &str) {
        let mhc = MachineHealthCheck::new(name, Default::default());
        self.inner
            .lock()
            .unwrap()
            .health_checks
            .insert(name.to_string(), mhc);
    }

    pub fn seed_config_map(&self, name: &str) {
        let cm = ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        self.inner
            .lock()
            .unwrap()
            .config_maps
            .insert(name.to_string(), cm);
    }

    pub fn history(&self) -> Vec<String> {
        self.inner.lock().unwrap().history.clone()
    }

    pub fn health_check_names(&self) -> Vec<String> {
        self.inner.lock().unwrap().health_checks.keys().cloned().collect()
    }

    pub fn config_map_names(&self) -> Vec<String> {
        self.inner.lock().unwrap().config_maps.keys().cloned().collect()
    }

    pub fn pod_names(&self) -> Vec<String> {
        self.inner.lock().unwrap().pods.keys().cloned().collect()
    }

    pub fn machine_names(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .machines
            .iter()
            .filter_map(|m| m.metadata.name.clone())
            .collect()
    }

    /// When the simulated controller deleted the Machine, relative to the
    /// kubelet stop
    pub fn remediated_after_stop(&self) -> Option<Duration> {
        let inner = self.inner.lock().unwrap();
        match (&inner.stopped, &inner.deleted) {
            (Some((_, stopped)), Some((_, deleted))) => Some(*deleted - *stopped),
            _ => None,
        }
    }

    pub fn ready_count(&self) -> usize {
        let mut inner = self.inner.lock().unwrap();
        self.advance(&mut inner);
        inner.nodes.iter().filter(|(_, s)| s == "True").count()
    }

    /// Replay the controller timeline up to now
    fn advance(&self, inner: &mut Inner) {
        let now = Instant::now();
        let Some((node, stopped)) = inner.stopped.clone() else {
            return;
        };

        if inner.unknown_at.is_none() {
            if let Some(after) = self.behavior.node_unknown_after {
                if now >= stopped + after {
                    inner.unknown_at = Some(stopped + after);
                    if let Some(entry) = inner.nodes.iter_mut().find(|(n, _)| *n == node) {
                        entry.1 = "Unknown".to_string();
                    }
                }
            }
        }

        if let Some(unknown_at) = inner.unknown_at {
            if inner.deleted.is_none() && !inner.health_checks.is_empty() {
                let delay = if inner.config_maps.is_empty() {
                    self.behavior.remediation_after
                } else {
                    self.behavior.remediation_after_custom
                };
                if now >= unknown_at + delay {
                    let at = unknown_at + delay;
                    let gone: Vec<String> = inner
                        .machines
                        .iter()
                        .filter(|m| m.node_name() == Some(node.as_str()))
                        .filter_map(|m| m.metadata.name.clone())
                        .collect();
                    inner
                        .machines
                        .retain(|m| m.node_name() != Some(node.as_str()));
                    inner.nodes.retain(|(n, _)| *n != node);
                    for name in gone {
                        inner.history.push(format!("controller deleted machine {}", name));
                    }
                    if self.behavior.health_check_removed_after_remediation {
                        inner.health_checks.clear();
                    }
                    inner.deleted = Some((node.clone(), at));
                }
            }
        }

        if let (Some((node, deleted_at)), false) = (inner.deleted.clone(), inner.replaced) {
            if let Some(after) = self.behavior.replacement_ready_after {
                if now >= deleted_at + after {
                    let replacement = format!("{}-replacement", node);
                    inner.nodes.push((replacement.clone(), "True".to_string()));
                    inner
                        .machines
                        .push(machine(&format!("{}-machine", replacement), Some(&replacement)));
                    inner.replaced = true;
                }
            }
        }
    }
}

fn machine(name: &str, node: Option<&str>) -> Machine {
    let mut m = Machine::new(name, MachineSpec::default());
    m.metadata.namespace = Some("openshift-machine-api".to_string());
    m.metadata.labels = Some(
        [
            (
                "machine.openshift.io/cluster-api-machine-role".to_string(),
                "worker".to_string(),
            ),
            ("machine.openshift.io/name".to_string(), name.to_string()),
        ]
        .into_iter()
        .collect(),
    );
    m.status = Some(MachineStatus {
        node_ref: node.map(|n| ObjectReference {
            kind: Some("Node".to_string()),
            name: Some(n.to_string()),
            ..Default::default()
        }),
        phase: Some("Running".to_string()),
    });
    m
}

fn node(name: &str, ready: &str) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(
                [("node-role.kubernetes.io/worker".to_string(), String::new())]
                    .into_iter()
                    .collect(),
            ),
            ..Default::default()
        },
        status: Some(NodeStatus {
            conditions: Some(vec![NodeCondition {
                type_: "Ready".to_string(),
                status: ready.to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn api_error(code: u16, reason: &str, message: String) -> AppError {
    AppError::Kube(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message,
        reason: reason.to_string(),
        code,
    }))
}

fn already_exists(what: &str, name: &str) -> AppError {
    api_error(409, "AlreadyExists", format!("{} \"{}\" already exists", what, name))
}

fn server_error(what: &str) -> AppError {
    api_error(500, "InternalError", format!("etcdserver: request timed out reading {}", what))
}

fn controllers(image: &str) -> Deployment {
    Deployment {
        metadata: ObjectMeta {
            name: Some("machine-api-controllers".to_string()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            template: PodTemplateSpec {
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: "controller-manager".to_string(),
                        image: Some(image.to_string()),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn list_nodes(&self, label_selector: &str) -> AppResult<Vec<Node>> {
        assert_eq!(label_selector, "node-role.kubernetes.io/worker=");
        let mut inner = self.inner.lock().unwrap();
        self.advance(&mut inner);
        Ok(inner.nodes.iter().map(|(n, s)| node(n, s)).collect())
    }

    async fn get_node(&self, name: &str) -> AppResult<Node> {
        let mut inner = self.inner.lock().unwrap();
        self.advance(&mut inner);
        if self.behavior.node_lookup_fails {
            return Err(server_error(&format!("node {}", name)));
        }
        inner
            .nodes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(n, s)| node(n, s))
            .ok_or_else(|| AppError::not_found(format!("node {}", name)))
    }

    async fn list_machines(&self) -> AppResult<Vec<Machine>> {
        let mut inner = self.inner.lock().unwrap();
        self.advance(&mut inner);
        Ok(inner.machines.clone())
    }

    async fn get_machine(&self, name: &str) -> AppResult<Machine> {
        let mut inner = self.inner.lock().unwrap();
        self.advance(&mut inner);
        if self.behavior.machine_lookup_fails {
            return Err(server_error(&format!("machine {}", name)));
        }
        inner
            .machines
            .iter()
            .find(|m| m.metadata.name.as_deref() == Some(name))
            .cloned()
            .ok_or_else(|| AppError::not_found(format!("machine {}", name)))
    }

    async fn create_machine_health_check(&self, mhc: &MachineHealthCheck) -> AppResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let name = mhc.metadata.name.clone().unwrap_or_default();
        if inner.health_checks.contains_key(&name) {
            return Err(already_exists("machinehealthchecks", &name));
        }
        inner.history.push(format!("create machinehealthcheck {}", name));
        inner.health_checks.insert(name, mhc.clone());
        Ok(())
    }

    async fn get_machine_health_check(&self, name: &str) -> AppResult<MachineHealthCheck> {
        let inner = self.inner.lock().unwrap();
        inner
            .health_checks
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::not_found(format!("machine health check {}", name)))
    }

    async fn delete_machine_health_check(&self, name: &str) -> AppResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .health_checks
            .remove(name)
            .ok_or_else(|| AppError::not_found(format!("machine health check {}", name)))?;
        inner.history.push(format!("delete machinehealthcheck {}", name));
        Ok(())
    }

    async fn create_config_map(&self, config_map: &ConfigMap) -> AppResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let name = config_map.metadata.name.clone().unwrap_or_default();
        if inner.config_maps.contains_key(&name) {
            return Err(already_exists("configmaps", &name));
        }
        inner.history.push(format!("create configmap {}", name));
        inner.config_maps.insert(name, config_map.clone());
        Ok(())
    }

    async fn delete_config_map(&self, name: &str) -> AppResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .config_maps
            .remove(name)
            .ok_or_else(|| AppError::not_found(format!("config map {}", name)))?;
        inner.history.push(format!("delete configmap {}", name));
        Ok(())
    }

    async fn create_pod(&self, pod: &Pod) -> AppResult<()> {
        if self.behavior.reject_fault_pods {
            return Err(AppError::setup("pods \"kubelet-killer\" is forbidden"));
        }
        let mut inner = self.inner.lock().unwrap();
        let name = pod.metadata.name.clone().unwrap_or_default();
        let node = pod
            .spec
            .as_ref()
            .and_then(|s| s.node_name.clone())
            .unwrap_or_default();
        inner.history.push(format!("create pod {} on {}", name, node));
        inner.pods.insert(name, pod.clone());
        if inner.stopped.is_none() {
            inner.stopped = Some((node, Instant::now()));
        }
        Ok(())
    }

    async fn list_pods(&self, label_selector: &str) -> AppResult<Vec<Pod>> {
        let label = label_selector.trim_end_matches('=');
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .pods
            .values()
            .filter(|p| {
                p.metadata
                    .labels
                    .as_ref()
                    .map(|l| l.contains_key(label))
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn delete_pod(&self, name: &str) -> AppResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .pods
            .remove(name)
            .ok_or_else(|| AppError::not_found(format!("pod {}", name)))?;
        inner.history.push(format!("delete pod {}", name));
        Ok(())
    }

    async fn get_deployment(&self, name: &str) -> AppResult<Deployment> {
        if name != "machine-api-controllers" {
            return Err(AppError::not_found(format!("deployment {}", name)));
        }
        {
            let mut inner = self.inner.lock().unwrap();
            inner.controllers_lookups += 1;
            if let Some(limit) = self.behavior.controllers_lookup_fails_after {
                if inner.controllers_lookups > limit {
                    return Err(server_error("deployment machine-api-controllers"));
                }
            }
        }
        if self.behavior.kubemark {
            Ok(controllers("quay.io/openshift/origin-kubemark-machine-controllers:v4.1"))
        } else {
            Ok(controllers("quay.io/openshift/origin-aws-machine-controllers:v4.1"))
        }
    }
}
