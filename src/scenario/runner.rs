//! MachineHealthCheck scenario runner
//!
//! One run walks the fixed sequence: setup, optional unhealthy-conditions
//! override, kubelet stop, two eventual assertions, teardown. Teardown runs
//! whatever happened before it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use super::types::{ScenarioKind, ScenarioOutcome, ScenarioReport};
use crate::chaos::KubeletKiller;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::k8s::resources::{machine_health_check, unhealthy_conditions_config_map};
use crate::k8s::{
    count_ready, is_ready, ready_status, ClusterApi, ConditionStatus, UnhealthyCondition,
    UnhealthyConditions, NODE_READY,
};
use crate::poll::{eventually, PollSpec};
use crate::provider::is_kubemark_provider;

const KUBEMARK_SKIP_REASON: &str = "Can not run this tests with the 'KubeMark' provider";

/// Worker node and Machine chosen for fault injection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub node: String,
    pub machine: String,
    pub machine_labels: BTreeMap<String, String>,
}

/// State discovered or created during one run
#[derive(Debug, Default)]
struct RunState {
    ready_workers: Option<usize>,
    target: Option<Target>,
    health_check_created: bool,
}

enum SetupResult {
    Ready,
    Skipped(String),
}

/// Drives MachineHealthCheck scenarios against a [`ClusterApi`]
pub struct ScenarioRunner<C: ClusterApi + ?Sized> {
    cluster: Arc<C>,
    config: Config,
    killer: KubeletKiller,
}

impl<C: ClusterApi + ?Sized> ScenarioRunner<C> {
    pub fn new(cluster: Arc<C>, config: Config) -> Self {
        let killer = KubeletKiller::from_config(&config);
        Self {
            cluster,
            config,
            killer,
        }
    }

    /// Run one scenario end to end and report what happened
    #[instrument(skip_all, fields(kind = %kind))]
    pub async fn run(&self, kind: ScenarioKind) -> ScenarioReport {
        let started_at = Utc::now();
        let mut state = RunState::default();

        let outcome = match self.setup(&mut state).await {
            Ok(SetupResult::Skipped(reason)) => {
                info!(%reason, "Scenario skipped");
                ScenarioOutcome::Skipped { reason }
            }
            Ok(SetupResult::Ready) => match self.body(kind, &state).await {
                Ok(()) => ScenarioOutcome::Passed,
                Err(e) => {
                    error!(error = %e, "Scenario failed");
                    ScenarioOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            },
            Err(e) => {
                error!(error = %e, "Scenario setup failed");
                ScenarioOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };

        let teardown_errors: Vec<String> = self
            .teardown(&state)
            .await
            .into_iter()
            .map(|e| e.to_string())
            .collect();

        let outcome = match (outcome, teardown_errors.first()) {
            (ScenarioOutcome::Passed, Some(first)) => ScenarioOutcome::Failed {
                error: format!("teardown: {}", first),
            },
            (outcome, _) => outcome,
        };

        metrics::increment_counter!(
            "mhc_e2e_scenarios_total",
            "kind" => kind.to_string(),
            "outcome" => outcome.label()
        );

        let finished_at = Utc::now();
        let target = state.target;
        ScenarioReport {
            kind,
            outcome,
            node: target.as_ref().map(|t| t.node.clone()),
            machine: target.map(|t| t.machine),
            ready_workers: state.ready_workers,
            teardown_errors,
            started_at,
            finished_at,
            duration_ms: (finished_at - started_at).num_milliseconds(),
        }
    }

    async fn setup(&self, state: &mut RunState) -> AppResult<SetupResult> {
        if is_kubemark_provider(self.cluster.as_ref()).await? {
            warn!("{}", KUBEMARK_SKIP_REASON);
            return Ok(SetupResult::Skipped(KUBEMARK_SKIP_REASON.to_string()));
        }

        let (ready, node) = self.discover_worker().await?;
        state.ready_workers = Some(ready);

        let node = node.ok_or_else(|| AppError::setup("no ready worker node found"))?;
        info!(node = %node, ready_workers = ready, "Worker node");

        let target = self.discover_machine(&node).await?;
        info!(machine = %target.machine, "Worker machine");

        let labels = target.machine_labels.clone();
        state.target = Some(target);
        self.create_machine_health_check(labels).await?;
        state.health_check_created = true;

        Ok(SetupResult::Ready)
    }

    /// Count ready workers and pick the first ready one
    async fn discover_worker(&self) -> AppResult<(usize, Option<String>)> {
        let workers = self
            .cluster
            .list_nodes(&self.config.worker_selector())
            .await?;

        let ready = count_ready(&workers);
        let first = workers
            .iter()
            .find(|w| is_ready(w))
            .and_then(|w| w.metadata.name.clone());

        Ok((ready, first))
    }

    /// Find the Machine whose node reference points at `node`
    async fn discover_machine(&self, node: &str) -> AppResult<Target> {
        let machines = self.cluster.list_machines().await?;

        // The last match wins when several Machines claim the node
        let machine = machines
            .into_iter()
            .filter(|m| m.node_name() == Some(node))
            .last()
            .ok_or_else(|| AppError::setup(format!("no machine references node {}", node)))?;

        let machine_labels = machine.labels();
        Ok(Target {
            node: node.to_string(),
            machine: machine.metadata.name.unwrap_or_default(),
            machine_labels,
        })
    }

    /// Scenario body with the optional unhealthy-conditions scope around it
    async fn body(&self, kind: ScenarioKind, state: &RunState) -> AppResult<()> {
        let target = state
            .target
            .as_ref()
            .ok_or_else(|| AppError::setup("no target selected"))?;
        let timeout = kind.machine_deletion_timeout(&self.config);

        if !kind.uses_custom_conditions() {
            return self
                .stop_kubelet_and_validate_machine_deletion(target, timeout)
                .await;
        }

        let created = self.create_unhealthy_conditions().await;
        let created_ok = created.is_ok();
        let result = match created {
            Ok(()) => {
                self.stop_kubelet_and_validate_machine_deletion(target, timeout)
                    .await
            }
            Err(e) => Err(e),
        };

        // Also clears a configmap left over from an earlier run
        info!("Delete node-unhealthy-conditions configmap");
        let cleanup = match self.delete_unhealthy_conditions().await {
            Err(e) if !created_ok && e.is_not_found() => Ok(()),
            other => other,
        };

        // The body error wins; the cleanup error surfaces when the body passed
        result.and(cleanup)
    }

    /// Create the health check selecting Machines by `labels`
    pub async fn create_machine_health_check(
        &self,
        labels: BTreeMap<String, String>,
    ) -> AppResult<()> {
        info!(labels = ?labels, "Create machine health check with label selector");
        let mhc = machine_health_check(
            &self.config.health_check_name,
            &self.config.namespace,
            labels,
        );
        self.cluster.create_machine_health_check(&mhc).await
    }

    /// Create the override marking a node unhealthy after `Ready=Unknown`
    /// for the configured timeout
    pub async fn create_unhealthy_conditions(&self) -> AppResult<()> {
        let conditions = UnhealthyConditions {
            items: vec![UnhealthyCondition::new(
                NODE_READY,
                ConditionStatus::Unknown.as_ref(),
                &self.config.custom_unhealthy_timeout,
            )],
        };
        info!("Create node-unhealthy-conditions configmap");
        let cm = unhealthy_conditions_config_map(
            &self.config.unhealthy_conditions_name,
            &self.config.namespace,
            &conditions,
        )?;
        self.cluster.create_config_map(&cm).await
    }

    pub async fn delete_unhealthy_conditions(&self) -> AppResult<()> {
        self.cluster
            .delete_config_map(&self.config.unhealthy_conditions_name)
            .await
    }

    /// Stop the kubelet on the target node, then wait for the node to go
    /// `Ready=Unknown` and for its Machine to disappear within `timeout`
    pub async fn stop_kubelet_and_validate_machine_deletion(
        &self,
        target: &Target,
        timeout: Duration,
    ) -> AppResult<()> {
        info!(step = "stop-kubelet", node = %target.node, "Stopping kubelet service on the node");
        self.killer
            .stop_kubelet(self.cluster.as_ref(), &target.node)
            .await?;

        info!(step = "node-unhealthy", node = %target.node, "Validating that node has 'NotReady' condition");
        self.wait_for_node_unhealthy(&target.node).await?;

        info!(step = "machine-deleted", machine = %target.machine, "Validating that machine is deleted");
        self.wait_for_machine_deletion(&target.machine, timeout)
            .await
    }

    /// Wait until `node` reports `Ready=Unknown`; lookup errors count as not yet
    pub async fn wait_for_node_unhealthy(&self, node: &str) -> AppResult<()> {
        info!(node, "Wait until node will have 'Ready' condition with the status Unknown");
        let spec = PollSpec::new(self.config.node_poll_interval(), self.config.wait_long());
        let cluster = self.cluster.as_ref();

        eventually(&format!("node {} Ready=Unknown", node), spec, || async move {
            match cluster.get_node(node).await {
                Ok(n) => {
                    let status = ready_status(&n);
                    debug!(node, status = ?status, "Node 'Ready' condition");
                    status == Some(ConditionStatus::Unknown)
                }
                Err(e) => {
                    debug!(node, error = %e, "Node lookup failed");
                    false
                }
            }
        })
        .await
    }

    /// Wait until the Machine lookup reports not-found
    pub async fn wait_for_machine_deletion(
        &self,
        machine: &str,
        timeout: Duration,
    ) -> AppResult<()> {
        let spec = PollSpec::new(self.config.machine_poll_interval(), timeout);
        let cluster = self.cluster.as_ref();

        eventually(&format!("machine {} deleted", machine), spec, || async move {
            match cluster.get_machine(machine).await {
                Err(e) => e.is_not_found(),
                Ok(_) => false,
            }
        })
        .await
    }

    /// Wait until the worker pool has exactly `expected` ready nodes
    pub async fn wait_for_workers_ready(&self, expected: usize) -> AppResult<()> {
        info!(expected, "Wait until the environment will have ready workers");
        let spec = PollSpec::new(
            self.config.node_poll_interval(),
            self.config.workers_ready_timeout(),
        );
        let cluster = self.cluster.as_ref();
        let selector = self.config.worker_selector();
        let selector = selector.as_str();

        eventually(&format!("{} ready workers", expected), spec, || async move {
            match cluster.list_nodes(selector).await {
                Ok(workers) => {
                    let ready = count_ready(&workers);
                    debug!(ready, "Number of ready workers");
                    ready == expected
                }
                Err(e) => {
                    debug!(error = %e, "Worker listing failed");
                    false
                }
            }
        })
        .await
    }

    /// Get-then-delete the health check by name
    pub async fn delete_machine_health_check(&self) -> AppResult<()> {
        let name = &self.config.health_check_name;
        let mhc = self.cluster.get_machine_health_check(name).await?;
        let name = mhc.metadata.name.as_deref().unwrap_or(name.as_str());
        info!(name, "Delete machine health check");
        self.cluster.delete_machine_health_check(name).await
    }

    /// Restore the cluster; every step runs even when an earlier one failed
    async fn teardown(&self, state: &RunState) -> Vec<AppError> {
        let mut errors = Vec::new();

        match is_kubemark_provider(self.cluster.as_ref()).await {
            Ok(true) => {
                warn!("{}", KUBEMARK_SKIP_REASON);
                return errors;
            }
            Ok(false) => {}
            Err(e) => errors.push(e),
        }

        if let Some(expected) = state.ready_workers {
            if let Err(e) = self.wait_for_workers_ready(expected).await {
                errors.push(e);
            }
        }

        // Also removes a health check left over from an earlier run
        if state.target.is_some() {
            match self.delete_machine_health_check().await {
                Err(e) if !state.health_check_created && e.is_not_found() => {}
                Err(e) => errors.push(e),
                Ok(()) => {}
            }
        }

        match self.killer.cleanup(self.cluster.as_ref()).await {
            Ok(n) => debug!(deleted = n, "Kubelet killer pods removed"),
            Err(e) => errors.push(e),
        }

        for e in &errors {
            error!(error = %e, "Teardown step failed");
        }
        errors
    }
}
