use std::time::Duration;

use serde::Deserialize;

use crate::error::AppResult;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_kubeconfig")]
    pub kubeconfig: Option<String>,

    /// Namespace holding Machines, the health check and the fault pods
    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default = "default_worker_label")]
    pub worker_label: String,

    #[serde(default = "default_health_check_name")]
    pub health_check_name: String,

    #[serde(default = "default_unhealthy_conditions_name")]
    pub unhealthy_conditions_name: String,

    #[serde(default = "default_kubelet_killer_label")]
    pub kubelet_killer_label: String,

    #[serde(default = "default_kubelet_killer_image")]
    pub kubelet_killer_image: String,

    #[serde(default = "default_wait_long_secs")]
    pub wait_long_secs: u64,

    #[serde(default = "default_workers_ready_timeout_secs")]
    pub workers_ready_timeout_secs: u64,

    #[serde(default = "default_node_poll_interval_secs")]
    pub node_poll_interval_secs: u64,

    #[serde(default = "default_machine_poll_interval_secs")]
    pub machine_poll_interval_secs: u64,

    #[serde(default = "default_default_scenario_timeout_secs")]
    pub default_scenario_timeout_secs: u64,

    #[serde(default = "default_custom_scenario_timeout_secs")]
    pub custom_scenario_timeout_secs: u64,

    /// Timeout written into the custom unhealthy-conditions entry
    #[serde(default = "default_custom_unhealthy_timeout")]
    pub custom_unhealthy_timeout: String,
}

fn default_kubeconfig() -> Option<String> {
    None
}

fn default_namespace() -> String {
    "openshift-machine-api".to_string()
}

fn default_worker_label() -> String {
    "node-role.kubernetes.io/worker".to_string()
}

fn default_health_check_name() -> String {
    "workers-check".to_string()
}

fn default_unhealthy_conditions_name() -> String {
    "node-unhealthy-conditions".to_string()
}

fn default_kubelet_killer_label() -> String {
    "kubelet-killer".to_string()
}

fn default_kubelet_killer_image() -> String {
    "busybox".to_string()
}

fn default_wait_long_secs() -> u64 {
    15 * 60
}

fn default_workers_ready_timeout_secs() -> u64 {
    15 * 60
}

fn default_node_poll_interval_secs() -> u64 {
    10
}

fn default_machine_poll_interval_secs() -> u64 {
    5
}

fn default_default_scenario_timeout_secs() -> u64 {
    6 * 60
}

fn default_custom_scenario_timeout_secs() -> u64 {
    2 * 60
}

fn default_custom_unhealthy_timeout() -> String {
    "60s".to_string()
}

impl Config {
    /// Load settings from `MHC_E2E_*` environment variables
    pub fn load() -> AppResult<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("MHC_E2E"))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Label selector matching every worker node (`<label>=`)
    pub fn worker_selector(&self) -> String {
        format!("{}=", self.worker_label)
    }

    /// Label selector matching every fault pod (`<label>=`)
    pub fn kubelet_killer_selector(&self) -> String {
        format!("{}=", self.kubelet_killer_label)
    }

    pub fn wait_long(&self) -> Duration {
        Duration::from_secs(self.wait_long_secs)
    }

    pub fn workers_ready_timeout(&self) -> Duration {
        Duration::from_secs(self.workers_ready_timeout_secs)
    }

    pub fn node_poll_interval(&self) -> Duration {
        Duration::from_secs(self.node_poll_interval_secs)
    }

    pub fn machine_poll_interval(&self) -> Duration {
        Duration::from_secs(self.machine_poll_interval_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kubeconfig: default_kubeconfig(),
            namespace: default_namespace(),
            worker_label: default_worker_label(),
            health_check_name: default_health_check_name(),
            unhealthy_conditions_name: default_unhealthy_conditions_name(),
            kubelet_killer_label: default_kubelet_killer_label(),
            kubelet_killer_image: default_kubelet_killer_image(),
            wait_long_secs: default_wait_long_secs(),
            workers_ready_timeout_secs: default_workers_ready_timeout_secs(),
            node_poll_interval_secs: default_node_poll_interval_secs(),
            machine_poll_interval_secs: default_machine_poll_interval_secs(),
            default_scenario_timeout_secs: default_default_scenario_timeout_secs(),
            custom_scenario_timeout_secs: default_custom_scenario_timeout_secs(),
            custom_unhealthy_timeout: default_custom_unhealthy_timeout(),
        }
    }
}
