//! Control-plane client used by the scenario runner

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Node, Pod};
use kube::{
    api::{Api, DeleteParams, ListParams, PostParams},
    config::KubeConfigOptions,
    Client, Config,
};
use tracing::{info, instrument};

#[cfg(test)]
use mockall::automock;

use super::resources::{Machine, MachineHealthCheck};
use crate::error::{from_kube, AppResult};

/// Typed verbs the scenario needs from the control plane.
///
/// Lookups of absent objects fail with [`crate::AppError::NotFound`].
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// List nodes matching a label selector
    async fn list_nodes(&self, label_selector: &str) -> AppResult<Vec<Node>>;

    async fn get_node(&self, name: &str) -> AppResult<Node>;

    async fn list_machines(&self) -> AppResult<Vec<Machine>>;

    async fn get_machine(&self, name: &str) -> AppResult<Machine>;

    async fn create_machine_health_check(&self, mhc: &MachineHealthCheck) -> AppResult<()>;

    async fn get_machine_health_check(&self, name: &str) -> AppResult<MachineHealthCheck>;

    async fn delete_machine_health_check(&self, name: &str) -> AppResult<()>;

    async fn create_config_map(&self, config_map: &ConfigMap) -> AppResult<()>;

    async fn delete_config_map(&self, name: &str) -> AppResult<()>;

    async fn create_pod(&self, pod: &Pod) -> AppResult<()>;

    async fn list_pods(&self, label_selector: &str) -> AppResult<Vec<Pod>>;

    async fn delete_pod(&self, name: &str) -> AppResult<()>;

    async fn get_deployment(&self, name: &str) -> AppResult<Deployment>;
}

/// [`ClusterApi`] backed by a real API server
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    namespace: String,
}

impl KubeCluster {
    /// Connect using `kubeconfig` when given, otherwise the inferred config
    /// (KUBECONFIG, ~/.kube/config or in-cluster).
    #[instrument(skip_all)]
    pub async fn connect(kubeconfig: Option<&str>, namespace: &str) -> AppResult<Self> {
        let config = match kubeconfig {
            Some(path) => {
                let kc = kube::config::Kubeconfig::read_from(path)
                    .map_err(|e| crate::AppError::Config(e.to_string()))?;
                Config::from_custom_kubeconfig(kc, &KubeConfigOptions::default())
                    .await
                    .map_err(|e| crate::AppError::Config(e.to_string()))?
            }
            None => Config::infer()
                .await
                .map_err(|e| crate::AppError::Config(e.to_string()))?,
        };
        let client = Client::try_from(config)?;

        info!(namespace, "Connected to Kubernetes cluster");

        Ok(Self::with_client(client, namespace))
    }

    pub fn with_client(client: Client, namespace: &str) -> Self {
        Self {
            client,
            namespace: namespace.to_string(),
        }
    }

    fn nodes(&self) -> Api<Node> {
        Api::all(self.client.clone())
    }

    fn machines(&self) -> Api<Machine> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn health_checks(&self) -> Api<MachineHealthCheck> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn config_maps(&self) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn pods(&self) -> Api<Pod> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn deployments(&self) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn list_nodes(&self, label_selector: &str) -> AppResult<Vec<Node>> {
        let list = self
            .nodes()
            .list(&ListParams::default().labels(label_selector))
            .await?;
        Ok(list.items)
    }

    async fn get_node(&self, name: &str) -> AppResult<Node> {
        self.nodes()
            .get(name)
            .await
            .map_err(|e| from_kube(e, || format!("node {}", name)))
    }

    async fn list_machines(&self) -> AppResult<Vec<Machine>> {
        let list = self.machines().list(&ListParams::default()).await?;
        Ok(list.items)
    }

    async fn get_machine(&self, name: &str) -> AppResult<Machine> {
        self.machines()
            .get(name)
            .await
            .map_err(|e| from_kube(e, || format!("machine {}/{}", self.namespace, name)))
    }

    #[instrument(skip(self, mhc), fields(name = %mhc.metadata.name.as_deref().unwrap_or("unknown")))]
    async fn create_machine_health_check(&self, mhc: &MachineHealthCheck) -> AppResult<()> {
        self.health_checks()
            .create(&PostParams::default(), mhc)
            .await?;
        info!("Created machine health check");
        Ok(())
    }

    async fn get_machine_health_check(&self, name: &str) -> AppResult<MachineHealthCheck> {
        self.health_checks()
            .get(name)
            .await
            .map_err(|e| from_kube(e, || format!("machine health check {}", name)))
    }

    #[instrument(skip(self))]
    async fn delete_machine_health_check(&self, name: &str) -> AppResult<()> {
        self.health_checks()
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| from_kube(e, || format!("machine health check {}", name)))?;
        info!(name, "Deleted machine health check");
        Ok(())
    }

    #[instrument(skip(self, config_map), fields(name = %config_map.metadata.name.as_deref().unwrap_or("unknown")))]
    async fn create_config_map(&self, config_map: &ConfigMap) -> AppResult<()> {
        self.config_maps()
            .create(&PostParams::default(), config_map)
            .await?;
        info!("Created config map");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_config_map(&self, name: &str) -> AppResult<()> {
        self.config_maps()
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| from_kube(e, || format!("config map {}", name)))?;
        info!(name, "Deleted config map");
        Ok(())
    }

    #[instrument(skip(self, pod), fields(pod_name = %pod.metadata.name.as_deref().unwrap_or("unknown")))]
    async fn create_pod(&self, pod: &Pod) -> AppResult<()> {
        self.pods().create(&PostParams::default(), pod).await?;
        info!("Created pod");
        Ok(())
    }

    async fn list_pods(&self, label_selector: &str) -> AppResult<Vec<Pod>> {
        let list = self
            .pods()
            .list(&ListParams::default().labels(label_selector))
            .await?;
        Ok(list.items)
    }

    #[instrument(skip(self))]
    async fn delete_pod(&self, name: &str) -> AppResult<()> {
        self.pods()
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| from_kube(e, || format!("pod {}", name)))?;
        info!(name, "Deleted pod");
        Ok(())
    }

    async fn get_deployment(&self, name: &str) -> AppResult<Deployment> {
        self.deployments()
            .get(name)
            .await
            .map_err(|e| from_kube(e, || format!("deployment {}/{}", self.namespace, name)))
    }
}
