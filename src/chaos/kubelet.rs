//! Kubelet killer fault injector

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::k8s::resources::kubelet_killer_pod;
use crate::k8s::ClusterApi;

/// Creates and removes kubelet killer pods in the machine API namespace
#[derive(Clone, Debug)]
pub struct KubeletKiller {
    namespace: String,
    label: String,
    image: String,
}

impl KubeletKiller {
    pub fn new(namespace: &str, label: &str, image: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            label: label.to_string(),
            image: image.to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.namespace,
            &config.kubelet_killer_label,
            &config.kubelet_killer_image,
        )
    }

    /// Selector matching every pod this injector creates
    pub fn selector(&self) -> String {
        format!("{}=", self.label)
    }

    /// Stop the kubelet on `node_name`
    #[instrument(skip(self, cluster))]
    pub async fn stop_kubelet<C: ClusterApi + ?Sized>(
        &self,
        cluster: &C,
        node_name: &str,
    ) -> AppResult<String> {
        let short = Uuid::new_v4().simple().to_string();
        let name = format!("{}-{}", self.label, &short[..8]);

        let pod = kubelet_killer_pod(&name, &self.namespace, &self.label, &self.image, node_name);
        cluster
            .create_pod(&pod)
            .await
            .map_err(|e| AppError::fault_injection(format!("node {}: {}", node_name, e)))?;

        info!(pod = %name, node = %node_name, "Scheduled kubelet killer");
        Ok(name)
    }

    /// Delete every kubelet killer pod; returns how many were removed
    #[instrument(skip(self, cluster))]
    pub async fn cleanup<C: ClusterApi + ?Sized>(&self, cluster: &C) -> AppResult<usize> {
        let pods = cluster.list_pods(&self.selector()).await?;

        let mut deleted = 0;
        for pod in pods {
            let Some(name) = pod.metadata.name else {
                warn!("Skipping kubelet killer pod without a name");
                continue;
            };
            info!(pod = %name, "Delete kubelet killer pod");
            cluster.delete_pod(&name).await?;
            deleted += 1;
        }

        Ok(deleted)
    }
}
