//! Provider capability probe
//!
//! Kubemark clusters run hollow nodes without a real kubelet, so there is
//! nothing for the fault injector to stop.

use tracing::{debug, instrument};

use crate::error::AppResult;
use crate::k8s::ClusterApi;

/// Deployment running the machine API controllers
pub const MACHINE_API_CONTROLLERS: &str = "machine-api-controllers";

/// Container whose image identifies the cloud provider
pub const CONTROLLER_MANAGER_CONTAINER: &str = "controller-manager";

/// Report whether the cluster is backed by the simulated kubemark provider.
///
/// A missing controllers deployment means "not kubemark"; any other lookup
/// error is returned.
#[instrument(skip(cluster))]
pub async fn is_kubemark_provider<C: ClusterApi + ?Sized>(cluster: &C) -> AppResult<bool> {
    let deployment = match cluster.get_deployment(MACHINE_API_CONTROLLERS).await {
        Ok(d) => d,
        Err(e) if e.is_not_found() => {
            debug!("machine API controllers deployment not found");
            return Ok(false);
        }
        Err(e) => return Err(e),
    };

    let image = deployment
        .spec
        .as_ref()
        .and_then(|s| s.template.spec.as_ref())
        .and_then(|p| {
            p.containers
                .iter()
                .find(|c| c.name == CONTROLLER_MANAGER_CONTAINER)
        })
        .and_then(|c| c.image.as_deref())
        .unwrap_or_default();

    debug!(image, "machine API controller image");
    Ok(image.contains("kubemark"))
}
