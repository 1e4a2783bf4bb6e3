use std::collections::BTreeMap;

use resiliencebench_backends_core::{BackendError, BackendResult};
use resiliencebench_cluster_backend::{Deployment, DeploymentBackend};

#[async_trait::async_trait]
impl DeploymentBackend for crate::MemoryBackend {
    async fn find_deployment(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> BackendResult<Option<Deployment>> {
        let guard = self.deployments.lock().expect("deployments poisoned");
        Ok(guard
            .values()
            .filter(|deployment| deployment.namespace == namespace)
            .find(|deployment| {
                selector
                    .iter()
                    .all(|(key, value)| deployment.labels.get(key) == Some(value))
            })
            .cloned())
    }

    async fn update_deployment(&self, deployment: &Deployment) -> BackendResult<Deployment> {
        let mut guard = self.deployments.lock().expect("deployments poisoned");
        let key = (deployment.namespace.clone(), deployment.name.clone());
        match guard.get_mut(&key) {
            Some(stored) => {
                *stored = deployment.clone();
                Ok(stored.clone())
            }
            None => Err(BackendError::not_found(
                "Deployment",
                &deployment.namespace,
                &deployment.name,
            )),
        }
    }
}
