use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use resiliencebench_backends_core::BackendResult;
use resiliencebench_resources::EnvVar;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    #[serde(default)]
    pub env: Vec<EnvVar>,
}

/// The slice of a deployment the environment step reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub containers: Vec<Container>,
}

impl Deployment {
    pub fn container(&self, name: &str) -> Option<&Container> {
        self.containers.iter().find(|container| container.name == name)
    }

    pub fn container_mut(&mut self, name: &str) -> Option<&mut Container> {
        self.containers
            .iter_mut()
            .find(|container| container.name == name)
    }
}

/// Backend capability for deployments hosting services under test.
#[async_trait::async_trait]
pub trait DeploymentBackend: Send + Sync {
    /// First deployment in `namespace` whose labels include `selector`.
    async fn find_deployment(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> BackendResult<Option<Deployment>>;

    async fn update_deployment(&self, deployment: &Deployment) -> BackendResult<Deployment>;
}
