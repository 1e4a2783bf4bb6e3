//! The backend capabilities the operator is wired against.

pub use resiliencebench_backends_core::{BackendError, BackendResult};
pub use resiliencebench_cluster_backend::{DeploymentBackend, JobBackend, MeshPolicyBackend};
pub use resiliencebench_resource_backend::ResourceBackend;
pub use resiliencebench_result_store::FileStore;

use resiliencebench_resources::{Benchmark, ExecutionQueue, ResilientService, Scenario, Workload};

/// Every capability at once. Implemented for any backend that provides them.
pub trait OperatorBackend:
    ResourceBackend<Benchmark>
    + ResourceBackend<Scenario>
    + ResourceBackend<ExecutionQueue>
    + ResourceBackend<Workload>
    + ResourceBackend<ResilientService>
    + JobBackend
    + DeploymentBackend
    + MeshPolicyBackend
    + FileStore
    + Clone
    + Send
    + Sync
    + 'static
{
}

impl<B> OperatorBackend for B where
    B: ResourceBackend<Benchmark>
        + ResourceBackend<Scenario>
        + ResourceBackend<ExecutionQueue>
        + ResourceBackend<Workload>
        + ResourceBackend<ResilientService>
        + JobBackend
        + DeploymentBackend
        + MeshPolicyBackend
        + FileStore
        + Clone
        + Send
        + Sync
        + 'static
{
}
