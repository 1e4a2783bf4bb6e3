use std::time::Duration;

use resiliencebench_backends_core::BackendResult;
use resiliencebench_resources::{CircuitBreakerPolicy, ConnectorFault, MeshPolicy, RetryPolicy};

/// Backend capability for service-mesh resilience policies. Each call
/// configures traffic addressed to `service`; nothing is cached locally.
#[async_trait::async_trait]
pub trait MeshPolicyBackend: Send + Sync {
    async fn apply_retry(
        &self,
        namespace: &str,
        service: &str,
        policy: &RetryPolicy,
    ) -> BackendResult<()>;

    async fn apply_timeout(
        &self,
        namespace: &str,
        service: &str,
        timeout: Duration,
    ) -> BackendResult<()>;

    async fn apply_circuit_breaker(
        &self,
        namespace: &str,
        service: &str,
        policy: &CircuitBreakerPolicy,
    ) -> BackendResult<()>;

    async fn apply_fault(
        &self,
        namespace: &str,
        service: &str,
        fault: &ConnectorFault,
    ) -> BackendResult<()>;

    /// Policy currently configured for `service`, if any.
    async fn mesh_policy(&self, namespace: &str, service: &str)
    -> BackendResult<Option<MeshPolicy>>;
}
