use std::time::Duration;

use tracing::debug;

use resiliencebench_backends_core::BackendResult;
use resiliencebench_cluster_backend::MeshPolicyBackend;
use resiliencebench_resources::{CircuitBreakerPolicy, ConnectorFault, MeshPolicy, RetryPolicy};

use crate::MemoryBackend;

impl MemoryBackend {
    fn edit_policy(&self, namespace: &str, service: &str, edit: impl FnOnce(&mut MeshPolicy)) {
        let mut guard = self.mesh_policies.lock().expect("mesh policies poisoned");
        edit(
            guard
                .entry((namespace.to_string(), service.to_string()))
                .or_default(),
        );
    }
}

#[async_trait::async_trait]
impl MeshPolicyBackend for MemoryBackend {
    async fn apply_retry(
        &self,
        namespace: &str,
        service: &str,
        policy: &RetryPolicy,
    ) -> BackendResult<()> {
        debug!(namespace, service, attempts = policy.attempts, "retry policy applied");
        self.edit_policy(namespace, service, |mesh| mesh.retry = Some(policy.clone()));
        Ok(())
    }

    async fn apply_timeout(
        &self,
        namespace: &str,
        service: &str,
        timeout: Duration,
    ) -> BackendResult<()> {
        debug!(namespace, service, timeout_ms = timeout.as_millis() as u64, "timeout applied");
        self.edit_policy(namespace, service, |mesh| {
            mesh.timeout_ms = Some(timeout.as_millis() as u64)
        });
        Ok(())
    }

    async fn apply_circuit_breaker(
        &self,
        namespace: &str,
        service: &str,
        policy: &CircuitBreakerPolicy,
    ) -> BackendResult<()> {
        debug!(namespace, service, "circuit breaker applied");
        self.edit_policy(namespace, service, |mesh| {
            mesh.circuit_breaker = Some(policy.clone())
        });
        Ok(())
    }

    async fn apply_fault(
        &self,
        namespace: &str,
        service: &str,
        fault: &ConnectorFault,
    ) -> BackendResult<()> {
        debug!(namespace, service, percentage = fault.percentage, "fault applied");
        self.edit_policy(namespace, service, |mesh| mesh.fault = Some(fault.clone()));
        Ok(())
    }

    async fn mesh_policy(
        &self,
        namespace: &str,
        service: &str,
    ) -> BackendResult<Option<MeshPolicy>> {
        Ok(self
            .mesh_policies
            .lock()
            .expect("mesh policies poisoned")
            .get(&(namespace.to_string(), service.to_string()))
            .cloned())
    }
}
