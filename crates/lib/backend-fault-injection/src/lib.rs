use std::collections::BTreeMap;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering},
};
use std::time::Duration;

use futures::stream::BoxStream;
use resiliencebench_backend_memory::MemoryBackend;
use resiliencebench_backends_core::{BackendError, BackendResult};
use resiliencebench_cluster_backend::{
    Deployment, DeploymentBackend, Job, JobBackend, JobDescriptor, JobEvent, JobPredicate,
    MeshPolicyBackend,
};
use resiliencebench_resource_backend::ResourceBackend;
use resiliencebench_resources::{
    CircuitBreakerPolicy, ConnectorFault, MeshPolicy, ObjectRef, Resource, RetryPolicy,
};
use resiliencebench_result_store::FileStore;

/// Wraps [`MemoryBackend`] and fails selected calls on purpose.
#[derive(Clone)]
pub struct FaultInjectingBackend {
    inner: MemoryBackend,
    conflict_kind: Option<&'static str>,
    conflicts_remaining: Arc<AtomicUsize>,
    update_calls: Arc<AtomicUsize>,
    fail_mesh_policies: Arc<AtomicBool>,
}

impl FaultInjectingBackend {
    pub fn new(inner: MemoryBackend) -> Self {
        Self {
            inner,
            conflict_kind: None,
            conflicts_remaining: Arc::new(AtomicUsize::new(0)),
            update_calls: Arc::new(AtomicUsize::new(0)),
            fail_mesh_policies: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The next `count` spec or status writes to records of `kind` fail with
    /// a stale-version conflict.
    pub fn with_update_conflicts(inner: MemoryBackend, kind: &'static str, count: usize) -> Self {
        Self {
            conflict_kind: Some(kind),
            conflicts_remaining: Arc::new(AtomicUsize::new(count)),
            ..Self::new(inner)
        }
    }

    /// Every mesh policy call fails.
    pub fn with_mesh_failures(inner: MemoryBackend) -> Self {
        Self {
            fail_mesh_policies: Arc::new(AtomicBool::new(true)),
            ..Self::new(inner)
        }
    }

    pub fn inner(&self) -> &MemoryBackend {
        &self.inner
    }

    /// Writes attempted against the conflict kind, injected or not.
    pub fn update_calls(&self) -> usize {
        self.update_calls.load(AtomicOrdering::SeqCst)
    }

    pub fn conflicts_remaining(&self) -> usize {
        self.conflicts_remaining.load(AtomicOrdering::SeqCst)
    }

    fn maybe_conflict<T: Resource>(&self, resource: &T) -> BackendResult<()> {
        if self.conflict_kind != Some(T::KIND) {
            return Ok(());
        }
        self.update_calls.fetch_add(1, AtomicOrdering::SeqCst);
        let injected = self
            .conflicts_remaining
            .fetch_update(AtomicOrdering::SeqCst, AtomicOrdering::SeqCst, |left| {
                left.checked_sub(1)
            })
            .is_ok();
        if injected {
            return Err(BackendError::conflict(
                T::KIND,
                resource.namespace(),
                resource.name(),
            ));
        }
        Ok(())
    }

    fn maybe_mesh_failure(&self, service: &str) -> BackendResult<()> {
        if self.fail_mesh_policies.load(AtomicOrdering::SeqCst) {
            return Err(BackendError::Message(format!(
                "mesh control plane rejected policy for {service}"
            )));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl<T: Resource> ResourceBackend<T> for FaultInjectingBackend {
    async fn find(&self, namespace: &str, name: &str) -> BackendResult<Option<T>> {
        ResourceBackend::<T>::find(&self.inner, namespace, name).await
    }

    async fn create(&self, resource: &T) -> BackendResult<T> {
        self.inner.create(resource).await
    }

    async fn update(&self, resource: &T) -> BackendResult<T> {
        self.maybe_conflict(resource)?;
        self.inner.update(resource).await
    }

    async fn update_status(&self, resource: &T) -> BackendResult<T> {
        self.maybe_conflict(resource)?;
        self.inner.update_status(resource).await
    }

    async fn delete(&self, namespace: &str, name: &str) -> BackendResult<bool> {
        ResourceBackend::<T>::delete(&self.inner, namespace, name).await
    }

    async fn delete_all(&self, namespace: &str) -> BackendResult<usize> {
        ResourceBackend::<T>::delete_all(&self.inner, namespace).await
    }

    async fn delete_matching(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> BackendResult<usize> {
        ResourceBackend::<T>::delete_matching(&self.inner, namespace, labels).await
    }

    async fn list(&self, namespace: Option<&str>) -> BackendResult<Vec<T>> {
        ResourceBackend::<T>::list(&self.inner, namespace).await
    }

    fn watch(&self) -> BoxStream<'static, ObjectRef> {
        ResourceBackend::<T>::watch(&self.inner)
    }
}

#[async_trait::async_trait]
impl JobBackend for FaultInjectingBackend {
    async fn submit(&self, descriptor: &JobDescriptor) -> BackendResult<Job> {
        self.inner.submit(descriptor).await
    }

    async fn find_job(&self, namespace: &str, name: &str) -> BackendResult<Option<Job>> {
        self.inner.find_job(namespace, name).await
    }

    async fn delete_job(&self, namespace: &str, name: &str) -> BackendResult<bool> {
        self.inner.delete_job(namespace, name).await
    }

    async fn wait_until(
        &self,
        namespace: &str,
        name: &str,
        predicate: &JobPredicate,
        timeout: Duration,
    ) -> BackendResult<()> {
        self.inner
            .wait_until(namespace, name, predicate, timeout)
            .await
    }

    fn watch_job(&self, namespace: &str, name: &str) -> BoxStream<'static, JobEvent> {
        self.inner.watch_job(namespace, name)
    }
}

#[async_trait::async_trait]
impl DeploymentBackend for FaultInjectingBackend {
    async fn find_deployment(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> BackendResult<Option<Deployment>> {
        self.inner.find_deployment(namespace, selector).await
    }

    async fn update_deployment(&self, deployment: &Deployment) -> BackendResult<Deployment> {
        self.inner.update_deployment(deployment).await
    }
}

#[async_trait::async_trait]
impl MeshPolicyBackend for FaultInjectingBackend {
    async fn apply_retry(
        &self,
        namespace: &str,
        service: &str,
        policy: &RetryPolicy,
    ) -> BackendResult<()> {
        self.maybe_mesh_failure(service)?;
        self.inner.apply_retry(namespace, service, policy).await
    }

    async fn apply_timeout(
        &self,
        namespace: &str,
        service: &str,
        timeout: Duration,
    ) -> BackendResult<()> {
        self.maybe_mesh_failure(service)?;
        self.inner.apply_timeout(namespace, service, timeout).await
    }

    async fn apply_circuit_breaker(
        &self,
        namespace: &str,
        service: &str,
        policy: &CircuitBreakerPolicy,
    ) -> BackendResult<()> {
        self.maybe_mesh_failure(service)?;
        self.inner
            .apply_circuit_breaker(namespace, service, policy)
            .await
    }

    async fn apply_fault(
        &self,
        namespace: &str,
        service: &str,
        fault: &ConnectorFault,
    ) -> BackendResult<()> {
        self.maybe_mesh_failure(service)?;
        self.inner.apply_fault(namespace, service, fault).await
    }

    async fn mesh_policy(
        &self,
        namespace: &str,
        service: &str,
    ) -> BackendResult<Option<MeshPolicy>> {
        self.inner.mesh_policy(namespace, service).await
    }
}

#[async_trait::async_trait]
impl FileStore for FaultInjectingBackend {
    async fn write(
        &self,
        path: &str,
        content: &str,
        content_type: Option<&str>,
    ) -> BackendResult<()> {
        self.inner.write(path, content, content_type).await
    }

    async fn read_to_string(&self, path: &str) -> BackendResult<Option<String>> {
        self.inner.read_to_string(path).await
    }
}
