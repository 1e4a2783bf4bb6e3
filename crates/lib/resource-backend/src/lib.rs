use std::collections::BTreeMap;

use futures::stream::BoxStream;

pub use resiliencebench_backends_core::{BackendError, BackendResult};
use resiliencebench_resources::{ObjectRef, Resource};

/// Backend capability for namespaced declarative records of one kind.
///
/// Writes are optimistic: `update` and `update_status` fail with
/// [`BackendError::Conflict`] when the caller's `resource_version` is stale.
/// `update` never touches the stored status and `update_status` never
/// touches the stored spec.
#[async_trait::async_trait]
pub trait ResourceBackend<T: Resource>: Send + Sync {
    async fn find(&self, namespace: &str, name: &str) -> BackendResult<Option<T>>;

    /// Like [`ResourceBackend::find`] but a missing record is an error.
    async fn get(&self, namespace: &str, name: &str) -> BackendResult<T> {
        self.find(namespace, name)
            .await?
            .ok_or_else(|| BackendError::not_found(T::KIND, namespace, name))
    }

    async fn create(&self, resource: &T) -> BackendResult<T>;

    /// Replace spec and metadata. Bumps `generation` when the spec changed.
    async fn update(&self, resource: &T) -> BackendResult<T>;

    async fn update_status(&self, resource: &T) -> BackendResult<T>;

    /// Returns whether a record was removed.
    async fn delete(&self, namespace: &str, name: &str) -> BackendResult<bool>;

    async fn delete_all(&self, namespace: &str) -> BackendResult<usize>;

    /// Delete every record in `namespace` carrying all `labels`.
    async fn delete_matching(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> BackendResult<usize>;

    /// All records, optionally restricted to one namespace, ordered by key.
    async fn list(&self, namespace: Option<&str>) -> BackendResult<Vec<T>>;

    /// Keys of records created, deleted or given a new spec generation from
    /// now on. Status and metadata-only writes are not reported.
    fn watch(&self) -> BoxStream<'static, ObjectRef>;
}
