use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use resiliencebench_backends_core::BackendResult;
use resiliencebench_resources::ObjectRef;

/// Everything needed to launch one load-generation job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDescriptor {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    pub image: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Where the load generator writes its summary.
    pub result_file: String,
}

impl JobDescriptor {
    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef::new(&self.namespace, &self.name)
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobOutcome {
    Succeeded,
    Failed,
    /// Deleted by the operator after exceeding its maximum runtime.
    TimedOut,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    /// Set exactly once, when the job reaches a terminal state.
    #[serde(default)]
    pub completion_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub outcome: Option<JobOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub descriptor: JobDescriptor,
    pub status: JobStatus,
}

impl Job {
    pub fn is_complete(&self) -> bool {
        self.status.completion_time.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobEventKind {
    Added,
    Modified,
    Deleted,
}

/// Lifecycle notification for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobEvent {
    pub kind: JobEventKind,
    pub job: Job,
}

/// Predicate evaluated against the current state of a job (`None` once absent).
pub type JobPredicate = dyn Fn(Option<&Job>) -> bool + Send + Sync;

/// Backend capability for load-generation jobs.
#[async_trait::async_trait]
pub trait JobBackend: Send + Sync {
    async fn submit(&self, descriptor: &JobDescriptor) -> BackendResult<Job>;

    async fn find_job(&self, namespace: &str, name: &str) -> BackendResult<Option<Job>>;

    /// Returns whether a job was removed.
    async fn delete_job(&self, namespace: &str, name: &str) -> BackendResult<bool>;

    /// Block until `predicate` holds for the job, failing with
    /// `BackendError::Timeout` after `timeout`.
    async fn wait_until(
        &self,
        namespace: &str,
        name: &str,
        predicate: &JobPredicate,
        timeout: Duration,
    ) -> BackendResult<()>;

    /// Events for one job: its current state first (if present), then every
    /// later change.
    fn watch_job(&self, namespace: &str, name: &str) -> BoxStream<'static, JobEvent>;
}
