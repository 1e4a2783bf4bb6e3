//! In-memory implementation of every backend capability, for tests and
//! local runs.

mod deployment_backend;
mod file_store;
mod job_backend;
mod mesh_policy_backend;
mod resource_backend;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::broadcast;

use resiliencebench_cluster_backend::{Deployment, Job, JobDescriptor, JobEvent};
use resiliencebench_resources::{MeshPolicy, ObjectRef};

const EVENT_CAPACITY: usize = 1024;

/// `(kind, namespace, name)`
type ObjectKey = (&'static str, String, String);
type NamespacedKey = (String, String);

#[derive(Clone, Debug)]
struct ChangeEvent {
    kind: &'static str,
    object: ObjectRef,
}

/// Backend that keeps every record in process memory.
///
/// Resources are stored as JSON documents so the spec and status halves can
/// be versioned independently, the same way a declarative control plane
/// stores them. Jobs never run; they complete when [`MemoryBackend::complete_job`]
/// is called or, with [`MemoryBackend::with_simulated_jobs`], after a fixed delay.
#[derive(Clone)]
pub struct MemoryBackend {
    objects: Arc<Mutex<BTreeMap<ObjectKey, Value>>>,
    resource_version: Arc<AtomicU64>,
    changes: broadcast::Sender<ChangeEvent>,
    jobs: Arc<Mutex<BTreeMap<NamespacedKey, Job>>>,
    job_submissions: Arc<Mutex<Vec<JobDescriptor>>>,
    job_events: broadcast::Sender<JobEvent>,
    simulated_job_duration: Option<Duration>,
    deployments: Arc<Mutex<BTreeMap<NamespacedKey, Deployment>>>,
    mesh_policies: Arc<Mutex<BTreeMap<NamespacedKey, MeshPolicy>>>,
    files: Arc<Mutex<BTreeMap<String, String>>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(EVENT_CAPACITY);
        let (job_events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            objects: Arc::new(Mutex::new(BTreeMap::new())),
            resource_version: Arc::new(AtomicU64::new(0)),
            changes,
            jobs: Arc::new(Mutex::new(BTreeMap::new())),
            job_submissions: Arc::new(Mutex::new(Vec::new())),
            job_events,
            simulated_job_duration: None,
            deployments: Arc::new(Mutex::new(BTreeMap::new())),
            mesh_policies: Arc::new(Mutex::new(BTreeMap::new())),
            files: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Submitted jobs complete on their own after `duration`, writing a
    /// synthetic result document to their result file.
    pub fn with_simulated_jobs(duration: Duration) -> Self {
        Self {
            simulated_job_duration: Some(duration),
            ..Self::default()
        }
    }

    /// Every job descriptor ever submitted, in submission order.
    pub fn job_submissions(&self) -> Vec<JobDescriptor> {
        self.job_submissions
            .lock()
            .expect("job submissions poisoned")
            .clone()
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.jobs
            .lock()
            .expect("jobs poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn insert_deployment(&self, deployment: Deployment) {
        self.deployments
            .lock()
            .expect("deployments poisoned")
            .insert(
                (deployment.namespace.clone(), deployment.name.clone()),
                deployment,
            );
    }

    pub fn deployment(&self, namespace: &str, name: &str) -> Option<Deployment> {
        self.deployments
            .lock()
            .expect("deployments poisoned")
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn files(&self) -> BTreeMap<String, String> {
        self.files.lock().expect("files poisoned").clone()
    }

    pub fn insert_file(&self, path: &str, content: &str) {
        self.files
            .lock()
            .expect("files poisoned")
            .insert(path.to_string(), content.to_string());
    }

    fn next_resource_version(&self) -> u64 {
        self.resource_version.fetch_add(1, AtomicOrdering::SeqCst) + 1
    }

    fn publish(&self, kind: &'static str, object: ObjectRef) {
        // No receivers is fine: nothing is watching yet.
        let _ = self.changes.send(ChangeEvent { kind, object });
    }

    fn publish_job(&self, event: JobEvent) {
        let _ = self.job_events.send(event);
    }
}
