use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde_json::json;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

use resiliencebench_backends_core::{BackendError, BackendResult};
use resiliencebench_cluster_backend::{
    Job, JobBackend, JobDescriptor, JobEvent, JobEventKind, JobOutcome, JobPredicate, JobStatus,
};

use crate::MemoryBackend;

impl MemoryBackend {
    fn job_snapshot(&self, namespace: &str, name: &str) -> Option<Job> {
        self.jobs
            .lock()
            .expect("jobs poisoned")
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Mark a running job terminal. Returns false if the job is absent or
    /// already complete.
    pub fn complete_job(&self, namespace: &str, name: &str, outcome: JobOutcome) -> bool {
        let completed = {
            let mut guard = self.jobs.lock().expect("jobs poisoned");
            match guard.get_mut(&(namespace.to_string(), name.to_string())) {
                Some(job) if !job.is_complete() => {
                    job.status.completion_time = Some(Utc::now());
                    job.status.outcome = Some(outcome);
                    Some(job.clone())
                }
                _ => None,
            }
        };
        match completed {
            Some(job) => {
                debug!(namespace, job = name, ?outcome, "job completed");
                self.publish_job(JobEvent {
                    kind: JobEventKind::Modified,
                    job,
                });
                true
            }
            None => false,
        }
    }

    fn spawn_simulated_completion(&self, job: &Job, after: Duration) {
        let backend = self.clone();
        let descriptor = job.descriptor.clone();
        let started = job.status.start_time;
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            // A resubmitted job with the same name is not ours to complete.
            let still_ours = backend
                .job_snapshot(&descriptor.namespace, &descriptor.name)
                .is_some_and(|job| job.status.start_time == started);
            if !still_ours {
                return;
            }
            let summary = json!({
                "job": descriptor.name,
                "simulated": true,
                "duration_ms": after.as_millis() as u64,
            });
            backend.insert_file(&descriptor.result_file, &summary.to_string());
            backend.complete_job(
                &descriptor.namespace,
                &descriptor.name,
                JobOutcome::Succeeded,
            );
        });
    }
}

#[async_trait::async_trait]
impl JobBackend for MemoryBackend {
    async fn submit(&self, descriptor: &JobDescriptor) -> BackendResult<Job> {
        let key = (descriptor.namespace.clone(), descriptor.name.clone());
        let job = Job {
            descriptor: descriptor.clone(),
            status: JobStatus {
                start_time: Some(Utc::now()),
                ..JobStatus::default()
            },
        };
        {
            let mut guard = self.jobs.lock().expect("jobs poisoned");
            if guard.contains_key(&key) {
                return Err(BackendError::AlreadyExists {
                    kind: "Job",
                    namespace: key.0,
                    name: key.1,
                });
            }
            guard.insert(key, job.clone());
        }
        self.job_submissions
            .lock()
            .expect("job submissions poisoned")
            .push(descriptor.clone());
        info!(namespace = %descriptor.namespace, job = %descriptor.name, "job submitted");
        self.publish_job(JobEvent {
            kind: JobEventKind::Added,
            job: job.clone(),
        });
        if let Some(after) = self.simulated_job_duration {
            self.spawn_simulated_completion(&job, after);
        }
        Ok(job)
    }

    async fn find_job(&self, namespace: &str, name: &str) -> BackendResult<Option<Job>> {
        Ok(self.job_snapshot(namespace, name))
    }

    async fn delete_job(&self, namespace: &str, name: &str) -> BackendResult<bool> {
        let removed = self
            .jobs
            .lock()
            .expect("jobs poisoned")
            .remove(&(namespace.to_string(), name.to_string()));
        match removed {
            Some(job) => {
                self.publish_job(JobEvent {
                    kind: JobEventKind::Deleted,
                    job,
                });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn wait_until(
        &self,
        namespace: &str,
        name: &str,
        predicate: &JobPredicate,
        timeout: Duration,
    ) -> BackendResult<()> {
        let mut events = self.job_events.subscribe();
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if predicate(self.job_snapshot(namespace, name).as_ref()) {
                return Ok(());
            }
            if tokio::time::timeout_at(deadline, events.recv())
                .await
                .is_err()
            {
                return Err(BackendError::Timeout(format!(
                    "waiting for job {namespace}/{name}"
                )));
            }
        }
    }

    fn watch_job(&self, namespace: &str, name: &str) -> BoxStream<'static, JobEvent> {
        let receiver = self.job_events.subscribe();
        let current = self.job_snapshot(namespace, name).map(|job| JobEvent {
            kind: JobEventKind::Added,
            job,
        });
        let (namespace, name) = (namespace.to_string(), name.to_string());
        let backend = self.clone();
        let later = BroadcastStream::new(receiver).filter_map(move |event| {
            let matched = match event {
                Ok(event) => Some(event).filter(|event| {
                    event.job.descriptor.namespace == namespace
                        && event.job.descriptor.name == name
                }),
                // Missed events may include this job's completion; resend
                // its current state instead.
                Err(err) => {
                    warn!(namespace = %namespace, job = %name, error = %err, "job watch lagged");
                    backend.job_snapshot(&namespace, &name).map(|job| JobEvent {
                        kind: JobEventKind::Modified,
                        job,
                    })
                }
            };
            futures::future::ready(matched)
        });
        futures::stream::iter(current).chain(later).boxed()
    }
}
