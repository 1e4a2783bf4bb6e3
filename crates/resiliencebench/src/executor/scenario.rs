use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use resiliencebench_backends_core::BackendError;
use resiliencebench_cluster_backend::{
    Job, JobBackend, JobDescriptor, JobEvent, JobEventKind, JobOutcome,
};
use resiliencebench_resource_backend::ResourceBackend;
use resiliencebench_resources::{
    ExecutionQueue, ItemTransitionError, ObjectRef, Resource, Scenario, Workload, labels,
};

use crate::backend::OperatorBackend;
use crate::config::OperatorConfig;
use crate::factory::JobFactory;
use crate::steps::{StepError, StepPipeline};

/// A load job reached a terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobCompletion {
    pub job: JobDescriptor,
    pub outcome: JobOutcome,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum ScenarioExecutionError {
    #[error("workload {0} not found")]
    WorkloadNotFound(ObjectRef),

    #[error(transparent)]
    Step(#[from] StepError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("job {job} has no {annotation} annotation")]
    MissingAnnotation {
        job: ObjectRef,
        annotation: &'static str,
    },
}

impl ScenarioExecutionError {
    /// A record the scenario depends on is missing.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::WorkloadNotFound(_) => true,
            Self::Backend(err) => err.is_not_found(),
            Self::Step(err) => err.is_not_found(),
            Self::MissingAnnotation { .. } => false,
        }
    }

    pub fn is_claim_lost(&self) -> bool {
        matches!(self, Self::Step(err) if err.is_claim_lost())
    }
}

/// Runs one scenario: preparation steps, job submission and an asynchronous
/// watch that reports the job's completion on the completion channel.
pub struct ScenarioExecutor<B> {
    backend: B,
    jobs: JobFactory,
    preparation: StepPipeline,
    post_execution: StepPipeline,
    job_delete_timeout: Duration,
    job_max_runtime: Option<Duration>,
    completions: mpsc::UnboundedSender<JobCompletion>,
    shutdown: CancellationToken,
}

impl<B: OperatorBackend> ScenarioExecutor<B> {
    pub fn new(
        backend: B,
        config: &OperatorConfig,
        completions: mpsc::UnboundedSender<JobCompletion>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            jobs: JobFactory::new(&config.load_generator_image),
            preparation: StepPipeline::preparation(backend.clone(), config.update_retry),
            post_execution: StepPipeline::post_execution(backend.clone(), config.update_retry),
            backend,
            job_delete_timeout: config.job_delete_timeout,
            job_max_runtime: config.job_max_runtime,
            completions,
            shutdown,
        }
    }

    /// Prepare `scenario` and submit its job. Returns once the job is
    /// submitted; completion is reported later on the completion channel.
    pub async fn execute(
        &self,
        scenario: &Scenario,
        queue: &ExecutionQueue,
    ) -> Result<Job, ScenarioExecutionError> {
        let namespace = scenario.namespace();
        let workload_name = &scenario.spec.workload.workload_name;
        let Some(workload) =
            ResourceBackend::<Workload>::find(&self.backend, namespace, workload_name).await?
        else {
            return Err(ScenarioExecutionError::WorkloadNotFound(ObjectRef::new(
                namespace,
                workload_name,
            )));
        };

        self.preparation.run(scenario, queue).await?;

        let item = queue
            .item(scenario.name())
            .ok_or_else(|| StepError::from(ItemTransitionError::UnknownItem(scenario.name().to_string())))?;
        let descriptor = self.jobs.create(scenario, queue, item, &workload);

        // A job left over from an earlier run of this scenario must be gone
        // before the new one can take its name.
        if self
            .backend
            .delete_job(&descriptor.namespace, &descriptor.name)
            .await?
        {
            debug!(job = %descriptor.name, "deleted previous job");
        }
        self.backend
            .wait_until(
                &descriptor.namespace,
                &descriptor.name,
                &|job| job.is_none(),
                self.job_delete_timeout,
            )
            .await?;

        let job = self.backend.submit(&descriptor).await?;
        info!(
            scenario = %scenario.name(),
            queue = %queue.name(),
            job = %descriptor.name,
            "load job submitted"
        );
        self.watch_completion(descriptor);
        Ok(job)
    }

    fn watch_completion(&self, descriptor: JobDescriptor) {
        let mut events = self
            .backend
            .watch_job(&descriptor.namespace, &descriptor.name);
        let backend = self.backend.clone();
        let completions = self.completions.clone();
        let shutdown = self.shutdown.clone();
        let max_runtime = self.job_max_runtime;

        tokio::spawn(async move {
            let deadline = async move {
                match max_runtime {
                    Some(limit) => tokio::time::sleep(limit).await,
                    None => std::future::pending().await,
                }
            };
            let mut deadline = std::pin::pin!(deadline);
            let job = descriptor.object_ref();

            let completion = loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!(%job, "job watch stopped by shutdown");
                        return;
                    }
                    _ = &mut deadline => {
                        warn!(%job, ?max_runtime, "job exceeded maximum runtime, deleting");
                        if let Err(err) = backend.delete_job(&job.namespace, &job.name).await {
                            warn!(%job, error = %err, "failed to delete timed out job");
                        }
                        break JobCompletion {
                            job: descriptor,
                            outcome: JobOutcome::TimedOut,
                            completed_at: Utc::now(),
                        };
                    }
                    event = events.next() => match event {
                        Some(JobEvent { kind: JobEventKind::Deleted, .. }) => {
                            warn!(%job, "job deleted before completing");
                            return;
                        }
                        Some(JobEvent { job: current, .. }) if current.is_complete() => {
                            break JobCompletion {
                                outcome: current.status.outcome.unwrap_or(JobOutcome::Succeeded),
                                completed_at: current.status.completion_time.unwrap_or_else(Utc::now),
                                job: descriptor,
                            };
                        }
                        Some(_) => {}
                        None => {
                            warn!(%job, "job watch closed before completion");
                            return;
                        }
                    }
                }
            };

            info!(%job, outcome = ?completion.outcome, "load job completed");
            if completions.send(completion).is_err() {
                debug!(%job, "completion channel closed");
            }
        });
    }

    /// Run post-execution steps for a completed job. Returns the queue the
    /// job's scenario is scheduled on.
    pub async fn complete(
        &self,
        completion: &JobCompletion,
    ) -> Result<ObjectRef, ScenarioExecutionError> {
        let job = &completion.job;
        let scenario_name = job.annotation(labels::SCENARIO).ok_or_else(|| {
            ScenarioExecutionError::MissingAnnotation {
                job: job.object_ref(),
                annotation: labels::SCENARIO,
            }
        })?;
        let scenario =
            ResourceBackend::<Scenario>::get(&self.backend, &job.namespace, scenario_name).await?;

        let queue_name = scenario
            .metadata
            .annotation(labels::QUEUE)
            .or_else(|| job.annotation(labels::QUEUE))
            .ok_or_else(|| ScenarioExecutionError::MissingAnnotation {
                job: job.object_ref(),
                annotation: labels::QUEUE,
            })?;
        let queue =
            ResourceBackend::<ExecutionQueue>::get(&self.backend, &job.namespace, queue_name)
                .await?;

        if completion.outcome != JobOutcome::Succeeded {
            warn!(
                scenario = scenario_name,
                outcome = ?completion.outcome,
                "load job did not succeed"
            );
        }
        self.post_execution.run(&scenario, &queue).await?;
        Ok(queue.object_ref())
    }
}
