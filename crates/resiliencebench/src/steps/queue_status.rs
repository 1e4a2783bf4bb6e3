use chrono::Utc;
use tracing::info;

use resiliencebench_resource_backend::ResourceBackend;
use resiliencebench_resources::{ExecutionQueue, Resource, Scenario};

use super::{ExecutorStep, StepError};
use crate::backend::OperatorBackend;
use crate::progress::{propagate_benchmark_progress, refresh_queue_status};
use crate::retry::{RetryConfig, with_retry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemTransition {
    /// PENDING -> RUNNING. Fails if any item of the queue is already running.
    Start,
    /// RUNNING -> FINISHED.
    Finish,
}

/// Moves the scenario's queue item forward, then refreshes queue and
/// benchmark status.
///
/// The transition is applied to a freshly read queue on every attempt, so a
/// concurrent claim surfaces as an [`ItemTransitionError`] rather than a
/// silent overwrite.
///
/// [`ItemTransitionError`]: resiliencebench_resources::ItemTransitionError
pub struct QueueStatusStep<B> {
    backend: B,
    transition: ItemTransition,
    retry: RetryConfig,
}

impl<B> QueueStatusStep<B> {
    pub fn new(backend: B, transition: ItemTransition, retry: RetryConfig) -> Self {
        Self {
            backend,
            transition,
            retry,
        }
    }
}

#[async_trait::async_trait]
impl<B: OperatorBackend> ExecutorStep for QueueStatusStep<B> {
    fn name(&self) -> &'static str {
        match self.transition {
            ItemTransition::Start => "queue-status-start",
            ItemTransition::Finish => "queue-status-finish",
        }
    }

    fn is_applicable(&self, _scenario: &Scenario) -> bool {
        true
    }

    async fn apply(&self, scenario: &Scenario, queue: &ExecutionQueue) -> Result<(), StepError> {
        let backend = &self.backend;
        let transition = self.transition;
        let queue_key = queue.object_ref();
        let queue_ref = &queue_key;
        let item = scenario.name();

        with_retry(self.retry, "transition queue item", || async move {
            let mut latest =
                ResourceBackend::<ExecutionQueue>::get(backend, &queue_ref.namespace, &queue_ref.name)
                    .await?;
            let now = Utc::now();
            match transition {
                ItemTransition::Start => latest.start_item(item, now)?,
                ItemTransition::Finish => latest.finish_item(item, now)?,
            }
            ResourceBackend::<ExecutionQueue>::update(backend, &latest).await?;
            Ok::<_, StepError>(())
        })
        .await?;
        info!(queue = %queue_ref, item, ?transition, "queue item transitioned");

        let refreshed = refresh_queue_status(backend, self.retry, queue_ref).await?;
        propagate_benchmark_progress(backend, self.retry, scenario, &refreshed).await?;
        Ok(())
    }
}
