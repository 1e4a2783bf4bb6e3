use tracing::{debug, info};

use resiliencebench_backends_core::BackendError;
use resiliencebench_resource_backend::ResourceBackend;
use resiliencebench_resources::{ExecutionQueue, ObjectRef, Scenario};

use super::scenario::{ScenarioExecutionError, ScenarioExecutor};
use crate::backend::OperatorBackend;

/// Result of one dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// The next pending item was claimed and its job submitted.
    Started { scenario: String, job: ObjectRef },
    /// Another item holds the queue.
    Busy { running: String },
    /// Nothing left to run.
    Idle,
}

#[derive(Debug, thiserror::Error)]
pub enum QueueExecutionError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("scenario {scenario}: {source}")]
    Scenario {
        scenario: String,
        #[source]
        source: ScenarioExecutionError,
    },
}

impl QueueExecutionError {
    /// The queue, the scenario or one of its references is missing. Retrying
    /// will not help until something is created or edited.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Backend(err) => err.is_not_found(),
            Self::Scenario { source, .. } => source.is_not_found(),
        }
    }
}

/// Single-flight FIFO dispatcher for one queue at a time.
///
/// The claim on an item happens in the first preparation step against the
/// latest stored queue, so concurrent callers racing on the same queue start
/// at most one item; the losers observe [`Dispatch::Busy`].
pub struct QueueExecutor<B> {
    backend: B,
    scenarios: ScenarioExecutor<B>,
}

impl<B: OperatorBackend> QueueExecutor<B> {
    pub fn new(backend: B, scenarios: ScenarioExecutor<B>) -> Self {
        Self { backend, scenarios }
    }

    pub fn scenario_executor(&self) -> &ScenarioExecutor<B> {
        &self.scenarios
    }

    pub async fn execute(&self, queue: &ObjectRef) -> Result<Dispatch, QueueExecutionError> {
        let latest =
            ResourceBackend::<ExecutionQueue>::get(&self.backend, &queue.namespace, &queue.name)
                .await?;

        if let Some(running) = latest.running_item() {
            debug!(%queue, running = %running.scenario, "queue busy");
            return Ok(Dispatch::Busy {
                running: running.scenario.clone(),
            });
        }
        let Some(next) = latest.next_pending_item() else {
            debug!(%queue, "no pending items");
            return Ok(Dispatch::Idle);
        };
        let scenario_name = next.scenario.clone();

        let scenario =
            ResourceBackend::<Scenario>::get(&self.backend, &queue.namespace, &scenario_name)
                .await?;
        match self.scenarios.execute(&scenario, &latest).await {
            Ok(job) => {
                info!(%queue, scenario = %scenario_name, "queue item dispatched");
                Ok(Dispatch::Started {
                    scenario: scenario_name,
                    job: job.descriptor.object_ref(),
                })
            }
            Err(err) if err.is_claim_lost() => {
                debug!(%queue, scenario = %scenario_name, error = %err, "lost the claim on the queue");
                let running = ResourceBackend::<ExecutionQueue>::get(
                    &self.backend,
                    &queue.namespace,
                    &queue.name,
                )
                .await?
                .running_item()
                .map(|item| item.scenario.clone())
                .unwrap_or_default();
                Ok(Dispatch::Busy { running })
            }
            Err(source) => Err(QueueExecutionError::Scenario {
                scenario: scenario_name,
                source,
            }),
        }
    }
}
