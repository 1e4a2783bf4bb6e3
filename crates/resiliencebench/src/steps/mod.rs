//! Side-effecting steps run around each scenario's load job.
//!
//! Preparation runs before the job is submitted:
//! 1. item PENDING -> RUNNING (first, so later failures are observable)
//! 2. mesh retry, circuit breaker, timeout and fault policies
//! 3. environment overrides on target deployments
//!
//! Post-execution runs once the job completes:
//! 1. item RUNNING -> FINISHED
//! 2. result aggregation into the queue's result document

mod environment;
mod mesh;
mod queue_status;
mod result_file;

use tracing::{debug, info};

use resiliencebench_backends_core::BackendError;
use resiliencebench_resources::{ExecutionQueue, ItemTransitionError, ItemPhase, Scenario};

pub use self::environment::EnvironmentStep;
pub use self::mesh::{
    MeshCircuitBreakerStep, MeshFaultStep, MeshRetryStep, MeshTimeoutStep, ScenarioFaultStep,
};
pub use self::queue_status::{ItemTransition, QueueStatusStep};
pub use self::result_file::ResultFileStep;

use crate::backend::OperatorBackend;
use crate::retry::{RetryConfig, Transient};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Transition(#[from] ItemTransitionError),

    #[error("{step}: {message}")]
    Failed { step: &'static str, message: String },
}

impl StepError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Backend(err) if err.is_not_found())
    }

    /// Another dispatch already claimed the queue, or this item, first.
    pub fn is_claim_lost(&self) -> bool {
        matches!(
            self,
            Self::Transition(ItemTransitionError::AlreadyRunning { .. })
                | Self::Transition(ItemTransitionError::InvalidTransition {
                    to: ItemPhase::Running,
                    ..
                })
        )
    }
}

impl Transient for StepError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Backend(err) => err.is_transient(),
            _ => false,
        }
    }
}

/// One unit of the pipeline.
#[async_trait::async_trait]
pub trait ExecutorStep: Send + Sync {
    fn name(&self) -> &'static str;

    /// Inapplicable steps are skipped without side effects.
    fn is_applicable(&self, scenario: &Scenario) -> bool;

    async fn apply(&self, scenario: &Scenario, queue: &ExecutionQueue) -> Result<(), StepError>;
}

/// Ordered steps; the first failure aborts the rest.
pub struct StepPipeline {
    stage: &'static str,
    steps: Vec<Box<dyn ExecutorStep>>,
}

impl StepPipeline {
    pub fn new(stage: &'static str, steps: Vec<Box<dyn ExecutorStep>>) -> Self {
        Self { stage, steps }
    }

    pub fn preparation<B: OperatorBackend>(backend: B, retry: RetryConfig) -> Self {
        Self::new(
            "preparation",
            vec![
                Box::new(QueueStatusStep::new(
                    backend.clone(),
                    ItemTransition::Start,
                    retry,
                )),
                Box::new(MeshRetryStep::new(backend.clone())),
                Box::new(MeshCircuitBreakerStep::new(backend.clone())),
                Box::new(MeshTimeoutStep::new(backend.clone())),
                Box::new(MeshFaultStep::new(backend.clone())),
                Box::new(ScenarioFaultStep::new(backend.clone())),
                Box::new(EnvironmentStep::new(backend, retry)),
            ],
        )
    }

    pub fn post_execution<B: OperatorBackend>(backend: B, retry: RetryConfig) -> Self {
        Self::new(
            "post-execution",
            vec![
                Box::new(QueueStatusStep::new(
                    backend.clone(),
                    ItemTransition::Finish,
                    retry,
                )),
                Box::new(ResultFileStep::new(backend)),
            ],
        )
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|step| step.name()).collect()
    }

    pub async fn run(&self, scenario: &Scenario, queue: &ExecutionQueue) -> Result<(), StepError> {
        for step in &self.steps {
            if !step.is_applicable(scenario) {
                debug!(
                    stage = self.stage,
                    step = step.name(),
                    scenario = %scenario.metadata.name,
                    "step skipped"
                );
                continue;
            }
            step.apply(scenario, queue).await?;
            info!(
                stage = self.stage,
                step = step.name(),
                scenario = %scenario.metadata.name,
                "step applied"
            );
        }
        Ok(())
    }
}
