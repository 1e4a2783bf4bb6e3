//! Wires the controllers, executors and completion worker onto one backend.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use resiliencebench_resources::{Benchmark, ExecutionQueue};

use crate::backend::OperatorBackend;
use crate::config::OperatorConfig;
use crate::controller::{Controller, ControllerConfig};
use crate::executor::{CompletionWorker, JobCompletion, QueueExecutor, ScenarioExecutor};
use crate::reconciler::{BenchmarkReconciler, ExecutionQueueReconciler};

pub struct Operator<B> {
    backend: B,
    config: OperatorConfig,
    executor: Arc<QueueExecutor<B>>,
    completions: mpsc::UnboundedReceiver<JobCompletion>,
    shutdown: CancellationToken,
}

impl<B: OperatorBackend> Operator<B> {
    pub fn new(backend: B, config: OperatorConfig, shutdown: CancellationToken) -> Self {
        let (sender, completions) = mpsc::unbounded_channel();
        let scenarios = ScenarioExecutor::new(backend.clone(), &config, sender, shutdown.clone());
        let executor = Arc::new(QueueExecutor::new(backend.clone(), scenarios));
        Self {
            backend,
            config,
            executor,
            completions,
            shutdown,
        }
    }

    /// The dispatcher shared by both reconcilers and the completion worker.
    pub fn queue_executor(&self) -> Arc<QueueExecutor<B>> {
        Arc::clone(&self.executor)
    }

    pub fn spawn(self) -> OperatorTasks {
        let controller_config = ControllerConfig::from(&self.config);

        let benchmarks: Controller<Benchmark, _, _> = Controller::new(
            self.backend.clone(),
            Arc::new(BenchmarkReconciler::new(
                self.backend.clone(),
                Arc::clone(&self.executor),
                &self.config,
            )),
            controller_config,
        );
        let queues: Controller<ExecutionQueue, _, _> = Controller::new(
            self.backend.clone(),
            Arc::new(ExecutionQueueReconciler::new(
                self.backend.clone(),
                Arc::clone(&self.executor),
                &self.config,
            )),
            controller_config,
        );
        let worker = CompletionWorker {
            executor: Arc::clone(&self.executor),
            completions: self.completions,
        };

        let handles = vec![
            (
                "benchmark-controller",
                tokio::spawn(benchmarks.run(self.shutdown.clone().cancelled_owned())),
            ),
            (
                "queue-controller",
                tokio::spawn(queues.run(self.shutdown.clone().cancelled_owned())),
            ),
            (
                "completion-worker",
                tokio::spawn(worker.run(self.shutdown.clone().cancelled_owned())),
            ),
        ];
        info!(tasks = handles.len(), "operator started");
        OperatorTasks { handles }
    }
}

/// Background tasks of a running operator.
pub struct OperatorTasks {
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl OperatorTasks {
    /// Wait for every task to stop, giving each at most `grace`.
    pub async fn join(self, grace: Duration) {
        for (task, handle) in self.handles {
            match tokio::time::timeout(grace, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(task, error = %err, "task ended abnormally"),
                Err(_) => warn!(task, "task did not stop in time"),
            }
        }
    }
}
