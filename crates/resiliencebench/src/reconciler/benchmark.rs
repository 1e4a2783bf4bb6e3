//! Benchmark reconciliation: regenerate scenarios and the execution queue
//! whenever a benchmark's spec generation advances, then kick the queue.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use resiliencebench_backends_core::{BackendError, BackendResult};
use resiliencebench_resource_backend::ResourceBackend;
use resiliencebench_resources::{
    Benchmark, BenchmarkStatus, ExecutionQueue, ObjectRef, Resource, Scenario, Workload, labels,
};

use super::ReconcileError;
use crate::backend::OperatorBackend;
use crate::config::OperatorConfig;
use crate::controller::{ReconcileAction, Reconciler};
use crate::executor::{Dispatch, QueueExecutionError, QueueExecutor};
use crate::factory::{ExecutionQueueFactory, ScenarioFactory};
use crate::progress::benchmark_scenarios;
use crate::retry::{RetryConfig, with_retry};

/// Why a pass stopped short.
#[derive(Debug, thiserror::Error)]
enum Failure {
    /// Something the benchmark refers to is missing. Recorded on the status
    /// and left for the next edit or resync.
    #[error("{0}")]
    Terminal(String),

    #[error(transparent)]
    Fatal(#[from] ReconcileError),
}

impl From<BackendError> for Failure {
    fn from(err: BackendError) -> Self {
        Self::Fatal(err.into())
    }
}

impl From<QueueExecutionError> for Failure {
    fn from(err: QueueExecutionError) -> Self {
        if err.is_not_found() {
            return Self::Terminal(err.to_string());
        }
        Self::Fatal(err.into())
    }
}

pub struct BenchmarkReconciler<B> {
    backend: B,
    executor: Arc<QueueExecutor<B>>,
    results_dir: String,
    retry: RetryConfig,
}

impl<B: OperatorBackend> BenchmarkReconciler<B> {
    pub fn new(backend: B, executor: Arc<QueueExecutor<B>>, config: &OperatorConfig) -> Self {
        Self {
            backend,
            executor,
            results_dir: config.results_dir.clone(),
            retry: config.update_retry,
        }
    }

    /// Whether the current generation was already processed and needs no
    /// regeneration: terminal, or its queue has started running items.
    async fn is_settled(&self, benchmark: &Benchmark) -> BackendResult<bool> {
        let Some(status) = &benchmark.status else {
            return Ok(false);
        };
        if status.needs_reconciliation(benchmark.metadata.generation) {
            return Ok(false);
        }
        if status.phase.is_terminal() {
            return Ok(true);
        }
        let queue = ResourceBackend::<ExecutionQueue>::find(
            &self.backend,
            benchmark.namespace(),
            benchmark.queue_name(),
        )
        .await?;
        Ok(queue.is_some_and(|queue| queue.spec.items.iter().any(|item| !item.is_pending())))
    }

    async fn touch(&self, key: &ObjectRef) -> BackendResult<()> {
        let backend = &self.backend;
        with_retry(self.retry, "touch benchmark status", || async move {
            let Some(mut latest) =
                ResourceBackend::<Benchmark>::find(backend, &key.namespace, &key.name).await?
            else {
                return Ok(());
            };
            if let Some(status) = latest.status.as_mut() {
                status.last_reconcile_time = Some(Utc::now());
            }
            ResourceBackend::<Benchmark>::update_status(backend, &latest)
                .await
                .map(|_| ())
        })
        .await
    }

    async fn record_failure(&self, key: &ObjectRef, message: &str) -> BackendResult<()> {
        let backend = &self.backend;
        with_retry(self.retry, "record benchmark failure", || async move {
            let Some(mut latest) =
                ResourceBackend::<Benchmark>::find(backend, &key.namespace, &key.name).await?
            else {
                return Ok(());
            };
            latest
                .status
                .get_or_insert_with(BenchmarkStatus::default)
                .mark_failed(message, Utc::now());
            ResourceBackend::<Benchmark>::update_status(backend, &latest)
                .await
                .map(|_| ())
        })
        .await
    }

    async fn regenerate(&self, benchmark: &Benchmark) -> Result<(), Failure> {
        let namespace = benchmark.namespace();
        let name = benchmark.name();

        let workload_name = &benchmark.spec.workload;
        let Some(workload) =
            ResourceBackend::<Workload>::find(&self.backend, namespace, workload_name).await?
        else {
            return Err(Failure::Terminal(format!(
                "workload {workload_name} not found in namespace {namespace}"
            )));
        };

        let previous = benchmark_scenarios(&self.backend, namespace, name).await?;
        let selector = BTreeMap::from([(labels::BENCHMARK.to_string(), name.to_string())]);
        let deleted =
            ResourceBackend::<Scenario>::delete_matching(&self.backend, namespace, &selector)
                .await?;
        debug!(benchmark = name, deleted, "previous scenarios deleted");

        let scenarios = ScenarioFactory::create(benchmark, &workload);
        if scenarios.is_empty() {
            return Err(Failure::Terminal("no scenarios generated".to_string()));
        }

        let queue_name = benchmark.queue_name();
        let shared = if benchmark.spec.auto_create_queue {
            None
        } else {
            match ResourceBackend::<ExecutionQueue>::find(&self.backend, namespace, queue_name)
                .await?
            {
                Some(queue) => Some(queue),
                None => {
                    return Err(Failure::Terminal(format!(
                        "execution queue {queue_name} not found in namespace {namespace}"
                    )));
                }
            }
        };

        for scenario in &scenarios {
            ResourceBackend::<Scenario>::create(&self.backend, scenario).await?;
        }
        info!(
            benchmark = name,
            scenarios = scenarios.len(),
            "scenarios generated"
        );

        let execution_id = match shared {
            Some(queue) => {
                self.extend_shared_queue(queue.object_ref(), &previous, &scenarios)
                    .await?
            }
            None => self.recreate_queue(benchmark, &scenarios).await?,
        };

        self.store_status(benchmark, scenarios.len(), &execution_id)
            .await?;

        let queue_ref = ObjectRef::new(namespace, queue_name);
        match self.executor.execute(&queue_ref).await? {
            Dispatch::Started { scenario, .. } => {
                info!(benchmark = name, queue = %queue_ref, %scenario, "benchmark started")
            }
            Dispatch::Busy { running } => {
                debug!(benchmark = name, queue = %queue_ref, %running, "queue already running")
            }
            Dispatch::Idle => debug!(benchmark = name, queue = %queue_ref, "queue idle"),
        }
        Ok(())
    }

    /// Replace the benchmark's own queue, keeping its execution id.
    async fn recreate_queue(
        &self,
        benchmark: &Benchmark,
        scenarios: &[Scenario],
    ) -> BackendResult<String> {
        let namespace = benchmark.namespace();
        let queue_name = benchmark.queue_name();
        let existing =
            ResourceBackend::<ExecutionQueue>::find(&self.backend, namespace, queue_name).await?;
        let execution_id = existing
            .as_ref()
            .and_then(|queue| queue.metadata.label(labels::EXECUTION_ID))
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        if existing.is_some() {
            ResourceBackend::<ExecutionQueue>::delete(&self.backend, namespace, queue_name)
                .await?;
            debug!(queue = queue_name, "previous execution queue deleted");
        }

        let queue =
            ExecutionQueueFactory::create(benchmark, scenarios, &self.results_dir, &execution_id);
        ResourceBackend::<ExecutionQueue>::create(&self.backend, &queue).await?;
        info!(
            queue = queue_name,
            items = queue.spec.items.len(),
            %execution_id,
            "execution queue created"
        );
        Ok(execution_id)
    }

    /// Bring this benchmark's items on a queue it does not own in line with
    /// `scenarios`: pending items of the previous generation are dropped and
    /// missing ones appended.
    async fn extend_shared_queue(
        &self,
        key: ObjectRef,
        previous: &BTreeSet<String>,
        scenarios: &[Scenario],
    ) -> BackendResult<String> {
        let backend = &self.backend;
        let results_dir = self.results_dir.as_str();
        let key = &key;
        let queue = with_retry(self.retry, "extend shared queue", || async move {
            let mut latest =
                ResourceBackend::<ExecutionQueue>::get(backend, &key.namespace, &key.name).await?;
            let removed =
                ExecutionQueueFactory::remove_stale_pending(&mut latest, previous, scenarios);
            let added = ExecutionQueueFactory::append_missing(&mut latest, scenarios, results_dir);
            if removed == 0 && added == 0 {
                return Ok(latest);
            }
            debug!(queue = %key, removed, added, "shared queue items updated");
            ResourceBackend::<ExecutionQueue>::update(backend, &latest).await
        })
        .await?;
        Ok(queue
            .metadata
            .label(labels::EXECUTION_ID)
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string()))
    }

    async fn store_status(
        &self,
        benchmark: &Benchmark,
        total: usize,
        execution_id: &str,
    ) -> BackendResult<()> {
        let backend = &self.backend;
        let key = benchmark.object_ref();
        let key = &key;
        let generation = benchmark.metadata.generation;
        with_retry(self.retry, "store benchmark status", || async move {
            let mut latest =
                ResourceBackend::<Benchmark>::get(backend, &key.namespace, &key.name).await?;
            let now = Utc::now();
            let mut status = match latest.status.take() {
                Some(mut status) if !status.needs_reconciliation(generation) => {
                    status.last_reconcile_time = Some(now);
                    status
                }
                _ => BenchmarkStatus::new(total, execution_id, now),
            };
            status.observe(generation, now);
            latest.status = Some(status);
            ResourceBackend::<Benchmark>::update_status(backend, &latest)
                .await
                .map(|_| ())
        })
        .await
    }
}

#[async_trait::async_trait]
impl<B: OperatorBackend> Reconciler<Benchmark> for BenchmarkReconciler<B> {
    type Error = ReconcileError;

    async fn reconcile(&self, benchmark: Benchmark) -> Result<ReconcileAction, ReconcileError> {
        let key = benchmark.object_ref();
        debug!(
            benchmark = %key,
            generation = benchmark.metadata.generation,
            "reconciling benchmark"
        );

        if self.is_settled(&benchmark).await? {
            self.touch(&key).await?;
            debug!(benchmark = %key, "generation already observed");
            return Ok(ReconcileAction::Done);
        }

        match self.regenerate(&benchmark).await {
            Ok(()) => Ok(ReconcileAction::Done),
            Err(Failure::Terminal(message)) => {
                warn!(benchmark = %key, %message, "benchmark failed");
                self.record_failure(&key, &message).await?;
                Ok(ReconcileAction::Done)
            }
            Err(Failure::Fatal(err)) => {
                warn!(benchmark = %key, error = %err, "benchmark reconciliation failed");
                self.record_failure(&key, &err.to_string()).await?;
                Err(err)
            }
        }
    }
}
