//! Writes Status Aggregator output back onto queue and benchmark records.
//!
//! Queue and benchmark counts are aggregated independently from the item
//! list; neither status is ever copied from the other.

use std::collections::BTreeSet;

use chrono::Utc;
use tracing::debug;

use resiliencebench_backends_core::BackendResult;
use resiliencebench_resource_backend::ResourceBackend;
use resiliencebench_resources::{
    Benchmark, ExecutionQueue, ObjectRef, QueueProgress, Resource, Scenario, aggregate, labels,
};

use crate::retry::{RetryConfig, with_retry};

/// Recompute the queue's status from its latest items and store it.
pub async fn refresh_queue_status<B>(
    backend: &B,
    retry: RetryConfig,
    queue: &ObjectRef,
) -> BackendResult<ExecutionQueue>
where
    B: ResourceBackend<ExecutionQueue>,
{
    with_retry(retry, "refresh queue status", || async move {
        let mut latest = backend.get(&queue.namespace, &queue.name).await?;
        let progress = latest.refresh_status(Utc::now());
        debug!(
            queue = %queue,
            running = progress.running,
            completed = progress.completed,
            pending = progress.pending,
            "queue status refreshed"
        );
        backend.update_status(&latest).await
    })
    .await
}

/// Names of the scenarios generated for `benchmark`.
pub async fn benchmark_scenarios<B>(
    backend: &B,
    namespace: &str,
    benchmark: &str,
) -> BackendResult<BTreeSet<String>>
where
    B: ResourceBackend<Scenario>,
{
    Ok(backend
        .list(Some(namespace))
        .await?
        .into_iter()
        .filter(|scenario| scenario.metadata.label(labels::BENCHMARK) == Some(benchmark))
        .map(|scenario| scenario.metadata.name)
        .collect())
}

/// Progress of one benchmark's items on a possibly shared queue.
pub fn benchmark_progress(queue: &ExecutionQueue, scenarios: &BTreeSet<String>) -> QueueProgress {
    aggregate(
        queue
            .spec
            .items
            .iter()
            .filter(|item| scenarios.contains(&item.scenario)),
    )
}

/// Store `progress` on the benchmark's status. Benchmarks that are gone or
/// that have no status yet are left alone.
pub async fn write_benchmark_progress<B>(
    backend: &B,
    retry: RetryConfig,
    benchmark: &ObjectRef,
    progress: QueueProgress,
) -> BackendResult<Option<Benchmark>>
where
    B: ResourceBackend<Benchmark>,
{
    with_retry(retry, "write benchmark progress", || async move {
        let Some(mut latest) = backend.find(&benchmark.namespace, &benchmark.name).await? else {
            debug!(benchmark = %benchmark, "benchmark gone, progress dropped");
            return Ok(None);
        };
        let Some(status) = latest.status.as_mut() else {
            return Ok(Some(latest));
        };
        let now = Utc::now();
        status.apply_progress(progress, now);
        status.last_reconcile_time = Some(now);
        backend.update_status(&latest).await.map(Some)
    })
    .await
}

/// Recompute and store the progress of the benchmark owning `scenario`.
pub async fn propagate_benchmark_progress<B>(
    backend: &B,
    retry: RetryConfig,
    scenario: &Scenario,
    queue: &ExecutionQueue,
) -> BackendResult<()>
where
    B: ResourceBackend<Scenario> + ResourceBackend<Benchmark>,
{
    let Some(benchmark) = scenario.metadata.label(labels::BENCHMARK) else {
        return Ok(());
    };
    let namespace = scenario.namespace();
    let scenarios = benchmark_scenarios(backend, namespace, benchmark).await?;
    let progress = benchmark_progress(queue, &scenarios);
    write_benchmark_progress(
        backend,
        retry,
        &ObjectRef::new(namespace, benchmark),
        progress,
    )
    .await?;
    Ok(())
}
