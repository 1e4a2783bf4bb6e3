//! Queue executor behavior: FIFO dispatch, single flight, completion
//! chaining and optimistic-write retries.

mod support;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use resiliencebench::progress::refresh_queue_status;
use resiliencebench::steps::StepError;
use resiliencebench::{
    CompletionWorker, Dispatch, OperatorConfig, QueueExecutionError, RetryConfig,
    ScenarioExecutionError,
};
use resiliencebench_backend_fault_injection::FaultInjectingBackend;
use resiliencebench_backend_memory::MemoryBackend;
use resiliencebench_backends_core::BackendError;
use resiliencebench_cluster_backend::JobOutcome;
use resiliencebench_resource_backend::ResourceBackend;
use resiliencebench_resources::{
    Connector, ExecutionQueue, MeshPolicy, ObjectRef, Phase, RetryPolicy, Scenario,
    ServiceEndpoint,
};

use support::{NS, eventually, executor, load_queue, phases, seed_queue};

fn q1() -> ObjectRef {
    ObjectRef::new(NS, "q1")
}

#[tokio::test]
async fn first_pending_item_starts_and_the_rest_wait() {
    let backend = MemoryBackend::new();
    seed_queue(&backend, &["a", "b", "c"]).await;
    let (executor, _completions) = executor(&backend, &OperatorConfig::test_config());

    let dispatch = executor.execute(&q1()).await.expect("execute");

    assert_eq!(
        dispatch,
        Dispatch::Started {
            scenario: "a".to_string(),
            job: ObjectRef::new(NS, "a"),
        }
    );
    let queue = load_queue(&backend, "q1").await;
    assert_eq!(phases(&queue), vec!["running", "pending", "pending"]);
    assert_eq!(backend.job_submissions().len(), 1);
}

#[tokio::test]
async fn running_item_blocks_further_dispatch() {
    let backend = MemoryBackend::new();
    seed_queue(&backend, &["a", "b"]).await;
    let (executor, _completions) = executor(&backend, &OperatorConfig::test_config());

    executor.execute(&q1()).await.expect("first");
    let second = executor.execute(&q1()).await.expect("second");

    assert_eq!(
        second,
        Dispatch::Busy {
            running: "a".to_string()
        }
    );
    assert_eq!(backend.job_submissions().len(), 1);
}

#[tokio::test]
async fn completion_finishes_the_item_and_starts_the_next() {
    let backend = MemoryBackend::new();
    seed_queue(&backend, &["a", "b", "c"]).await;
    let (executor, completions) = executor(&backend, &OperatorConfig::test_config());
    let token = CancellationToken::new();
    let worker = CompletionWorker {
        executor: executor.clone(),
        completions,
    };
    let worker = tokio::spawn(worker.run(token.clone().cancelled_owned()));

    executor.execute(&q1()).await.expect("execute");
    assert!(backend.complete_job(NS, "a", JobOutcome::Succeeded));

    eventually("b to start", || async {
        phases(&load_queue(&backend, "q1").await) == vec!["finished", "running", "pending"]
    })
    .await;
    let queue = load_queue(&backend, "q1").await;
    let status = queue.status.expect("status");
    assert_eq!(status.completed_scenarios, 1);
    assert_eq!(status.running_scenarios, 1);
    assert_eq!(status.phase, Phase::Running);

    token.cancel();
    worker.await.expect("worker");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_dispatches_start_exactly_one_item() {
    let backend = MemoryBackend::new();
    seed_queue(&backend, &["a", "b", "c"]).await;
    let (executor, _completions) = executor(&backend, &OperatorConfig::test_config());

    let attempts = (0..4).map(|_| {
        let executor = executor.clone();
        tokio::spawn(async move { executor.execute(&q1()).await })
    });
    let mut started = 0;
    for attempt in attempts.collect::<Vec<_>>() {
        match attempt.await.expect("join").expect("dispatch") {
            Dispatch::Started { .. } => started += 1,
            Dispatch::Busy { .. } => {}
            Dispatch::Idle => panic!("queue has pending items"),
        }
    }

    assert_eq!(started, 1);
    let queue = load_queue(&backend, "q1").await;
    assert_eq!(queue.spec.items.iter().filter(|item| item.is_running()).count(), 1);
    assert_eq!(backend.job_submissions().len(), 1);
}

#[tokio::test]
async fn drained_queue_is_idle() {
    let backend = MemoryBackend::new();
    seed_queue(&backend, &[]).await;
    let (executor, _completions) = executor(&backend, &OperatorConfig::test_config());

    let dispatch = executor.execute(&q1()).await.expect("execute");
    assert_eq!(dispatch, Dispatch::Idle);
}

#[tokio::test]
async fn stale_queue_writes_are_retried() {
    let inner = MemoryBackend::new();
    let backend = FaultInjectingBackend::with_update_conflicts(inner.clone(), "ExecutionQueue", 2);
    seed_queue(&backend, &["a", "b"]).await;
    let (executor, _completions) = executor(&backend, &OperatorConfig::test_config());

    let dispatch = executor.execute(&q1()).await.expect("execute");

    assert!(matches!(dispatch, Dispatch::Started { .. }));
    assert_eq!(backend.conflicts_remaining(), 0);
    assert!(backend.update_calls() >= 3);
    assert_eq!(phases(&load_queue(&inner, "q1").await), vec!["running", "pending"]);
}

#[tokio::test]
async fn exhausted_retries_fail_the_dispatch_without_claiming() {
    let inner = MemoryBackend::new();
    let backend = FaultInjectingBackend::with_update_conflicts(inner.clone(), "ExecutionQueue", 10);
    seed_queue(&backend, &["a"]).await;
    let config = OperatorConfig {
        update_retry: RetryConfig {
            attempts: 3,
            backoff: std::time::Duration::ZERO,
        },
        ..OperatorConfig::test_config()
    };
    let (executor, _completions) = executor(&backend, &config);

    let err = executor.execute(&q1()).await.expect_err("conflicts");

    assert!(matches!(
        err,
        QueueExecutionError::Scenario {
            source: ScenarioExecutionError::Step(StepError::Backend(BackendError::Conflict { .. })),
            ..
        }
    ));
    assert_eq!(phases(&load_queue(&inner, "q1").await), vec!["pending"]);
    assert!(inner.job_submissions().is_empty());
}

#[tokio::test]
async fn failed_preparation_leaves_the_item_running_without_a_job() {
    let inner = MemoryBackend::new();
    let backend = FaultInjectingBackend::with_mesh_failures(inner.clone());
    seed_queue(&backend, &["a"]).await;
    let mut scenario = ResourceBackend::<Scenario>::get(&backend, NS, "a")
        .await
        .expect("scenario");
    ResourceBackend::<Scenario>::delete(&backend, NS, "a")
        .await
        .expect("delete");
    scenario.spec.connectors = vec![Connector {
        name: "api-to-db".to_string(),
        source: ServiceEndpoint::new("api"),
        destination: ServiceEndpoint::new("db"),
        mesh: Some(MeshPolicy {
            retry: Some(RetryPolicy {
                attempts: 2,
                per_try_timeout_ms: None,
                retry_on: None,
            }),
            ..MeshPolicy::default()
        }),
    }];
    ResourceBackend::<Scenario>::create(&backend, &scenario)
        .await
        .expect("recreate");
    let (executor, _completions) = executor(&backend, &OperatorConfig::test_config());

    let err = executor.execute(&q1()).await.expect_err("mesh failure");

    assert!(matches!(err, QueueExecutionError::Scenario { .. }));
    assert_eq!(phases(&load_queue(&inner, "q1").await), vec!["running"]);
    assert!(inner.job_submissions().is_empty());
}

#[tokio::test]
async fn finishing_every_item_completes_the_queue() {
    let backend = MemoryBackend::new();
    seed_queue(&backend, &["a", "b", "c"]).await;
    let mut queue = load_queue(&backend, "q1").await;
    let now = Utc::now();
    for name in ["a", "b", "c"] {
        queue.start_item(name, now).expect("start");
        queue.finish_item(name, now).expect("finish");
    }
    ResourceBackend::<ExecutionQueue>::update(&backend, &queue)
        .await
        .expect("update");

    let refreshed = refresh_queue_status(&backend, RetryConfig::default(), &q1())
        .await
        .expect("refresh");

    let status = refreshed.status.expect("status");
    assert_eq!(status.completed_scenarios, 3);
    assert_eq!(status.running_scenarios, 0);
    assert_eq!(status.pending_scenarios, 0);
    assert_eq!(status.phase, Phase::Completed);
    assert!(status.completion_time.is_some());
    assert_eq!(status.execution_id.as_deref(), Some("exec-1"));
}
