mod support;

use chrono::Utc;

use resiliencebench::{
    BenchmarkReconciler, Dispatch, ExecutionQueueReconciler, OperatorConfig, ReconcileAction,
    Reconciler,
};
use resiliencebench_backend_memory::MemoryBackend;
use resiliencebench_resource_backend::ResourceBackend;
use resiliencebench_resources::{
    Benchmark, ExecutionQueue, ObjectRef, Phase, Scenario, Workload, labels,
};

use support::{
    NS, benchmark, executor, fault_template, load_queue, phases, queue, seed_queue, template,
    workload,
};

fn reconciler(backend: &MemoryBackend) -> BenchmarkReconciler<MemoryBackend> {
    let config = OperatorConfig::test_config();
    let (executor, _completions) = executor(backend, &config);
    BenchmarkReconciler::new(backend.clone(), executor, &config)
}

async fn reconcile(reconciler: &BenchmarkReconciler<MemoryBackend>, backend: &MemoryBackend, name: &str) {
    let current = ResourceBackend::<Benchmark>::get(backend, NS, name)
        .await
        .expect("load benchmark");
    let action = reconciler.reconcile(current).await.expect("reconcile");
    assert_eq!(action, ReconcileAction::Done);
}

async fn load_benchmark(backend: &MemoryBackend, name: &str) -> Benchmark {
    ResourceBackend::<Benchmark>::get(backend, NS, name)
        .await
        .expect("load benchmark")
}

async fn scenario_names(backend: &MemoryBackend) -> Vec<String> {
    let mut names: Vec<String> = ResourceBackend::<Scenario>::list(backend, Some(NS))
        .await
        .expect("list scenarios")
        .into_iter()
        .map(|scenario| scenario.metadata.name)
        .collect();
    names.sort();
    names
}

async fn queues(backend: &MemoryBackend) -> Vec<ExecutionQueue> {
    ResourceBackend::<ExecutionQueue>::list(backend, Some(NS))
        .await
        .expect("list queues")
}

#[tokio::test]
async fn benchmark_expands_into_scenarios_and_a_running_queue() {
    let backend = MemoryBackend::new();
    ResourceBackend::<Workload>::create(&backend, &workload("w1", vec![5, 10]))
        .await
        .expect("workload");
    ResourceBackend::<Benchmark>::create(
        &backend,
        &benchmark("b1", "w1", vec![template("baseline"), fault_template("abort", vec![10])]),
    )
    .await
    .expect("benchmark");
    let reconciler = reconciler(&backend);

    reconcile(&reconciler, &backend, "b1").await;

    assert_eq!(
        scenario_names(&backend).await,
        vec!["b1-abort-10u-f10", "b1-abort-5u-f10", "b1-baseline-10u", "b1-baseline-5u"]
    );
    let queue = load_queue(&backend, "b1").await;
    assert_eq!(queue.spec.items.len(), 4);
    assert_eq!(phases(&queue), vec!["running", "pending", "pending", "pending"]);
    assert_eq!(backend.job_submissions().len(), 1);

    let status = load_benchmark(&backend, "b1").await.status.expect("status");
    assert_eq!(status.total_scenarios, 4);
    assert_eq!(status.observed_generation, Some(1));
    assert_eq!(
        status.execution_id.as_deref(),
        queue.metadata.label(labels::EXECUTION_ID)
    );
}

#[tokio::test]
async fn missing_workload_fails_the_benchmark() {
    let backend = MemoryBackend::new();
    ResourceBackend::<Benchmark>::create(&backend, &benchmark("b1", "w1", vec![template("baseline")]))
        .await
        .expect("benchmark");
    let reconciler = reconciler(&backend);

    reconcile(&reconciler, &backend, "b1").await;

    let status = load_benchmark(&backend, "b1").await.status.expect("status");
    assert_eq!(status.phase, Phase::Failed);
    assert!(status.message.as_deref().is_some_and(|message| message.contains("w1")));
    assert!(scenario_names(&backend).await.is_empty());
    assert!(queues(&backend).await.is_empty());
    assert!(backend.job_submissions().is_empty());
}

#[tokio::test]
async fn missing_shared_queue_fails_without_creating_one() {
    let backend = MemoryBackend::new();
    ResourceBackend::<Workload>::create(&backend, &workload("w1", vec![10]))
        .await
        .expect("workload");
    let mut shared = benchmark("b1", "w1", vec![template("baseline")]);
    shared.spec.auto_create_queue = false;
    shared.spec.queue_name = Some("q1".to_string());
    ResourceBackend::<Benchmark>::create(&backend, &shared)
        .await
        .expect("benchmark");
    let reconciler = reconciler(&backend);

    reconcile(&reconciler, &backend, "b1").await;

    let status = load_benchmark(&backend, "b1").await.status.expect("status");
    assert_eq!(status.phase, Phase::Failed);
    assert!(status.message.as_deref().is_some_and(|message| message.contains("q1")));
    assert!(queues(&backend).await.is_empty());
    assert!(scenario_names(&backend).await.is_empty());
}

#[tokio::test]
async fn benchmark_without_scenarios_fails() {
    let backend = MemoryBackend::new();
    ResourceBackend::<Workload>::create(&backend, &workload("w1", Vec::new()))
        .await
        .expect("workload");
    ResourceBackend::<Benchmark>::create(&backend, &benchmark("b1", "w1", vec![template("baseline")]))
        .await
        .expect("benchmark");
    let reconciler = reconciler(&backend);

    reconcile(&reconciler, &backend, "b1").await;

    let status = load_benchmark(&backend, "b1").await.status.expect("status");
    assert_eq!(status.phase, Phase::Failed);
    assert_eq!(status.message.as_deref(), Some("no scenarios generated"));
    assert!(queues(&backend).await.is_empty());
}

#[tokio::test]
async fn reconciling_an_observed_generation_changes_nothing() {
    let backend = MemoryBackend::new();
    ResourceBackend::<Workload>::create(&backend, &workload("w1", vec![5, 10]))
        .await
        .expect("workload");
    ResourceBackend::<Benchmark>::create(&backend, &benchmark("b1", "w1", vec![template("baseline")]))
        .await
        .expect("benchmark");
    let reconciler = reconciler(&backend);

    reconcile(&reconciler, &backend, "b1").await;
    let first = load_queue(&backend, "b1").await;
    reconcile(&reconciler, &backend, "b1").await;
    let second = load_queue(&backend, "b1").await;

    assert_eq!(scenario_names(&backend).await.len(), 2);
    assert_eq!(queues(&backend).await.len(), 1);
    assert_eq!(phases(&second), phases(&first));
    assert_eq!(
        second.metadata.label(labels::EXECUTION_ID),
        first.metadata.label(labels::EXECUTION_ID)
    );
    assert_eq!(backend.job_submissions().len(), 1);
}

#[tokio::test]
async fn spec_change_regenerates_and_keeps_the_execution_id() {
    let backend = MemoryBackend::new();
    ResourceBackend::<Workload>::create(&backend, &workload("w1", vec![10]))
        .await
        .expect("workload");
    ResourceBackend::<Benchmark>::create(&backend, &benchmark("b1", "w1", vec![template("baseline")]))
        .await
        .expect("benchmark");
    let reconciler = reconciler(&backend);
    reconcile(&reconciler, &backend, "b1").await;
    let execution_id = load_queue(&backend, "b1")
        .await
        .metadata
        .label(labels::EXECUTION_ID)
        .map(str::to_string);

    let mut edited = load_benchmark(&backend, "b1").await;
    edited.spec.scenarios.push(template("latency"));
    ResourceBackend::<Benchmark>::update(&backend, &edited)
        .await
        .expect("update");
    reconcile(&reconciler, &backend, "b1").await;

    assert_eq!(
        scenario_names(&backend).await,
        vec!["b1-baseline-10u", "b1-latency-10u"]
    );
    let queue = load_queue(&backend, "b1").await;
    assert_eq!(phases(&queue), vec!["running", "pending"]);
    assert_eq!(
        queue.metadata.label(labels::EXECUTION_ID).map(str::to_string),
        execution_id
    );
    let status = load_benchmark(&backend, "b1").await.status.expect("status");
    assert_eq!(status.observed_generation, Some(2));
    assert_eq!(status.total_scenarios, 2);
}

#[tokio::test]
async fn shared_queue_gains_items_and_keeps_existing_ones() {
    let backend = MemoryBackend::new();
    ResourceBackend::<Workload>::create(&backend, &workload("w1", vec![10]))
        .await
        .expect("workload");
    let mut existing = queue("q1", &["other"]);
    existing.start_item("other", Utc::now()).expect("start");
    ResourceBackend::<ExecutionQueue>::create(&backend, &existing)
        .await
        .expect("queue");
    let mut shared = benchmark("b1", "w1", vec![template("baseline")]);
    shared.spec.auto_create_queue = false;
    shared.spec.queue_name = Some("q1".to_string());
    ResourceBackend::<Benchmark>::create(&backend, &shared)
        .await
        .expect("benchmark");
    let reconciler = reconciler(&backend);

    reconcile(&reconciler, &backend, "b1").await;

    let queue = load_queue(&backend, "q1").await;
    let items: Vec<&str> = queue
        .spec
        .items
        .iter()
        .map(|item| item.scenario.as_str())
        .collect();
    assert_eq!(items, vec!["other", "b1-baseline-10u"]);
    assert_eq!(phases(&queue), vec!["running", "pending"]);
    assert_eq!(queues(&backend).await.len(), 1);
    assert!(backend.job_submissions().is_empty());

    let status = load_benchmark(&backend, "b1").await.status.expect("status");
    assert_eq!(status.execution_id.as_deref(), Some("exec-1"));
}

#[tokio::test]
async fn failed_benchmark_recovers_once_the_workload_exists() {
    let backend = MemoryBackend::new();
    ResourceBackend::<Benchmark>::create(&backend, &benchmark("b1", "w1", vec![template("baseline")]))
        .await
        .expect("benchmark");
    let reconciler = reconciler(&backend);
    reconcile(&reconciler, &backend, "b1").await;
    assert_eq!(
        load_benchmark(&backend, "b1").await.status.map(|status| status.phase),
        Some(Phase::Failed)
    );

    ResourceBackend::<Workload>::create(&backend, &workload("w1", vec![10]))
        .await
        .expect("workload");
    reconcile(&reconciler, &backend, "b1").await;

    let status = load_benchmark(&backend, "b1").await.status.expect("status");
    assert_eq!(status.phase, Phase::Running);
    assert_eq!(status.observed_generation, Some(1));
    assert_eq!(phases(&load_queue(&backend, "b1").await), vec!["running"]);
}

#[tokio::test]
async fn regenerating_on_a_shared_queue_replaces_pending_items() {
    let backend = MemoryBackend::new();
    ResourceBackend::<Workload>::create(&backend, &workload("w1", vec![10]))
        .await
        .expect("workload");
    let mut existing = queue("q1", &["other"]);
    existing.start_item("other", Utc::now()).expect("start");
    ResourceBackend::<ExecutionQueue>::create(&backend, &existing)
        .await
        .expect("queue");
    let mut shared = benchmark("b1", "w1", vec![template("old")]);
    shared.spec.auto_create_queue = false;
    shared.spec.queue_name = Some("q1".to_string());
    ResourceBackend::<Benchmark>::create(&backend, &shared)
        .await
        .expect("benchmark");
    let config = OperatorConfig::test_config();
    let (executor, _completions) = executor(&backend, &config);
    let reconciler = BenchmarkReconciler::new(backend.clone(), executor.clone(), &config);

    reconcile(&reconciler, &backend, "b1").await;
    let mut edited = load_benchmark(&backend, "b1").await;
    edited.spec.scenarios = vec![template("new")];
    ResourceBackend::<Benchmark>::update(&backend, &edited)
        .await
        .expect("update");
    reconcile(&reconciler, &backend, "b1").await;

    let mut queue = load_queue(&backend, "q1").await;
    let items: Vec<&str> = queue
        .spec
        .items
        .iter()
        .map(|item| item.scenario.as_str())
        .collect();
    assert_eq!(items, vec!["other", "b1-new-10u"]);

    queue.finish_item("other", Utc::now()).expect("finish");
    ResourceBackend::<ExecutionQueue>::update(&backend, &queue)
        .await
        .expect("update queue");
    let dispatch = executor
        .execute(&ObjectRef::new(NS, "q1"))
        .await
        .expect("execute");
    assert!(matches!(dispatch, Dispatch::Started { scenario, .. } if scenario == "b1-new-10u"));
}

#[tokio::test]
async fn queue_item_with_a_missing_scenario_fails_the_queue_without_retrying() {
    let backend = MemoryBackend::new();
    seed_queue(&backend, &["a"]).await;
    ResourceBackend::<Scenario>::delete(&backend, NS, "a")
        .await
        .expect("delete scenario");
    let config = OperatorConfig::test_config();
    let (executor, _completions) = executor(&backend, &config);
    let reconciler = ExecutionQueueReconciler::new(backend.clone(), executor, &config);

    let action = reconciler
        .reconcile(load_queue(&backend, "q1").await)
        .await
        .expect("missing records are not retried");

    assert_eq!(action, ReconcileAction::Done);
    let status = load_queue(&backend, "q1").await.status.expect("status");
    assert_eq!(status.phase, Phase::Failed);
    assert!(status.message.is_some());
    assert!(backend.job_submissions().is_empty());
}

#[tokio::test]
async fn dispatch_against_a_missing_workload_fails_the_benchmark_terminally() {
    let backend = MemoryBackend::new();
    seed_queue(&backend, &["a"]).await;
    ResourceBackend::<Workload>::create(&backend, &workload("w2", vec![10]))
        .await
        .expect("workload");
    ResourceBackend::<Workload>::delete(&backend, NS, "w1")
        .await
        .expect("delete workload");
    let mut shared = benchmark("b1", "w2", vec![template("baseline")]);
    shared.spec.auto_create_queue = false;
    shared.spec.queue_name = Some("q1".to_string());
    ResourceBackend::<Benchmark>::create(&backend, &shared)
        .await
        .expect("benchmark");
    let reconciler = reconciler(&backend);

    reconcile(&reconciler, &backend, "b1").await;

    let status = load_benchmark(&backend, "b1").await.status.expect("status");
    assert_eq!(status.phase, Phase::Failed);
    assert!(status.message.as_deref().is_some_and(|message| message.contains("w1")));
    assert!(backend.job_submissions().is_empty());
}
