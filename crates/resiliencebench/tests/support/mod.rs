//! Fixtures shared by the integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use resiliencebench::{
    JobCompletion, OperatorBackend, OperatorConfig, QueueExecutor, ScenarioExecutor,
};
use resiliencebench_resource_backend::ResourceBackend;
use resiliencebench_resources::{
    Benchmark, BenchmarkSpec, ExecutionQueue, ExecutionQueueSpec, FaultTemplate, Item, ObjectMeta,
    Scenario, ScenarioSpec, ScenarioTemplate, ScenarioWorkload, Workload, WorkloadSpec, labels,
};

pub const NS: &str = "default";

pub fn workload(name: &str, users: Vec<u32>) -> Workload {
    Workload::new(
        ObjectMeta::new(NS, name),
        WorkloadSpec {
            users,
            duration_seconds: 30,
            script_config_map: None,
            target_url: Some("http://api:8080".to_string()),
        },
    )
}

pub fn template(name: &str) -> ScenarioTemplate {
    ScenarioTemplate {
        name: name.to_string(),
        connectors: Vec::new(),
        fault: None,
    }
}

pub fn fault_template(name: &str, percentages: Vec<u32>) -> ScenarioTemplate {
    ScenarioTemplate {
        fault: Some(FaultTemplate {
            provider: "envoy".to_string(),
            percentage: percentages,
            services: vec!["db".to_string()],
        }),
        ..template(name)
    }
}

pub fn benchmark(name: &str, workload: &str, scenarios: Vec<ScenarioTemplate>) -> Benchmark {
    Benchmark::new(
        ObjectMeta::new(NS, name),
        BenchmarkSpec {
            workload: workload.to_string(),
            queue_name: None,
            auto_create_queue: true,
            scenarios,
        },
    )
}

pub fn scenario(name: &str, queue: &str) -> Scenario {
    Scenario::new(
        ObjectMeta::new(NS, name).with_annotation(labels::QUEUE, queue),
        ScenarioSpec {
            scenario: "baseline".to_string(),
            workload: ScenarioWorkload {
                workload_name: "w1".to_string(),
                users: 10,
            },
            connectors: Vec::new(),
            fault: None,
        },
    )
}

pub fn queue(name: &str, scenarios: &[&str]) -> ExecutionQueue {
    ExecutionQueue::new(
        ObjectMeta::new(NS, name).with_label(labels::EXECUTION_ID, "exec-1"),
        ExecutionQueueSpec {
            result_file: format!("/results/{name}.json"),
            items: scenarios
                .iter()
                .map(|scenario| Item::new(*scenario, format!("/results/{name}/{scenario}.json")))
                .collect(),
            benchmark: "b1".to_string(),
        },
    )
}

/// Workload `w1`, one scenario per name and a queue `q1` listing them.
pub async fn seed_queue<B: OperatorBackend>(backend: &B, scenarios: &[&str]) {
    ResourceBackend::<Workload>::create(backend, &workload("w1", vec![10]))
        .await
        .expect("create workload");
    for name in scenarios {
        ResourceBackend::<Scenario>::create(backend, &scenario(name, "q1"))
            .await
            .expect("create scenario");
    }
    ResourceBackend::<ExecutionQueue>::create(backend, &queue("q1", scenarios))
        .await
        .expect("create queue");
}

pub async fn load_queue<B: OperatorBackend>(backend: &B, name: &str) -> ExecutionQueue {
    ResourceBackend::<ExecutionQueue>::get(backend, NS, name)
        .await
        .expect("load queue")
}

pub fn phases(queue: &ExecutionQueue) -> Vec<&'static str> {
    queue
        .spec
        .items
        .iter()
        .map(|item| item.phase.as_str())
        .collect()
}

pub fn executor<B: OperatorBackend>(
    backend: &B,
    config: &OperatorConfig,
) -> (Arc<QueueExecutor<B>>, mpsc::UnboundedReceiver<JobCompletion>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let scenarios =
        ScenarioExecutor::new(backend.clone(), config, sender, CancellationToken::new());
    (
        Arc::new(QueueExecutor::new(backend.clone(), scenarios)),
        receiver,
    )
}

/// Poll `check` until it passes or five seconds elapse.
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let reached = tokio::time::timeout(Duration::from_secs(5), async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(reached.is_ok(), "timed out waiting for {what}");
}
