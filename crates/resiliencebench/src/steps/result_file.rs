use serde_json::{Map, Value, json};
use tracing::{info, warn};

use resiliencebench_result_store::FileStore;
use resiliencebench_resources::{ExecutionQueue, Scenario};

use super::{ExecutorStep, StepError};
use crate::backend::OperatorBackend;

const CONTENT_TYPE: &str = "application/json";

/// Appends the scenario's raw result, tagged with its configuration, to the
/// queue's cumulative `{"results": [...]}` document.
pub struct ResultFileStep<B> {
    backend: B,
}

impl<B> ResultFileStep<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }
}

fn failed(message: String) -> StepError {
    StepError::Failed {
        step: "result-file",
        message,
    }
}

/// Scenario metadata merged into a raw result. Existing keys are replaced.
fn tag_result(mut result: Map<String, Value>, scenario: &Scenario) -> Map<String, Value> {
    let spec = &scenario.spec;
    result.insert("scenario".to_string(), json!(scenario.metadata.name));
    result.insert("workload_name".to_string(), json!(spec.workload.workload_name));
    result.insert("workload_users".to_string(), json!(spec.workload.users));
    if let Some(fault) = &spec.fault {
        result.insert("fault_provider".to_string(), json!(fault.provider));
        result.insert("fault_percentage".to_string(), json!(fault.percentage));
        result.insert("fault_services".to_string(), json!(fault.services));
    }
    result.insert("connectors".to_string(), spec.connectors_to_result_json());
    result
}

#[async_trait::async_trait]
impl<B: OperatorBackend> ExecutorStep for ResultFileStep<B> {
    fn name(&self) -> &'static str {
        "result-file"
    }

    fn is_applicable(&self, _scenario: &Scenario) -> bool {
        true
    }

    async fn apply(&self, scenario: &Scenario, queue: &ExecutionQueue) -> Result<(), StepError> {
        let scenario_name = scenario.metadata.name.as_str();
        let Some(item) = queue.item(scenario_name) else {
            return Err(failed(format!(
                "queue {} has no item for {scenario_name}",
                queue.metadata.name
            )));
        };

        let Some(raw) = self.backend.read_to_string(&item.result_file).await? else {
            warn!(
                scenario = scenario_name,
                path = %item.result_file,
                "scenario result not found, nothing to aggregate"
            );
            return Ok(());
        };
        let result = match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(result)) => result,
            Ok(_) => return Err(failed(format!("{} is not a JSON object", item.result_file))),
            Err(err) => return Err(failed(format!("{}: {err}", item.result_file))),
        };

        let target = &queue.spec.result_file;
        let mut document = match self.backend.read_to_string(target).await? {
            Some(existing) => serde_json::from_str::<Value>(&existing)
                .map_err(|err| failed(format!("{target}: {err}")))?,
            None => json!({ "results": [] }),
        };
        let Some(results) = document
            .get_mut("results")
            .and_then(Value::as_array_mut)
        else {
            return Err(failed(format!("{target} has no results array")));
        };
        results.push(Value::Object(tag_result(result, scenario)));
        let aggregated = results.len();

        let content = serde_json::to_string_pretty(&document)
            .map_err(|err| failed(format!("{target}: {err}")))?;
        self.backend
            .write(target, &content, Some(CONTENT_TYPE))
            .await?;
        info!(scenario = scenario_name, path = %target, aggregated, "scenario result aggregated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use resiliencebench_backend_memory::MemoryBackend;
    use resiliencebench_resources::{
        ExecutionQueueSpec, Item, ObjectMeta, ScenarioFault, ScenarioSpec, ScenarioWorkload,
    };

    use super::*;

    fn scenario(name: &str) -> Scenario {
        Scenario::new(
            ObjectMeta::new("default", name),
            ScenarioSpec {
                scenario: "faulty".to_string(),
                workload: ScenarioWorkload {
                    workload_name: "w1".to_string(),
                    users: 10,
                },
                connectors: Vec::new(),
                fault: Some(ScenarioFault {
                    provider: "envoy".to_string(),
                    percentage: 20,
                    services: vec!["db".to_string()],
                }),
            },
        )
    }

    fn queue() -> ExecutionQueue {
        ExecutionQueue::new(
            ObjectMeta::new("default", "q1"),
            ExecutionQueueSpec {
                result_file: "/results/q1.json".to_string(),
                items: vec![
                    Item::new("s1", "/results/q1/s1.json"),
                    Item::new("s2", "/results/q1/s2.json"),
                ],
                benchmark: "b1".to_string(),
            },
        )
    }

    fn aggregated(backend: &MemoryBackend) -> Value {
        let files = backend.files();
        let raw = files.get("/results/q1.json").expect("aggregate written");
        serde_json::from_str(raw).expect("json")
    }

    #[tokio::test]
    async fn results_are_tagged_and_appended() {
        let backend = MemoryBackend::new();
        backend.insert_file("/results/q1/s1.json", r#"{"metrics": {"http_reqs": 100}}"#);
        backend.insert_file("/results/q1/s2.json", r#"{"metrics": {"http_reqs": 80}}"#);
        let step = ResultFileStep::new(backend.clone());

        step.apply(&scenario("s1"), &queue()).await.expect("first");
        step.apply(&scenario("s2"), &queue()).await.expect("second");

        let document = aggregated(&backend);
        let results = document["results"].as_array().expect("results");
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["scenario"], "s1");
        assert_eq!(results[0]["metrics"]["http_reqs"], 100);
        assert_eq!(results[0]["fault_percentage"], 20);
        assert_eq!(results[0]["workload_users"], 10);
        assert_eq!(results[1]["scenario"], "s2");
    }

    #[tokio::test]
    async fn missing_result_is_skipped() {
        let backend = MemoryBackend::new();
        let step = ResultFileStep::new(backend.clone());

        step.apply(&scenario("s1"), &queue()).await.expect("tolerated");
        assert!(backend.files().is_empty());
    }

    #[tokio::test]
    async fn non_object_result_fails() {
        let backend = MemoryBackend::new();
        backend.insert_file("/results/q1/s1.json", "[1, 2, 3]");
        let step = ResultFileStep::new(backend);

        let err = step
            .apply(&scenario("s1"), &queue())
            .await
            .expect_err("rejected");
        assert!(matches!(err, StepError::Failed { step: "result-file", .. }));
    }
}
