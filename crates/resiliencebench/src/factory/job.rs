use std::collections::BTreeMap;

use resiliencebench_cluster_backend::JobDescriptor;
use resiliencebench_resources::{ExecutionQueue, Item, Scenario, Workload, labels};

const SCRIPT_PATH: &str = "/scripts/script.js";

/// Builds load-generator job descriptors. The job is named after its
/// scenario, so at most one job per scenario exists at a time.
#[derive(Debug, Clone)]
pub struct JobFactory {
    image: String,
}

impl JobFactory {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
        }
    }

    pub fn create(
        &self,
        scenario: &Scenario,
        queue: &ExecutionQueue,
        item: &Item,
        workload: &Workload,
    ) -> JobDescriptor {
        let mut job_labels = BTreeMap::from([(
            labels::CREATED_BY.to_string(),
            labels::CREATED_BY_VALUE.to_string(),
        )]);
        if let Some(execution_id) = queue.metadata.label(labels::EXECUTION_ID) {
            job_labels.insert(labels::EXECUTION_ID.to_string(), execution_id.to_string());
        }
        let annotations = BTreeMap::from([
            (labels::SCENARIO.to_string(), scenario.metadata.name.clone()),
            (labels::QUEUE.to_string(), queue.metadata.name.clone()),
        ]);

        let mut env = BTreeMap::from([(
            "RESILIENCEBENCH_SCENARIO".to_string(),
            scenario.metadata.name.clone(),
        )]);
        if let Some(target_url) = &workload.spec.target_url {
            env.insert("TARGET_URL".to_string(), target_url.clone());
        }

        let args = vec![
            "run".to_string(),
            "--vus".to_string(),
            scenario.spec.workload.users.to_string(),
            "--duration".to_string(),
            format!("{}s", workload.spec.duration_seconds),
            "--summary-export".to_string(),
            item.result_file.clone(),
            SCRIPT_PATH.to_string(),
        ];

        JobDescriptor {
            namespace: scenario.metadata.namespace.clone(),
            name: scenario.metadata.name.clone(),
            labels: job_labels,
            annotations,
            image: self.image.clone(),
            args,
            env,
            result_file: item.result_file.clone(),
        }
    }
}
