use serde::{Deserialize, Serialize};

use crate::meta::{ObjectMeta, impl_resource};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadSpec {
    /// Virtual-user counts; every template is run once per entry.
    pub users: Vec<u32>,
    pub duration_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_config_map: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
}

/// Load profile referenced by benchmarks. Read, never written, by the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workload {
    pub metadata: ObjectMeta,
    pub spec: WorkloadSpec,
}

impl_resource!(Workload, "Workload");

impl Workload {
    pub fn new(metadata: ObjectMeta, spec: WorkloadSpec) -> Self {
        Self { metadata, spec }
    }
}
