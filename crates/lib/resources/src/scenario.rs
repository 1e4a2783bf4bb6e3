use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::meta::{ObjectMeta, impl_resource};

/// One side of a connector: a service name plus environment overrides.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEndpoint {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub envs: BTreeMap<String, Value>,
}

impl ServiceEndpoint {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            envs: BTreeMap::new(),
        }
    }

    pub fn with_env(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.envs.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_try_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_on: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerPolicy {
    pub consecutive_errors: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_ejection_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_ejection_percent: Option<u32>,
}

/// Fault injected between the two sides of a connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorFault {
    pub percentage: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_http_status: Option<u16>,
}

impl ConnectorFault {
    /// A fault with neither a delay nor an abort configures nothing.
    pub fn is_effective(&self) -> bool {
        self.delay_ms.is_some() || self.abort_http_status.is_some()
    }
}

/// Resilience policies applied through the service mesh for one connector.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circuit_breaker: Option<CircuitBreakerPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<ConnectorFault>,
}

/// A directed edge between two services in a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connector {
    pub name: String,
    pub source: ServiceEndpoint,
    pub destination: ServiceEndpoint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh: Option<MeshPolicy>,
}

impl Connector {
    /// Flattened form used in result documents: `source`, `destination`,
    /// `{side}_env_{KEY}` for every override, then the mesh policy fields.
    pub fn to_result_json(&self) -> Value {
        let mut object = Map::new();
        object.insert("name".to_string(), Value::String(self.name.clone()));
        flatten_endpoint(&mut object, "source", &self.source);
        flatten_endpoint(&mut object, "destination", &self.destination);
        if let Some(mesh) = &self.mesh
            && let Ok(Value::Object(fields)) = serde_json::to_value(mesh)
        {
            object.extend(fields);
        }
        Value::Object(object)
    }
}

fn flatten_endpoint(object: &mut Map<String, Value>, side: &str, endpoint: &ServiceEndpoint) {
    object.insert(side.to_string(), Value::String(endpoint.name.clone()));
    for (key, value) in &endpoint.envs {
        object.insert(format!("{side}_env_{key}"), value.clone());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioWorkload {
    pub workload_name: String,
    pub users: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioFault {
    pub provider: String,
    pub percentage: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioSpec {
    /// Name of the template this scenario was expanded from.
    pub scenario: String,
    pub workload: ScenarioWorkload,
    #[serde(default)]
    pub connectors: Vec<Connector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<ScenarioFault>,
}

impl ScenarioSpec {
    pub fn connectors_to_result_json(&self) -> Value {
        Value::Array(
            self.connectors
                .iter()
                .map(Connector::to_result_json)
                .collect(),
        )
    }
}

/// One concrete, immutable run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub metadata: ObjectMeta,
    pub spec: ScenarioSpec,
}

impl_resource!(Scenario, "Scenario");

impl Scenario {
    pub fn new(metadata: ObjectMeta, spec: ScenarioSpec) -> Self {
        Self { metadata, spec }
    }
}
