use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::meta::{ObjectMeta, impl_resource};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl EnvVar {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResilientServiceSpec {
    /// Labels identifying the target deployment.
    #[serde(default)]
    pub selector: BTreeMap<String, String>,
    /// Environment captured before the last override.
    #[serde(default)]
    pub envs: Vec<EnvVar>,
    pub app_container_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault_container_name: Option<String>,
}

/// A service under test, mapping a connector endpoint name to a deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResilientService {
    pub metadata: ObjectMeta,
    pub spec: ResilientServiceSpec,
}

impl_resource!(ResilientService, "ResilientService");

impl ResilientService {
    pub fn new(metadata: ObjectMeta, spec: ResilientServiceSpec) -> Self {
        Self { metadata, spec }
    }
}
