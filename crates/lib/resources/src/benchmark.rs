use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::meta::{ObjectMeta, impl_resource};
use crate::scenario::Connector;
use crate::status::{Phase, QueueProgress};

/// Fault sweep declared on a scenario template: one scenario per percentage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaultTemplate {
    pub provider: String,
    #[serde(default)]
    pub percentage: Vec<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<String>,
}

/// Template expanded into concrete scenarios. Connector environment values
/// given as arrays are expanded into one scenario per combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioTemplate {
    pub name: String,
    #[serde(default)]
    pub connectors: Vec<Connector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<FaultTemplate>,
}

fn default_auto_create_queue() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkSpec {
    pub workload: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_name: Option<String>,
    #[serde(default = "default_auto_create_queue")]
    pub auto_create_queue: bool,
    #[serde(default)]
    pub scenarios: Vec<ScenarioTemplate>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkStatus {
    pub phase: Phase,
    pub total_scenarios: usize,
    pub running_scenarios: usize,
    pub completed_scenarios: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reconcile_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl BenchmarkStatus {
    /// Fresh status for a newly observed generation.
    pub fn new(total: usize, execution_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            phase: Phase::Pending,
            total_scenarios: total,
            execution_id: Some(execution_id.into()),
            last_reconcile_time: Some(now),
            start_time: Some(now),
            ..Self::default()
        }
    }

    /// Record a failed pass. The generation stays unobserved so the next
    /// pass reprocesses it.
    pub fn mark_failed(&mut self, message: impl Into<String>, now: DateTime<Utc>) {
        self.phase = Phase::Failed;
        self.message = Some(message.into());
        self.last_reconcile_time = Some(now);
        self.observed_generation = None;
    }

    pub fn apply_progress(&mut self, progress: QueueProgress, now: DateTime<Utc>) {
        self.total_scenarios = progress.total;
        self.running_scenarios = progress.running;
        self.completed_scenarios = progress.completed;
        match progress.phase() {
            Phase::Completed => {
                self.phase = Phase::Completed;
                self.completion_time.get_or_insert(now);
            }
            Phase::Running => self.phase = Phase::Running,
            _ => {}
        }
    }

    pub fn observe(&mut self, generation: i64, now: DateTime<Utc>) {
        self.last_reconcile_time = Some(now);
        if self.observed_generation != Some(generation) {
            self.observed_generation = Some(generation);
        }
    }

    pub fn needs_reconciliation(&self, generation: i64) -> bool {
        self.observed_generation != Some(generation)
    }
}

/// A user-declared resilience test campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Benchmark {
    pub metadata: ObjectMeta,
    pub spec: BenchmarkSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<BenchmarkStatus>,
}

impl_resource!(Benchmark, "Benchmark");

impl Benchmark {
    pub fn new(metadata: ObjectMeta, spec: BenchmarkSpec) -> Self {
        Self {
            metadata,
            spec,
            status: None,
        }
    }

    /// Queue this benchmark schedules on: `queueName`, else its own name.
    pub fn queue_name(&self) -> &str {
        self.spec
            .queue_name
            .as_deref()
            .unwrap_or(&self.metadata.name)
    }
}
