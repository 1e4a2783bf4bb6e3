use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::meta::{ObjectMeta, impl_resource};
use crate::status::{Phase, QueueProgress, aggregate};

/// Lifecycle of one queue item. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemPhase {
    #[default]
    Pending,
    Running,
    Finished,
}

impl ItemPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Finished => "finished",
        }
    }
}

impl std::fmt::Display for ItemPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One queue-scoped execution record for a scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub scenario: String,
    #[serde(default)]
    pub phase: ItemPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Where the load generator writes this scenario's raw output.
    pub result_file: String,
}

impl Item {
    pub fn new(scenario: impl Into<String>, result_file: impl Into<String>) -> Self {
        Self {
            scenario: scenario.into(),
            phase: ItemPhase::Pending,
            started_at: None,
            finished_at: None,
            result_file: result_file.into(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.phase == ItemPhase::Pending
    }

    pub fn is_running(&self) -> bool {
        self.phase == ItemPhase::Running
    }

    pub fn is_finished(&self) -> bool {
        self.phase == ItemPhase::Finished
    }
}

/// Rejected item transition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ItemTransitionError {
    #[error("queue has no item for scenario {0}")]
    UnknownItem(String),
    #[error("item {running} is already running")]
    AlreadyRunning { running: String },
    #[error("item {scenario} cannot move from {from} to {to}")]
    InvalidTransition {
        scenario: String,
        from: ItemPhase,
        to: ItemPhase,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionQueueSpec {
    /// Cumulative result document for every item of the queue.
    pub result_file: String,
    #[serde(default)]
    pub items: Vec<Item>,
    /// Name of the benchmark that created the queue.
    pub benchmark: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionQueueStatus {
    pub phase: Phase,
    pub total_scenarios: usize,
    pub running_scenarios: usize,
    pub completed_scenarios: usize,
    pub pending_scenarios: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reconcile_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl ExecutionQueueStatus {
    pub fn new(total: usize, execution_id: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            phase: Phase::Pending,
            total_scenarios: total,
            pending_scenarios: total,
            execution_id,
            last_reconcile_time: Some(now),
            start_time: Some(now),
            ..Self::default()
        }
    }

    /// Copy aggregated counts in. A progress that is still all-pending keeps
    /// the current phase so an earlier failure stays visible.
    pub fn apply_progress(&mut self, progress: QueueProgress, now: DateTime<Utc>) {
        self.total_scenarios = progress.total;
        self.running_scenarios = progress.running;
        self.completed_scenarios = progress.completed;
        self.pending_scenarios = progress.pending;
        match progress.phase() {
            Phase::Completed => {
                self.phase = Phase::Completed;
                self.completion_time.get_or_insert(now);
            }
            Phase::Running => self.phase = Phase::Running,
            _ => {}
        }
    }

    /// Stamp reconcile time and, when it moved, the observed generation.
    pub fn observe(&mut self, generation: i64, now: DateTime<Utc>) {
        self.last_reconcile_time = Some(now);
        if self.observed_generation != Some(generation) {
            self.observed_generation = Some(generation);
        }
    }

    pub fn mark_failed(&mut self, message: impl Into<String>, now: DateTime<Utc>) {
        self.phase = Phase::Failed;
        self.completion_time = Some(now);
        self.message = Some(message.into());
    }

    pub fn needs_reconciliation(&self, generation: i64) -> bool {
        self.observed_generation != Some(generation)
    }
}

/// Ordered collection of items executed one at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionQueue {
    pub metadata: ObjectMeta,
    pub spec: ExecutionQueueSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ExecutionQueueStatus>,
}

impl_resource!(ExecutionQueue, "ExecutionQueue");

impl ExecutionQueue {
    pub fn new(metadata: ObjectMeta, spec: ExecutionQueueSpec) -> Self {
        Self {
            metadata,
            spec,
            status: None,
        }
    }

    pub fn item(&self, scenario: &str) -> Option<&Item> {
        self.spec.items.iter().find(|item| item.scenario == scenario)
    }

    /// First pending item in declaration order.
    pub fn next_pending_item(&self) -> Option<&Item> {
        self.spec.items.iter().find(|item| item.is_pending())
    }

    pub fn running_item(&self) -> Option<&Item> {
        self.spec.items.iter().find(|item| item.is_running())
    }

    pub fn is_running(&self) -> bool {
        self.running_item().is_some()
    }

    pub fn is_done(&self) -> bool {
        self.spec.items.iter().all(Item::is_finished)
    }

    pub fn progress(&self) -> QueueProgress {
        aggregate(&self.spec.items)
    }

    /// Move `scenario` from pending to running. Refused while another item runs.
    pub fn start_item(
        &mut self,
        scenario: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ItemTransitionError> {
        if let Some(running) = self.running_item() {
            return Err(ItemTransitionError::AlreadyRunning {
                running: running.scenario.clone(),
            });
        }
        let item = self.item_mut(scenario)?;
        if !item.is_pending() {
            return Err(ItemTransitionError::InvalidTransition {
                scenario: scenario.to_string(),
                from: item.phase,
                to: ItemPhase::Running,
            });
        }
        item.phase = ItemPhase::Running;
        item.started_at = Some(now);
        Ok(())
    }

    /// Move `scenario` from running to finished.
    pub fn finish_item(
        &mut self,
        scenario: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ItemTransitionError> {
        let item = self.item_mut(scenario)?;
        if !item.is_running() {
            return Err(ItemTransitionError::InvalidTransition {
                scenario: scenario.to_string(),
                from: item.phase,
                to: ItemPhase::Finished,
            });
        }
        item.phase = ItemPhase::Finished;
        item.finished_at = Some(now);
        Ok(())
    }

    /// Recompute the status record from the items and stamp the generation.
    pub fn refresh_status(&mut self, now: DateTime<Utc>) -> QueueProgress {
        let progress = self.progress();
        let generation = self.metadata.generation;
        let execution_id = self
            .metadata
            .label(crate::labels::EXECUTION_ID)
            .map(str::to_string);
        let status = self
            .status
            .get_or_insert_with(|| ExecutionQueueStatus::new(progress.total, execution_id, now));
        status.apply_progress(progress, now);
        status.observe(generation, now);
        progress
    }

    fn item_mut(&mut self, scenario: &str) -> Result<&mut Item, ItemTransitionError> {
        self.spec
            .items
            .iter_mut()
            .find(|item| item.scenario == scenario)
            .ok_or_else(|| ItemTransitionError::UnknownItem(scenario.to_string()))
    }
}
