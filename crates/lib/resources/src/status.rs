//! Status aggregation over queue items.

use serde::{Deserialize, Serialize};

use crate::queue::{Item, ItemPhase};

/// Lifecycle phase reported on Benchmark and ExecutionQueue status records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Phase {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Counts derived from one list of queue items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueProgress {
    pub total: usize,
    pub running: usize,
    pub completed: usize,
    pub pending: usize,
}

impl QueueProgress {
    /// `Completed` once every item finished, `Running` once any item left
    /// `Pending`, else `Pending`.
    pub fn phase(&self) -> Phase {
        if self.completed == self.total {
            Phase::Completed
        } else if self.running > 0 || self.completed > 0 {
            Phase::Running
        } else {
            Phase::Pending
        }
    }

    pub fn is_done(&self) -> bool {
        self.completed == self.total
    }
}

/// Aggregate item phases into progress counts.
pub fn aggregate<'a, I>(items: I) -> QueueProgress
where
    I: IntoIterator<Item = &'a Item>,
{
    let mut progress = QueueProgress::default();
    for item in items {
        progress.total += 1;
        match item.phase {
            ItemPhase::Pending => progress.pending += 1,
            ItemPhase::Running => progress.running += 1,
            ItemPhase::Finished => progress.completed += 1,
        }
    }
    progress
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn items(phases: &[ItemPhase]) -> Vec<Item> {
        phases
            .iter()
            .enumerate()
            .map(|(idx, phase)| {
                let mut item = Item::new(format!("scenario-{idx}"), format!("/results/{idx}.json"));
                item.phase = *phase;
                item
            })
            .collect()
    }

    #[test]
    fn untouched_items_are_pending() {
        let progress = aggregate(&items(&[ItemPhase::Pending, ItemPhase::Pending]));
        assert_eq!(progress.pending, 2);
        assert_eq!(progress.phase(), Phase::Pending);
    }

    #[test]
    fn one_running_item_marks_the_queue_running() {
        let progress = aggregate(&items(&[
            ItemPhase::Running,
            ItemPhase::Pending,
            ItemPhase::Pending,
        ]));
        assert_eq!(progress.running, 1);
        assert_eq!(progress.pending, 2);
        assert_eq!(progress.phase(), Phase::Running);
    }

    #[test]
    fn completed_items_without_running_still_count_as_running() {
        let progress = aggregate(&items(&[ItemPhase::Finished, ItemPhase::Pending]));
        assert_eq!(progress.phase(), Phase::Running);
        assert!(!progress.is_done());
    }

    #[test]
    fn all_finished_is_completed() {
        let progress = aggregate(&items(&[ItemPhase::Finished; 3]));
        assert_eq!(progress.completed, 3);
        assert_eq!(progress.phase(), Phase::Completed);
    }

    fn phase_strategy() -> impl Strategy<Value = ItemPhase> {
        prop_oneof![
            Just(ItemPhase::Pending),
            Just(ItemPhase::Running),
            Just(ItemPhase::Finished),
        ]
    }

    proptest! {
        #[test]
        fn counts_always_sum_to_total(phases in proptest::collection::vec(phase_strategy(), 0..32)) {
            let progress = aggregate(&items(&phases));
            prop_assert_eq!(progress.total, phases.len());
            prop_assert_eq!(progress.running + progress.completed + progress.pending, progress.total);
        }

        #[test]
        fn phase_follows_counts(phases in proptest::collection::vec(phase_strategy(), 1..32)) {
            let progress = aggregate(&items(&phases));
            let expected = if progress.completed == progress.total {
                Phase::Completed
            } else if progress.running > 0 || progress.completed > 0 {
                Phase::Running
            } else {
                Phase::Pending
            };
            prop_assert_eq!(progress.phase(), expected);
        }
    }
}
