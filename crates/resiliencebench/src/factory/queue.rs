use std::collections::BTreeSet;

use uuid::Uuid;

use resiliencebench_resources::{
    Benchmark, ExecutionQueue, ExecutionQueueSpec, Item, ObjectMeta, Scenario, labels,
};

/// Builds execution queues and their items.
pub struct ExecutionQueueFactory;

impl ExecutionQueueFactory {
    /// A fresh queue with one pending item per scenario, in scenario order.
    pub fn create(
        benchmark: &Benchmark,
        scenarios: &[Scenario],
        results_dir: &str,
        execution_id: &str,
    ) -> ExecutionQueue {
        let queue_name = benchmark.queue_name();
        let results_dir = results_dir.trim_end_matches('/');
        let metadata = ObjectMeta::new(&benchmark.metadata.namespace, queue_name)
            .with_label(labels::EXECUTION_ID, execution_id)
            .with_label(labels::CREATED_BY, labels::CREATED_BY_VALUE)
            .with_annotation(labels::OWNED_BY, &benchmark.metadata.name);

        ExecutionQueue::new(
            metadata,
            ExecutionQueueSpec {
                result_file: format!("{results_dir}/{}.json", Uuid::new_v4()),
                items: Self::items(queue_name, scenarios, results_dir),
                benchmark: benchmark.metadata.name.clone(),
            },
        )
    }

    pub fn items(queue_name: &str, scenarios: &[Scenario], results_dir: &str) -> Vec<Item> {
        let results_dir = results_dir.trim_end_matches('/');
        scenarios
            .iter()
            .map(|scenario| {
                let name = &scenario.metadata.name;
                Item::new(name, format!("{results_dir}/{queue_name}/{name}.json"))
            })
            .collect()
    }

    /// Append pending items for scenarios the queue does not list yet.
    /// Returns how many were added; existing items are left untouched.
    pub fn append_missing(
        queue: &mut ExecutionQueue,
        scenarios: &[Scenario],
        results_dir: &str,
    ) -> usize {
        let missing: Vec<Scenario> = scenarios
            .iter()
            .filter(|scenario| queue.item(&scenario.metadata.name).is_none())
            .cloned()
            .collect();
        let items = Self::items(&queue.metadata.name, &missing, results_dir);
        let added = items.len();
        queue.spec.items.extend(items);
        added
    }

    /// Remove pending items whose scenario is in `previous` but no longer in
    /// `scenarios`. Items that already ran, and items of other owners, stay.
    pub fn remove_stale_pending(
        queue: &mut ExecutionQueue,
        previous: &BTreeSet<String>,
        scenarios: &[Scenario],
    ) -> usize {
        let current: BTreeSet<&str> = scenarios
            .iter()
            .map(|scenario| scenario.metadata.name.as_str())
            .collect();
        let before = queue.spec.items.len();
        queue.spec.items.retain(|item| {
            !(item.is_pending()
                && previous.contains(&item.scenario)
                && !current.contains(item.scenario.as_str()))
        });
        before - queue.spec.items.len()
    }
}

#[cfg(test)]
mod tests {
    use resiliencebench_resources::{BenchmarkSpec, ItemPhase, ScenarioSpec, ScenarioWorkload};

    use super::*;

    fn benchmark(queue_name: Option<&str>) -> Benchmark {
        Benchmark::new(
            ObjectMeta::new("default", "b1"),
            BenchmarkSpec {
                workload: "w1".to_string(),
                queue_name: queue_name.map(str::to_string),
                auto_create_queue: queue_name.is_none(),
                scenarios: Vec::new(),
            },
        )
    }

    fn scenario(name: &str) -> Scenario {
        Scenario::new(
            ObjectMeta::new("default", name),
            ScenarioSpec {
                scenario: "baseline".to_string(),
                workload: ScenarioWorkload {
                    workload_name: "w1".to_string(),
                    users: 1,
                },
                connectors: Vec::new(),
                fault: None,
            },
        )
    }

    #[test]
    fn queue_lists_every_scenario_as_pending() {
        let scenarios = vec![scenario("s1"), scenario("s2")];
        let queue = ExecutionQueueFactory::create(&benchmark(None), &scenarios, "/results/", "exec-1");

        assert_eq!(queue.metadata.name, "b1");
        assert_eq!(queue.metadata.label(labels::EXECUTION_ID), Some("exec-1"));
        assert_eq!(queue.metadata.annotation(labels::OWNED_BY), Some("b1"));
        assert_eq!(queue.spec.benchmark, "b1");
        assert!(queue.spec.result_file.starts_with("/results/"));
        assert!(queue.spec.result_file.ends_with(".json"));
        let items: Vec<_> = queue
            .spec
            .items
            .iter()
            .map(|item| (item.scenario.as_str(), item.phase, item.result_file.as_str()))
            .collect();
        assert_eq!(
            items,
            vec![
                ("s1", ItemPhase::Pending, "/results/b1/s1.json"),
                ("s2", ItemPhase::Pending, "/results/b1/s2.json"),
            ]
        );
    }

    #[test]
    fn shared_queue_name_is_used() {
        let queue =
            ExecutionQueueFactory::create(&benchmark(Some("shared")), &[scenario("s1")], "/r", "e");
        assert_eq!(queue.metadata.name, "shared");
        assert_eq!(queue.spec.items[0].result_file, "/r/shared/s1.json");
    }

    #[test]
    fn append_missing_keeps_existing_items() {
        let mut queue =
            ExecutionQueueFactory::create(&benchmark(Some("shared")), &[scenario("s1")], "/r", "e");
        queue.spec.items[0].phase = ItemPhase::Finished;

        let added = ExecutionQueueFactory::append_missing(
            &mut queue,
            &[scenario("s1"), scenario("s2")],
            "/r",
        );

        assert_eq!(added, 1);
        assert_eq!(queue.spec.items[0].phase, ItemPhase::Finished);
        assert_eq!(queue.spec.items[1].scenario, "s2");
        assert!(queue.spec.items[1].is_pending());
    }

    #[test]
    fn stale_pending_items_of_the_previous_set_are_removed() {
        let mut queue = ExecutionQueueFactory::create(
            &benchmark(Some("shared")),
            &[scenario("other"), scenario("old-done"), scenario("old"), scenario("kept")],
            "/r",
            "e",
        );
        queue.spec.items[1].phase = ItemPhase::Finished;
        let previous: BTreeSet<String> = ["old-done", "old", "kept"]
            .into_iter()
            .map(str::to_string)
            .collect();

        let removed = ExecutionQueueFactory::remove_stale_pending(
            &mut queue,
            &previous,
            &[scenario("kept"), scenario("new")],
        );

        assert_eq!(removed, 1);
        let items: Vec<&str> = queue
            .spec
            .items
            .iter()
            .map(|item| item.scenario.as_str())
            .collect();
        assert_eq!(items, vec!["other", "old-done", "kept"]);
    }
}
