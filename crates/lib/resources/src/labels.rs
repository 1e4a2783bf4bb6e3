//! Well-known label and annotation keys.

/// Annotation naming the benchmark a scenario (or queue) belongs to.
pub const OWNED_BY: &str = "resiliencebench.io/owned-by";

/// Label used to select every scenario generated for one benchmark.
pub const BENCHMARK: &str = "resiliencebench.io/benchmark";

/// Annotation naming the execution queue a scenario or job is scheduled on.
pub const QUEUE: &str = "resiliencebench.io/queue";

/// Annotation naming the scenario a load-generation job runs.
pub const SCENARIO: &str = "resiliencebench.io/scenario";

/// Label correlating queues and jobs across reconciliations.
pub const EXECUTION_ID: &str = "resiliencebench.io/execution-id";

/// Label set on every object created by the operator.
pub const CREATED_BY: &str = "resiliencebench.io/created-by";

pub const CREATED_BY_VALUE: &str = "resiliencebench-operator";
