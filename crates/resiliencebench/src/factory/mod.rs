//! Builders turning declared resources into derived ones: scenarios from a
//! benchmark, a queue from scenarios, a job descriptor from a queue item.

mod job;
mod queue;
mod scenario;

pub use self::job::JobFactory;
pub use self::queue::ExecutionQueueFactory;
pub use self::scenario::{ScenarioFactory, dns_name};
