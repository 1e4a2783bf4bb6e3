//! Dispatch of queue items onto load-generation jobs.
//!
//! [`QueueExecutor`] picks the next pending item of a queue and hands it to
//! [`ScenarioExecutor`], which prepares the scenario and submits its job.
//! Job completion arrives asynchronously on a channel drained by
//! [`CompletionWorker`], which finishes the item and dispatches the next one.

mod completion;
mod queue;
mod scenario;

pub use self::completion::CompletionWorker;
pub use self::queue::{Dispatch, QueueExecutionError, QueueExecutor};
pub use self::scenario::{JobCompletion, ScenarioExecutionError, ScenarioExecutor};
