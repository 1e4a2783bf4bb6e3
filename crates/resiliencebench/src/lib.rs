//! Resilience benchmark operator: reconciles benchmarks into scenarios and
//! execution queues, and runs each queue's scenarios one at a time as
//! load-generation jobs.

pub mod backend;
pub mod config;
pub mod controller;
pub mod executor;
pub mod factory;
pub mod manifest;
pub mod operator;
pub mod progress;
pub mod reconciler;
pub mod retry;
pub mod steps;

pub use backend::OperatorBackend;
pub use config::OperatorConfig;
pub use controller::{Controller, ControllerConfig, ReconcileAction, Reconciler};
pub use executor::{
    CompletionWorker, Dispatch, JobCompletion, QueueExecutionError, QueueExecutor,
    ScenarioExecutionError, ScenarioExecutor,
};
pub use operator::{Operator, OperatorTasks};
pub use reconciler::{BenchmarkReconciler, ExecutionQueueReconciler, ReconcileError};
pub use retry::{RetryConfig, with_retry};
