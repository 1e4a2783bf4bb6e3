//! Reconcilers driven by [`crate::controller::Controller`].

mod benchmark;
mod queue;

use resiliencebench_backends_core::BackendError;

use crate::executor::QueueExecutionError;

pub use self::benchmark::BenchmarkReconciler;
pub use self::queue::ExecutionQueueReconciler;

/// A reconciliation pass that should be retried after the controller's
/// error backoff.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Queue(#[from] QueueExecutionError),
}
