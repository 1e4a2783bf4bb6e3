//! Execution queue watchdog. Restarts queues that have pending items but
//! nothing running, which is how a queue recovers from a lost completion.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use resiliencebench_backends_core::BackendResult;
use resiliencebench_resource_backend::ResourceBackend;
use resiliencebench_resources::{ExecutionQueue, ExecutionQueueStatus, ObjectRef, Resource};

use super::ReconcileError;
use crate::backend::OperatorBackend;
use crate::config::OperatorConfig;
use crate::controller::{ReconcileAction, Reconciler};
use crate::executor::{Dispatch, QueueExecutor};
use crate::progress::refresh_queue_status;
use crate::retry::{RetryConfig, with_retry};

pub struct ExecutionQueueReconciler<B> {
    backend: B,
    executor: Arc<QueueExecutor<B>>,
    retry: RetryConfig,
}

impl<B: OperatorBackend> ExecutionQueueReconciler<B> {
    pub fn new(backend: B, executor: Arc<QueueExecutor<B>>, config: &OperatorConfig) -> Self {
        Self {
            backend,
            executor,
            retry: config.update_retry,
        }
    }

    async fn record_failure(&self, key: &ObjectRef, message: &str) -> BackendResult<()> {
        let backend = &self.backend;
        with_retry(self.retry, "record queue failure", || async move {
            let Some(mut latest) =
                ResourceBackend::<ExecutionQueue>::find(backend, &key.namespace, &key.name).await?
            else {
                return Ok(());
            };
            latest
                .status
                .get_or_insert_with(ExecutionQueueStatus::default)
                .mark_failed(message, Utc::now());
            ResourceBackend::<ExecutionQueue>::update_status(backend, &latest)
                .await
                .map(|_| ())
        })
        .await
    }
}

#[async_trait::async_trait]
impl<B: OperatorBackend> Reconciler<ExecutionQueue> for ExecutionQueueReconciler<B> {
    type Error = ReconcileError;

    async fn reconcile(&self, queue: ExecutionQueue) -> Result<ReconcileAction, ReconcileError> {
        let key = queue.object_ref();
        let refreshed = match refresh_queue_status(&self.backend, self.retry, &key).await {
            Ok(refreshed) => refreshed,
            Err(err) if err.is_not_found() => {
                debug!(queue = %key, "queue deleted during reconciliation");
                return Ok(ReconcileAction::Done);
            }
            Err(err) => return Err(err.into()),
        };

        let progress = refreshed.progress();
        if progress.is_done() {
            debug!(queue = %key, total = progress.total, "queue done");
            return Ok(ReconcileAction::Done);
        }
        if progress.running > 0 || progress.pending == 0 {
            return Ok(ReconcileAction::Done);
        }

        match self.executor.execute(&key).await {
            Ok(Dispatch::Started { scenario, .. }) => {
                info!(queue = %key, %scenario, "stalled queue restarted");
                Ok(ReconcileAction::Done)
            }
            Ok(_) => Ok(ReconcileAction::Done),
            Err(err) if err.is_not_found() => {
                warn!(queue = %key, error = %err, "queue item references a missing record");
                self.record_failure(&key, &err.to_string()).await?;
                Ok(ReconcileAction::Done)
            }
            Err(err) => {
                warn!(queue = %key, error = %err, "queue dispatch failed");
                self.record_failure(&key, &err.to_string()).await?;
                Err(err.into())
            }
        }
    }
}
