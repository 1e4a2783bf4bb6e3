//! Background task draining job completions.
//!
//! Each completion runs the post-execution pipeline for its scenario and
//! then dispatches the next pending item of the same queue.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info};

use super::queue::{Dispatch, QueueExecutor};
use super::scenario::JobCompletion;
use crate::backend::OperatorBackend;

pub struct CompletionWorker<B> {
    pub executor: Arc<QueueExecutor<B>>,
    pub completions: mpsc::UnboundedReceiver<JobCompletion>,
}

impl<B: OperatorBackend> CompletionWorker<B> {
    pub async fn run(mut self, shutdown: tokio_util::sync::WaitForCancellationFutureOwned) {
        info!("completion worker started");
        let mut shutdown = std::pin::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("completion worker shutting down");
                    break;
                }
                completion = self.completions.recv() => {
                    let Some(completion) = completion else {
                        info!("completion channel closed");
                        break;
                    };
                    self.handle(completion).await;
                }
            }
        }
    }

    async fn handle(&self, completion: JobCompletion) {
        let job = completion.job.object_ref();
        let queue = match self.executor.scenario_executor().complete(&completion).await {
            Ok(queue) => queue,
            Err(err) => {
                // The item stays RUNNING; the queue stalls until it is regenerated.
                error!(%job, error = %err, "post-execution failed");
                return;
            }
        };

        match self.executor.execute(&queue).await {
            Ok(Dispatch::Started { scenario, .. }) => {
                info!(%queue, %scenario, "next queue item started");
            }
            Ok(Dispatch::Idle) => info!(%queue, "queue drained"),
            Ok(Dispatch::Busy { running }) => {
                info!(%queue, %running, "queue already advanced");
            }
            Err(err) => error!(%queue, error = %err, "failed to start next queue item"),
        }
    }
}
