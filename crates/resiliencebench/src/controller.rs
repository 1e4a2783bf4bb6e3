//! Level-triggered control loop over one resource kind.
//!
//! Keys arrive from the backend's change watch, from a periodic resync of
//! every record and from requeues. A key is never handled by two tasks at
//! once: a key that arrives while its handler runs is marked dirty and run
//! again when the handler finishes. Different keys are handled concurrently.

use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::{Id as TaskId, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use resiliencebench_resource_backend::ResourceBackend;
use resiliencebench_resources::{ObjectRef, Resource};

use crate::config::OperatorConfig;

/// What the controller should do with a key after a successful pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    Done,
    RequeueAfter(Duration),
}

#[async_trait::async_trait]
pub trait Reconciler<T: Resource>: Send + Sync {
    type Error: std::fmt::Display + Send;

    /// Bring the world in line with `resource`. Errors requeue the key after
    /// the controller's error backoff.
    async fn reconcile(&self, resource: T) -> Result<ReconcileAction, Self::Error>;
}

#[derive(Debug, Clone, Copy)]
pub struct ControllerConfig {
    pub resync_interval: Duration,
    pub error_backoff: Duration,
}

impl From<&OperatorConfig> for ControllerConfig {
    fn from(config: &OperatorConfig) -> Self {
        Self {
            resync_interval: config.resync_interval,
            error_backoff: config.error_backoff,
        }
    }
}

pub struct Controller<T, B, R> {
    pub backend: B,
    pub reconciler: Arc<R>,
    pub config: ControllerConfig,
    _kind: PhantomData<fn() -> T>,
}

impl<T, B, R> Controller<T, B, R>
where
    T: Resource,
    B: ResourceBackend<T> + Clone + 'static,
    R: Reconciler<T> + 'static,
{
    pub fn new(backend: B, reconciler: Arc<R>, config: ControllerConfig) -> Self {
        Self {
            backend,
            reconciler,
            config,
            _kind: PhantomData,
        }
    }

    pub async fn run(self, shutdown: tokio_util::sync::WaitForCancellationFutureOwned) {
        info!(
            kind = T::KIND,
            resync_interval_ms = self.config.resync_interval.as_millis(),
            "controller started"
        );

        let mut shutdown = std::pin::pin!(shutdown);
        let mut changes = self.backend.watch();
        let mut resync = tokio::time::interval(self.config.resync_interval);
        resync.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let (requeue_tx, mut requeues) = mpsc::unbounded_channel::<ObjectRef>();

        let mut queue = WorkQueue::default();
        let mut handlers: JoinSet<Option<Duration>> = JoinSet::new();
        let mut timers: JoinSet<()> = JoinSet::new();

        loop {
            let ready = tokio::select! {
                _ = &mut shutdown => {
                    info!(kind = T::KIND, "controller shutting down");
                    break;
                }
                _ = resync.tick() => match self.backend.list(None).await {
                    Ok(resources) => resources.iter().map(Resource::object_ref).collect(),
                    Err(err) => {
                        warn!(kind = T::KIND, error = %err, "resync listing failed");
                        Vec::new()
                    }
                },
                Some(key) = changes.next() => vec![key],
                Some(key) = requeues.recv() => vec![key],
                Some(joined) = handlers.join_next_with_id() => {
                    let (id, requeue_after) = match joined {
                        Ok((id, requeue_after)) => (id, requeue_after),
                        Err(err) => {
                            error!(kind = T::KIND, error = %err, "reconcile task panicked");
                            (err.id(), Some(self.config.error_backoff))
                        }
                    };
                    let Some((key, rerun)) = queue.finish(id) else {
                        continue;
                    };
                    if let Some(delay) = requeue_after.filter(|_| !rerun) {
                        let requeue_tx = requeue_tx.clone();
                        let key = key.clone();
                        timers.spawn(async move {
                            tokio::time::sleep(delay).await;
                            let _ = requeue_tx.send(key);
                        });
                    }
                    if rerun { vec![key] } else { Vec::new() }
                }
                Some(_) = timers.join_next() => Vec::new(),
            };

            for key in ready {
                if !queue.claim(&key) {
                    debug!(kind = T::KIND, %key, "reconcile in flight, marked dirty");
                    continue;
                }
                let handle = handlers.spawn(handle_key::<T, B, R>(
                    self.backend.clone(),
                    Arc::clone(&self.reconciler),
                    key.clone(),
                    self.config.error_backoff,
                ));
                queue.started(handle.id(), key);
            }
        }

        handlers.shutdown().await;
        timers.shutdown().await;
    }
}

/// Keys with a handler in flight, and which of them changed meanwhile.
#[derive(Default)]
struct WorkQueue {
    in_flight: HashSet<ObjectRef>,
    dirty: HashSet<ObjectRef>,
    tasks: HashMap<TaskId, ObjectRef>,
}

impl WorkQueue {
    /// False if the key is already being handled; it is then marked dirty.
    fn claim(&mut self, key: &ObjectRef) -> bool {
        if self.in_flight.insert(key.clone()) {
            return true;
        }
        self.dirty.insert(key.clone());
        false
    }

    fn started(&mut self, id: TaskId, key: ObjectRef) {
        self.tasks.insert(id, key);
    }

    /// Release the key handled by task `id`, reporting whether it must run again.
    fn finish(&mut self, id: TaskId) -> Option<(ObjectRef, bool)> {
        let key = self.tasks.remove(&id)?;
        self.in_flight.remove(&key);
        let rerun = self.dirty.remove(&key);
        Some((key, rerun))
    }
}

async fn handle_key<T, B, R>(
    backend: B,
    reconciler: Arc<R>,
    key: ObjectRef,
    error_backoff: Duration,
) -> Option<Duration>
where
    T: Resource,
    B: ResourceBackend<T>,
    R: Reconciler<T>,
{
    let resource = match backend.find(&key.namespace, &key.name).await {
        Ok(Some(resource)) => resource,
        Ok(None) => {
            debug!(kind = T::KIND, %key, "resource gone, nothing to reconcile");
            return None;
        }
        Err(err) => {
            warn!(kind = T::KIND, %key, error = %err, "failed to load resource");
            return Some(error_backoff);
        }
    };

    match reconciler.reconcile(resource).await {
        Ok(ReconcileAction::Done) => None,
        Ok(ReconcileAction::RequeueAfter(delay)) => Some(delay),
        Err(err) => {
            error!(kind = T::KIND, %key, error = %err, "reconcile failed");
            Some(error_backoff)
        }
    }
}
