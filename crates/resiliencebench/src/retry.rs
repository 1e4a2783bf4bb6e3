//! Bounded retry for optimistic writes.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use resiliencebench_backends_core::BackendError;

/// Errors that may succeed when the same operation is retried on fresh state.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for BackendError {
    fn is_transient(&self) -> bool {
        BackendError::is_transient(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Fixed delay between attempts.
    pub backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

/// Run `operation` until it succeeds, fails permanently, or exhausts
/// `config.attempts`. Each attempt must re-read whatever state it writes.
pub async fn with_retry<T, E, F, Fut>(config: RetryConfig, what: &str, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + std::fmt::Display,
{
    let attempts = config.attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < attempts => {
                warn!(
                    operation = what,
                    attempt,
                    attempts,
                    error = %err,
                    "transient failure, retrying"
                );
                tokio::time::sleep(config.backoff).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
