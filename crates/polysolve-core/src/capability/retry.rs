//! Call controls: per-attempt timeout, retry with exponential backoff, and
//! cooperative cancellation.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};

use super::error::{CapabilityError, CapabilityResult};

/// Retry bounds for external calls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    /// Maximum wall-clock time for a single attempt (milliseconds).
    pub timeout_ms: u64,
    /// Maximum number of retries (0 = no retries, run once).
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries (milliseconds).
    pub backoff_base_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_retries: 2,
            backoff_base_ms: 250,
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry that follows failed attempt `attempt` (1-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.backoff_base_ms.saturating_mul(factor))
    }
}

/// Sender half of a run's cancellation signal.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Signal cancellation to every clone of the paired [`CancelSignal`].
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Receiver half of a run's cancellation signal; cheap to clone into tasks.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is signalled; pends forever otherwise.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // Sender dropped without cancelling.
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Create a linked cancellation handle and signal.
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

/// Run `call` under `policy`, racing every attempt and backoff against `cancel`.
///
/// Retryable errors (transient, per-attempt timeout) are retried up to
/// `max_retries` times with exponential backoff; other errors return at once.
/// Cancellation returns [`CapabilityError::Cancelled`] at the next suspension
/// point, dropping the in-flight attempt.
pub async fn call_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancelSignal,
    operation: &str,
    mut call: F,
) -> CapabilityResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CapabilityResult<T>>,
{
    let max_attempts = policy.max_retries.saturating_add(1);
    let timeout = Duration::from_millis(policy.timeout_ms);
    let mut attempt = 0;

    loop {
        attempt += 1;
        if cancel.is_cancelled() {
            return Err(CapabilityError::Cancelled);
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CapabilityError::Cancelled),
            r = tokio::time::timeout(timeout, call()) => r,
        };

        let err = match outcome {
            Ok(Ok(value)) => {
                if attempt > 1 {
                    debug!(operation, attempt, "capability call succeeded after retry");
                }
                return Ok(value);
            }
            Ok(Err(err)) => err,
            Err(_elapsed) => CapabilityError::Timeout {
                limit_ms: policy.timeout_ms,
            },
        };

        if !err.is_retryable() || attempt >= max_attempts {
            return Err(err);
        }

        let delay = policy.backoff_delay(attempt);
        warn!(
            operation,
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "retrying capability call"
        );
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CapabilityError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
