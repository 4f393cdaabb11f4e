//! Retry-forever with a fixed delay.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::SessionError;

/// Fixed-delay retry policy shared by every remote call in a session.
///
/// Retryable failures (see [`SessionError::is_retryable`]) are reported to the
/// caller's `on_failure` hook and retried after `delay`, without bound. Any
/// other error is returned immediately. Cancellation is observed between
/// attempts, never in the middle of one.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Run `operation` until it succeeds or fails with a non-retryable error.
    ///
    /// Returns [`SessionError::Cancelled`] once `cancel` fires.
    pub async fn run<F, Fut, T, R>(
        &self,
        cancel: &CancellationToken,
        mut on_failure: R,
        mut operation: F,
    ) -> Result<T, SessionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SessionError>>,
        R: FnMut(&SessionError),
    {
        let mut attempt: u64 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(SessionError::Cancelled);
            }
            attempt += 1;
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => {
                    tracing::warn!(
                        attempt,
                        delay_secs = self.delay.as_secs_f64(),
                        error = %e,
                        "Remote call failed, retrying"
                    );
                    on_failure(&e);
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(SessionError::Cancelled),
                        _ = tokio::time::sleep(self.delay) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}
