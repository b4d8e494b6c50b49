//! Bounded retries with exponential, jittered backoff.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use rand::Rng;
use thiserror::Error;

use crate::clock::Clock;
use crate::errors::{RetryClass, UpstreamError};

/// Default cap on a single backoff delay.
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Retry and backoff parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total invocations = `max_retries + 1`.
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub backoff_multiplier: f64,
    /// Each delay is scaled by a random factor in `[1 - j, 1 + j]`.
    pub jitter_fraction: f64,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            jitter_fraction: 0.25,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based), before jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.max(1.0).powi(attempt as i32);
        let secs = self.base_backoff.as_secs_f64() * factor;
        let capped = secs.min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    /// Delay before retry number `attempt`, with jitter applied.
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        let jitter = self.jitter_fraction.clamp(0.0, 1.0);
        if jitter == 0.0 || base.is_zero() {
            return base;
        }

        let factor = rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter));
        base.mul_f64(factor)
    }
}

/// Failure of a retried call.
#[derive(Error, Debug)]
pub enum RetryError {
    /// The error was classified fatal; the call was not retried.
    #[error("fatal upstream error: {0}")]
    Fatal(#[source] UpstreamError),

    /// Every attempt failed transiently.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: UpstreamError,
    },
}

/// Runs an upstream call under a [`RetryPolicy`].
pub struct RetryExecutor {
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy, clock: Arc<dyn Clock>) -> Self {
        Self { policy, clock }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Invoke `call` until it succeeds, fails fatally, or runs out of retries.
    ///
    /// `label` only appears in log lines.
    pub async fn execute<T, F, Fut>(&self, label: &str, mut call: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            let error = match call().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if error.retry_class() == RetryClass::Never {
                info!("{}: fatal error, not retrying: {}", label, error);
                return Err(RetryError::Fatal(error));
            }

            if attempt >= self.policy.max_retries {
                warn!(
                    "{}: failed after {} attempts: {}",
                    label,
                    attempt + 1,
                    error
                );
                return Err(RetryError::Exhausted {
                    attempts: attempt + 1,
                    last: error,
                });
            }

            let delay = self.policy.jittered_delay(attempt);
            warn!(
                "{}: attempt {}/{} failed ({}), retrying in {:?}",
                label,
                attempt + 1,
                self.policy.max_retries + 1,
                error,
                delay
            );
            self.clock.sleep(delay).await;
            attempt += 1;
        }
    }
}
