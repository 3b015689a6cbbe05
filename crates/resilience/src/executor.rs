//! Retry executor.
//!
//! Runs an async operation until it succeeds, fails with an error the
//! classifier rejects, or uses up `max_attempts`:
//! 1. `Ok` is returned immediately.
//! 2. A non-retryable error is returned immediately as
//!    [`RetryError::NonRetryable`], with no delay.
//! 3. A retryable error with attempts left suspends the task for the
//!    back-off delay (a tokio timer, not a blocked thread) and loops.
//! 4. A retryable error on the final attempt is returned as
//!    [`RetryError::Exhausted`].
//!
//! The operation must be safe to repeat. There is no deduplication.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{error, warn};

use crate::backoff::{Backoff, ExponentialBackoff, DEFAULT_BASE_DELAY, DEFAULT_JITTER, DEFAULT_MAX_DELAY};
use crate::classify::{Classifier, TransientClassifier};
use crate::RetryError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the executor and its default back-off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total number of attempts, the first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            jitter: DEFAULT_JITTER,
        }
    }
}

// ---------------------------------------------------------------------------
// Per-retry report
// ---------------------------------------------------------------------------

/// One failed attempt that is about to be retried.
#[derive(Debug)]
pub struct RetryAttempt<'a, E> {
    /// 0-based index of the attempt that failed.
    pub attempt: u32,
    pub error: &'a E,
    /// How long the executor will sleep before the next attempt.
    pub delay: Duration,
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Run `operation` with retries. See the module docs for the contract.
pub async fn with_retry<T, E, F, Fut, B, C>(
    operation: F,
    label: &str,
    max_attempts: u32,
    policy: &B,
    classifier: &C,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    B: Backoff + ?Sized,
    C: Classifier<E> + ?Sized,
{
    with_retry_observed(operation, label, max_attempts, policy, classifier, |_| {}).await
}

/// Like [`with_retry`], additionally calling `on_retry` before each sleep.
///
/// `max_attempts` of zero is treated as one.
pub async fn with_retry_observed<T, E, F, Fut, B, C, O>(
    mut operation: F,
    label: &str,
    max_attempts: u32,
    policy: &B,
    classifier: &C,
    mut on_retry: O,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    B: Backoff + ?Sized,
    C: Classifier<E> + ?Sized,
    O: FnMut(&RetryAttempt<'_, E>),
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !classifier.is_retryable(&err) {
            return Err(RetryError::NonRetryable(err));
        }

        if attempt + 1 >= max_attempts {
            error!("{label} failed after {max_attempts} attempts");
            return Err(RetryError::Exhausted {
                attempts: max_attempts,
                last: err,
            });
        }

        let delay = policy.delay(attempt);
        warn!(
            "{} failed (attempt {}/{}): {}. Retrying in {:.0}s...",
            label,
            attempt + 1,
            max_attempts,
            err,
            delay.as_secs_f64().round()
        );
        on_retry(&RetryAttempt {
            attempt,
            error: &err,
            delay,
        });

        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

// ---------------------------------------------------------------------------
// RetryExecutor
// ---------------------------------------------------------------------------

/// A reusable bundle of attempt bound, back-off policy and classifier.
#[derive(Debug, Clone)]
pub struct RetryExecutor<B = ExponentialBackoff, C = TransientClassifier> {
    max_attempts: u32,
    backoff: B,
    classifier: C,
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}

impl RetryExecutor {
    pub fn new(config: &RetryConfig) -> Self {
        Self::with_parts(
            config.max_attempts,
            ExponentialBackoff::from_config(config),
            TransientClassifier,
        )
    }
}

impl<B, C> RetryExecutor<B, C> {
    pub fn with_parts(max_attempts: u32, backoff: B, classifier: C) -> Self {
        Self {
            max_attempts,
            backoff,
            classifier,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> &B {
        &self.backoff
    }
}

impl<B: Backoff, C> RetryExecutor<B, C> {
    pub async fn run<T, E, F, Fut>(&self, label: &str, operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        C: Classifier<E>,
    {
        with_retry(operation, label, self.max_attempts, &self.backoff, &self.classifier).await
    }

    pub async fn run_observed<T, E, F, Fut, O>(
        &self,
        label: &str,
        operation: F,
        on_retry: O,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        C: Classifier<E>,
        O: FnMut(&RetryAttempt<'_, E>),
    {
        with_retry_observed(
            operation,
            label,
            self.max_attempts,
            &self.backoff,
            &self.classifier,
            on_retry,
        )
        .await
    }
}
