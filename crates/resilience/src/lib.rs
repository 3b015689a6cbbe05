//! `resilience` crate: back-off scheduling, failure classification, and the
//! retry executor.
//!
//! Nothing here knows about databases. Drivers map their own failures onto
//! [`ErrorKind`] by implementing [`Classify`], and the executor decides from
//! that alone whether to suspend and retry or propagate.

pub mod backoff;
pub mod classify;
pub mod error;
pub mod executor;
pub mod mock;

pub use backoff::{compute_delay, Backoff, ExponentialBackoff};
pub use classify::{is_retryable, Classifier, Classify, ErrorKind, FnClassifier, TransientClassifier};
pub use error::RetryError;
pub use executor::{with_retry, with_retry_observed, RetryAttempt, RetryConfig, RetryExecutor};

#[cfg(test)]
mod executor_tests;
