//! Tests for the retry executor.
//!
//! All timing tests run on a paused tokio clock, so back-off sleeps finish
//! instantly while `Instant` deltas still reflect the requested delays.

use std::time::Duration;

use tokio::time::Instant;

use crate::mock::{MockError, ScriptedOperation};
use crate::{
    with_retry, with_retry_observed, ErrorKind, ExponentialBackoff, FnClassifier, RetryConfig,
    RetryError, RetryExecutor, TransientClassifier,
};

fn no_jitter(base_ms: u64) -> ExponentialBackoff {
    ExponentialBackoff::new(
        Duration::from_millis(base_ms),
        Duration::from_secs(30),
        Duration::ZERO,
    )
}

#[tokio::test(start_paused = true)]
async fn always_retryable_runs_exactly_max_attempts() {
    let op = ScriptedOperation::<u32>::always(Err(MockError::transient(ErrorKind::ConnectionReset)));

    let result = with_retry(|| op.call(), "flaky", 4, &no_jitter(10), &TransientClassifier).await;

    assert_eq!(op.call_count(), 4);
    match result {
        Err(RetryError::Exhausted { attempts, last }) => {
            assert_eq!(attempts, 4);
            assert_eq!(last.kind, ErrorKind::ConnectionReset);
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn exhaustion_does_not_sleep_after_the_final_attempt() {
    let op = ScriptedOperation::<u32>::always(Err(MockError::transient(ErrorKind::TimedOut)));
    let start = Instant::now();

    let _ = with_retry(|| op.call(), "flaky", 3, &no_jitter(100), &TransientClassifier).await;

    // Sleeps after attempts 1 and 2 only: 100 ms + 200 ms.
    assert_eq!(start.elapsed(), Duration::from_millis(300));
}

#[tokio::test(start_paused = true)]
async fn one_transient_failure_then_success_retries_once() {
    let op = ScriptedOperation::failing_then(ErrorKind::ConnectionRefused, 1, "ok");
    let mut delays = Vec::new();
    let start = Instant::now();

    let result = with_retry_observed(
        || op.call(),
        "startup",
        10,
        &ExponentialBackoff::default(),
        &TransientClassifier,
        |retry| delays.push((retry.attempt, retry.delay)),
    )
    .await;

    assert_eq!(result.expect("second attempt succeeds"), "ok");
    assert_eq!(op.call_count(), 2);
    assert_eq!(delays.len(), 1);

    let (attempt, delay) = delays[0];
    assert_eq!(attempt, 0);
    assert!(delay >= Duration::from_millis(1_000) && delay < Duration::from_millis(2_000));
    // Timers have millisecond resolution.
    let waited = start.elapsed();
    assert!(waited >= delay && waited <= delay + Duration::from_millis(1), "{waited:?}");
}

#[tokio::test(start_paused = true)]
async fn first_failure_non_retryable_returns_immediately() {
    let op = ScriptedOperation::<u32>::new([
        Err(MockError::fatal("You have an error in your SQL syntax")),
        Ok(1),
    ]);
    let start = Instant::now();

    let result = with_retry(|| op.call(), "query", 10, &no_jitter(1_000), &TransientClassifier).await;

    assert_eq!(op.call_count(), 1);
    assert_eq!(start.elapsed(), Duration::ZERO);
    match result {
        Err(RetryError::NonRetryable(err)) => {
            assert_eq!(err.message, "You have an error in your SQL syntax");
        }
        other => panic!("expected a non-retryable error, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn non_retryable_after_transient_failures_stops_the_loop() {
    let op = ScriptedOperation::<u32>::new([
        Err(MockError::transient(ErrorKind::TooManyConnections)),
        Err(MockError::fatal("Access denied for user 'recipes'")),
        Ok(1),
    ]);

    let result = with_retry(|| op.call(), "connect", 10, &no_jitter(10), &TransientClassifier).await;

    assert_eq!(op.call_count(), 2);
    assert!(matches!(result, Err(RetryError::NonRetryable(_))));
}

#[tokio::test(start_paused = true)]
async fn blocked_host_message_is_retried() {
    let op = ScriptedOperation::new([
        Err(MockError::new(ErrorKind::Other, "Host 'api' is blocked")),
        Ok(7),
    ]);

    let result = with_retry(|| op.call(), "connect", 3, &no_jitter(10), &TransientClassifier).await;

    assert_eq!(result.ok(), Some(7));
    assert_eq!(op.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn econnrefused_then_success_with_default_config() {
    let executor = RetryExecutor::new(&RetryConfig::default());
    assert_eq!(executor.max_attempts(), 10);

    let op = ScriptedOperation::new([
        Err(MockError::transient(ErrorKind::from_code("ECONNREFUSED"))),
        Ok(()),
    ]);
    let mut retries = 0;
    let start = Instant::now();

    executor
        .run_observed("Database initialization", || op.call(), |_| retries += 1)
        .await
        .expect("succeeds on the second attempt");

    assert_eq!(retries, 1);
    assert_eq!(op.call_count(), 2);
    let waited = start.elapsed();
    assert!(waited >= Duration::from_millis(1_000), "{waited:?}");
    assert!(waited <= Duration::from_millis(2_000), "{waited:?}");
}

#[tokio::test(start_paused = true)]
async fn zero_max_attempts_still_runs_once() {
    let op = ScriptedOperation::<u32>::always(Err(MockError::transient(ErrorKind::TimedOut)));

    let result = with_retry(|| op.call(), "once", 0, &no_jitter(10), &TransientClassifier).await;

    assert_eq!(op.call_count(), 1);
    assert_eq!(result.err().and_then(|e| e.attempts()), Some(1));
}

#[tokio::test(start_paused = true)]
async fn custom_classifier_overrides_the_default() {
    let op = ScriptedOperation::<u32>::always(Err(MockError::transient(ErrorKind::ConnectionRefused)));
    let never = FnClassifier(|_: &MockError| false);

    let result = with_retry(|| op.call(), "strict", 5, &no_jitter(10), &never).await;

    assert_eq!(op.call_count(), 1);
    assert!(!result.expect_err("fails").is_exhausted());
}

#[tokio::test(start_paused = true)]
async fn concurrent_retries_suspend_without_serialising() {
    let executor = RetryExecutor::with_parts(3, no_jitter(1_000), TransientClassifier);
    let a = ScriptedOperation::failing_then(ErrorKind::ConnectionReset, 1, 'a');
    let b = ScriptedOperation::failing_then(ErrorKind::ConnectionReset, 1, 'b');
    let start = Instant::now();

    let (ra, rb) = tokio::join!(
        executor.run("a", || a.call()),
        executor.run("b", || b.call()),
    );

    assert_eq!(ra.ok(), Some('a'));
    assert_eq!(rb.ok(), Some('b'));
    // Both waited one second at the same time, not one after the other.
    assert_eq!(start.elapsed(), Duration::from_secs(1));
}
