//! Exponential back-off with additive jitter.
//!
//! `delay(attempt) = min(base * 2^attempt + jitter, max)` where `jitter` is
//! drawn uniformly from `[0, jitter_ceiling)`. The jitter decorrelates callers
//! that started failing at the same instant.

use std::time::Duration;

use rand::Rng;

use crate::RetryConfig;

/// Initial delay before the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1_000);
/// Hard ceiling on any single delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);
/// Exclusive upper bound of the random jitter added to each delay.
pub const DEFAULT_JITTER: Duration = Duration::from_millis(1_000);

/// A policy that maps a 0-based failed attempt index to a suspension delay.
pub trait Backoff: Send + Sync {
    fn delay(&self, attempt: u32) -> Duration;
}

/// Doubling back-off capped at `max`, with up to `jitter` of random noise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Duration,
    jitter: Duration,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY, DEFAULT_JITTER)
    }
}

impl ExponentialBackoff {
    pub fn new(base: Duration, max: Duration, jitter: Duration) -> Self {
        Self { base, max, jitter }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.base_delay, config.max_delay, config.jitter)
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Deterministic core of the policy: the delay for `attempt` given an
    /// already-drawn `jitter` value.
    ///
    /// Overflow of `base * 2^attempt` saturates to `max`.
    pub fn delay_with_jitter(&self, attempt: u32, jitter: Duration) -> Duration {
        let exponential = 2u32
            .checked_pow(attempt)
            .and_then(|factor| self.base.checked_mul(factor))
            .unwrap_or(self.max);
        exponential.saturating_add(jitter).min(self.max)
    }

    fn draw_jitter(&self) -> Duration {
        let ceiling = u64::try_from(self.jitter.as_nanos()).unwrap_or(u64::MAX);
        if ceiling == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(rand::thread_rng().gen_range(0..ceiling))
    }
}

impl Backoff for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        self.delay_with_jitter(attempt, self.draw_jitter())
    }
}

/// Delay for `attempt` under the default policy (1 s base, 30 s cap, 1 s jitter).
pub fn compute_delay(attempt: u32) -> Duration {
    ExponentialBackoff::default().delay(attempt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_never_exceeds_cap() {
        let policy = ExponentialBackoff::default();
        for attempt in 0..64 {
            assert!(policy.delay(attempt) <= DEFAULT_MAX_DELAY, "attempt {attempt}");
        }
        assert_eq!(policy.delay(u32::MAX), DEFAULT_MAX_DELAY);
    }

    #[test]
    fn delay_is_at_least_the_exponential_floor_until_capped() {
        let policy = ExponentialBackoff::default();
        for attempt in 0..5 {
            let floor = DEFAULT_BASE_DELAY * 2u32.pow(attempt);
            let delay = policy.delay(attempt);
            assert!(delay >= floor, "attempt {attempt}: {delay:?} < {floor:?}");
            assert!(delay < floor + DEFAULT_JITTER, "attempt {attempt}: {delay:?}");
        }
    }

    #[test]
    fn delay_is_monotonic_without_jitter() {
        let policy = ExponentialBackoff::default();
        let delays: Vec<_> = (0..12)
            .map(|attempt| policy.delay_with_jitter(attempt, Duration::ZERO))
            .collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(delays[0], Duration::from_secs(1));
        assert_eq!(delays[4], Duration::from_secs(16));
        // 2^5 s would be 32 s, past the cap.
        assert_eq!(delays[5], DEFAULT_MAX_DELAY);
        assert_eq!(delays[11], DEFAULT_MAX_DELAY);
    }

    #[test]
    fn jitter_pushes_towards_but_not_past_the_cap() {
        let policy = ExponentialBackoff::default();
        let near_cap = policy.delay_with_jitter(4, Duration::from_millis(999));
        assert_eq!(near_cap, Duration::from_millis(16_999));
        let clipped = policy.delay_with_jitter(5, Duration::from_millis(999));
        assert_eq!(clipped, DEFAULT_MAX_DELAY);
    }

    #[test]
    fn zero_jitter_policy_is_deterministic() {
        let policy = ExponentialBackoff::new(
            Duration::from_millis(10),
            Duration::from_millis(100),
            Duration::ZERO,
        );
        assert_eq!(policy.delay(0), Duration::from_millis(10));
        assert_eq!(policy.delay(3), Duration::from_millis(80));
        assert_eq!(policy.delay(4), Duration::from_millis(100));
    }

    #[test]
    fn first_delay_falls_between_one_and_two_seconds() {
        for _ in 0..100 {
            let delay = compute_delay(0);
            assert!(delay >= Duration::from_millis(1_000));
            assert!(delay < Duration::from_millis(2_000));
        }
    }
}
