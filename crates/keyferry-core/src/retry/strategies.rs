//! Retry delay strategies and predicates

use crate::types::{RetryPolicy, RetryStrategy};
use rand::Rng;
use std::time::Duration;

/// Calculate the delay before the next attempt
///
/// `attempt` is the 1-indexed attempt that just failed. Jitter adds up to
/// 25%, and the result never exceeds `max_delay_ms`.
///
/// ```rust
/// use keyferry_core::retry::calculate_delay;
/// use keyferry_core::types::{RetryPolicy, RetryStrategy};
///
/// let policy = RetryPolicy {
///     max_attempts: 3,
///     strategy: RetryStrategy::ExponentialBackoff,
///     backoff_multiplier: 2.0,
///     initial_delay_ms: 1000,
///     max_delay_ms: 30000,
/// };
///
/// assert_eq!(calculate_delay(&policy, 1, false).as_millis(), 1000);
/// assert_eq!(calculate_delay(&policy, 2, false).as_millis(), 2000);
/// ```
pub fn calculate_delay(policy: &RetryPolicy, attempt: u32, jitter: bool) -> Duration {
    let attempt_index = attempt.saturating_sub(1);

    let base_delay_ms = match policy.strategy {
        RetryStrategy::None => 0,
        RetryStrategy::FixedDelay => policy.initial_delay_ms,
        RetryStrategy::ExponentialBackoff => {
            let multiplier = policy.backoff_multiplier.powf(attempt_index as f64);
            (policy.initial_delay_ms as f64 * multiplier) as u64
        }
        RetryStrategy::LinearBackoff => {
            policy.initial_delay_ms.saturating_mul(attempt_index as u64 + 1)
        }
    };

    let jittered_ms = if jitter && base_delay_ms > 0 {
        let jitter_range = base_delay_ms / 4;
        base_delay_ms.saturating_add(rand::rng().random_range(0..=jitter_range))
    } else {
        base_delay_ms
    };

    Duration::from_millis(jittered_ms.min(policy.max_delay_ms))
}

/// Decides whether an error is worth another attempt
pub trait RetryPredicate<E: ?Sized>: Send + Sync {
    fn should_retry(&self, error: &E) -> bool;
}

/// Every error is retryable
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRetry;

impl<E: ?Sized> RetryPredicate<E> for AlwaysRetry {
    fn should_retry(&self, _error: &E) -> bool {
        true
    }
}

/// Retryability decided by a closure
pub struct ClosurePredicate<F> {
    predicate: F,
}

impl<F> ClosurePredicate<F> {
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<E, F> RetryPredicate<E> for ClosurePredicate<F>
where
    F: Fn(&E) -> bool + Send + Sync,
{
    fn should_retry(&self, error: &E) -> bool {
        (self.predicate)(error)
    }
}
