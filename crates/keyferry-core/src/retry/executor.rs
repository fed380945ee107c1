//! Retry execution engine

use std::error::Error;
use std::future::Future;
use std::time::{Duration, Instant};

use crate::types::RetryPolicy;

use super::error::RetryError;
use super::observer::{NoOpObserver, RetryObserver};
use super::strategies::{calculate_delay, AlwaysRetry, RetryPredicate};

/// Value produced by a successful retried operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOutcome<T> {
    pub value: T,
    /// Attempt that succeeded (1-indexed)
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Builder for configuring a `RetryExecutor`
pub struct RetryExecutorBuilder<P = AlwaysRetry, O = NoOpObserver> {
    policy: RetryPolicy,
    predicate: P,
    observer: O,
    jitter: bool,
}

impl Default for RetryExecutorBuilder<AlwaysRetry, NoOpObserver> {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryExecutorBuilder<AlwaysRetry, NoOpObserver> {
    pub fn new() -> Self {
        Self {
            policy: RetryPolicy::default(),
            predicate: AlwaysRetry,
            observer: NoOpObserver,
            jitter: true,
        }
    }
}

impl<P, O> RetryExecutorBuilder<P, O> {
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_predicate<P2>(self, predicate: P2) -> RetryExecutorBuilder<P2, O> {
        RetryExecutorBuilder {
            policy: self.policy,
            predicate,
            observer: self.observer,
            jitter: self.jitter,
        }
    }

    pub fn with_observer<O2>(self, observer: O2) -> RetryExecutorBuilder<P, O2> {
        RetryExecutorBuilder {
            policy: self.policy,
            predicate: self.predicate,
            observer,
            jitter: self.jitter,
        }
    }

    /// Jitter is enabled by default
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn build(self) -> RetryExecutor<P, O> {
        RetryExecutor {
            policy: self.policy,
            predicate: self.predicate,
            observer: self.observer,
            jitter: self.jitter,
        }
    }
}

/// Runs an async operation until it succeeds, hits a non-retryable error,
/// or runs out of attempts
pub struct RetryExecutor<P, O> {
    policy: RetryPolicy,
    predicate: P,
    observer: O,
    jitter: bool,
}

impl RetryExecutor<AlwaysRetry, NoOpObserver> {
    pub fn builder() -> RetryExecutorBuilder<AlwaysRetry, NoOpObserver> {
        RetryExecutorBuilder::new()
    }
}

impl<P, O> RetryExecutor<P, O>
where
    O: RetryObserver,
{
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn execute<F, Fut, T, E>(&self, mut op: F) -> Result<RetryOutcome<T>, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Error + Send + 'static,
        P: RetryPredicate<E>,
    {
        let start = Instant::now();
        let max_attempts = self.policy.max_attempts;

        for attempt in 1..=max_attempts {
            self.observer.on_attempt_start(attempt, max_attempts);

            match op().await {
                Ok(value) => {
                    let elapsed = start.elapsed();
                    self.observer.on_success(attempt, elapsed);
                    return Ok(RetryOutcome {
                        value,
                        attempts: attempt,
                        elapsed,
                    });
                }
                Err(err) => {
                    if !self.predicate.should_retry(&err) {
                        self.observer.on_cancelled(attempt, Some(&err));
                        return Err(RetryError::non_retryable(attempt, err));
                    }

                    if attempt >= max_attempts {
                        self.observer.on_exhausted(attempt, &err);
                        return Err(RetryError::exhausted(attempt, err, start.elapsed()));
                    }

                    let delay = calculate_delay(&self.policy, attempt, self.jitter);
                    self.observer.on_attempt_failed(attempt, &err, delay);

                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(RetryError::cancelled(0, None))
    }
}
