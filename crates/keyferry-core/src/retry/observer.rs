//! Retry observation and logging

use std::error::Error;
use std::time::Duration;

/// Receives callbacks while a retry executor runs
pub trait RetryObserver: Send + Sync {
    /// An attempt is about to start (1-indexed)
    fn on_attempt_start(&self, attempt: u32, max_attempts: u32);

    /// An attempt failed and the next one starts after `delay`
    fn on_attempt_failed(&self, attempt: u32, error: &dyn Error, delay: Duration);

    fn on_success(&self, attempt: u32, total_duration: Duration);

    fn on_exhausted(&self, attempts: u32, final_error: &dyn Error);

    /// The predicate rejected the error
    fn on_cancelled(&self, attempt: u32, error: Option<&dyn Error>) {
        let _ = (attempt, error);
    }
}

/// Observer that ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl RetryObserver for NoOpObserver {
    fn on_attempt_start(&self, _attempt: u32, _max_attempts: u32) {}

    fn on_attempt_failed(&self, _attempt: u32, _error: &dyn Error, _delay: Duration) {}

    fn on_success(&self, _attempt: u32, _total_duration: Duration) {}

    fn on_exhausted(&self, _attempts: u32, _final_error: &dyn Error) {}
}

/// Logs retry events through `tracing`
///
/// Attempt starts are DEBUG, failures WARN, late success INFO, exhaustion ERROR.
#[derive(Debug, Clone)]
pub struct TracingObserver {
    operation: String,
}

impl TracingObserver {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }
}

impl RetryObserver for TracingObserver {
    fn on_attempt_start(&self, attempt: u32, max_attempts: u32) {
        tracing::debug!(
            operation = %self.operation,
            attempt,
            max_attempts,
            "starting attempt"
        );
    }

    fn on_attempt_failed(&self, attempt: u32, error: &dyn Error, delay: Duration) {
        tracing::warn!(
            operation = %self.operation,
            attempt,
            error = %error,
            delay_ms = delay.as_millis() as u64,
            "attempt failed, will retry"
        );
    }

    fn on_success(&self, attempt: u32, total_duration: Duration) {
        if attempt > 1 {
            tracing::info!(
                operation = %self.operation,
                attempt,
                total_duration_ms = total_duration.as_millis() as u64,
                "succeeded after retry"
            );
        } else {
            tracing::debug!(operation = %self.operation, "succeeded on first attempt");
        }
    }

    fn on_exhausted(&self, attempts: u32, final_error: &dyn Error) {
        tracing::error!(
            operation = %self.operation,
            attempts,
            error = %final_error,
            "all retry attempts exhausted"
        );
    }

    fn on_cancelled(&self, attempt: u32, error: Option<&dyn Error>) {
        if let Some(err) = error {
            tracing::debug!(
                operation = %self.operation,
                attempt,
                error = %err,
                "not retrying"
            );
        }
    }
}

impl<T: RetryObserver + ?Sized> RetryObserver for std::sync::Arc<T> {
    fn on_attempt_start(&self, attempt: u32, max_attempts: u32) {
        (**self).on_attempt_start(attempt, max_attempts)
    }

    fn on_attempt_failed(&self, attempt: u32, error: &dyn Error, delay: Duration) {
        (**self).on_attempt_failed(attempt, error, delay)
    }

    fn on_success(&self, attempt: u32, total_duration: Duration) {
        (**self).on_success(attempt, total_duration)
    }

    fn on_exhausted(&self, attempts: u32, final_error: &dyn Error) {
        (**self).on_exhausted(attempts, final_error)
    }

    fn on_cancelled(&self, attempt: u32, error: Option<&dyn Error>) {
        (**self).on_cancelled(attempt, error)
    }
}
