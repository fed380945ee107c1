//! Error types for the retry execution engine

use std::error::Error;
use std::fmt;
use std::time::Duration;

/// Errors that can occur during retry execution
///
/// Generic over `E`, the error type of the operation being retried.
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error
    Exhausted {
        /// Number of attempts made before giving up
        attempts: u32,
        /// The error from the final attempt
        source: E,
        /// Total duration spent across all attempts
        total_duration: Duration,
    },

    /// The policy allowed no attempts at all
    Cancelled {
        attempts: u32,
        last_error: Option<E>,
    },

    /// The predicate rejected the error; no further attempts were made
    NonRetryable {
        /// Attempt that produced the error (1-indexed)
        attempt: u32,
        source: E,
    },
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Exhausted {
                attempts,
                source,
                total_duration,
            } => write!(
                f,
                "retry exhausted after {} attempts over {:.2}s: {}",
                attempts,
                total_duration.as_secs_f64(),
                source
            ),
            RetryError::Cancelled {
                attempts,
                last_error: Some(err),
            } => write!(f, "retry cancelled after {} attempts: {}", attempts, err),
            RetryError::Cancelled { attempts, .. } => {
                write!(f, "retry cancelled after {} attempts", attempts)
            }
            RetryError::NonRetryable { source, .. } => {
                write!(f, "non-retryable error: {}", source)
            }
        }
    }
}

impl<E: Error + 'static> Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source_ref().map(|e| e as &(dyn Error + 'static))
    }
}

impl<E> RetryError<E> {
    pub fn exhausted(attempts: u32, source: E, total_duration: Duration) -> Self {
        RetryError::Exhausted {
            attempts,
            source,
            total_duration,
        }
    }

    pub fn cancelled(attempts: u32, last_error: Option<E>) -> Self {
        RetryError::Cancelled {
            attempts,
            last_error,
        }
    }

    pub fn non_retryable(attempt: u32, source: E) -> Self {
        RetryError::NonRetryable { attempt, source }
    }

    /// Number of attempts made
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } => *attempts,
            RetryError::Cancelled { attempts, .. } => *attempts,
            RetryError::NonRetryable { attempt, .. } => *attempt,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled { .. })
    }

    pub fn is_non_retryable(&self) -> bool {
        matches!(self, RetryError::NonRetryable { .. })
    }

    /// Get the underlying error, consuming this error
    pub fn into_source(self) -> Option<E> {
        match self {
            RetryError::Exhausted { source, .. } => Some(source),
            RetryError::Cancelled { last_error, .. } => last_error,
            RetryError::NonRetryable { source, .. } => Some(source),
        }
    }

    /// Get a reference to the underlying error
    pub fn source_ref(&self) -> Option<&E> {
        match self {
            RetryError::Exhausted { source, .. } => Some(source),
            RetryError::Cancelled { last_error, .. } => last_error.as_ref(),
            RetryError::NonRetryable { source, .. } => Some(source),
        }
    }
}
