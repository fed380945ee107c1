//! Retry policy configuration

use serde::{Deserialize, Serialize};

/// Retry policy for an operation
///
/// The defaults are sized for IAM policy propagation, which Google documents
/// as usually visible within a minute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Retry strategy
    #[serde(default)]
    pub strategy: RetryStrategy,

    /// Backoff multiplier for exponential strategies
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Initial delay in milliseconds
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Maximum delay in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt
    pub fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            strategy: RetryStrategy::None,
            ..Self::default()
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            strategy: RetryStrategy::default(),
            backoff_multiplier: default_backoff_multiplier(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_initial_delay() -> u64 {
    2000
}
fn default_max_delay() -> u64 {
    20000
}

/// Retry strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RetryStrategy {
    /// No delay between attempts
    None,

    /// Fixed delay between retries
    FixedDelay,

    /// Exponential backoff (default)
    #[default]
    ExponentialBackoff,

    /// Linear backoff
    LinearBackoff,
}
