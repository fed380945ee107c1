//! Retry execution engine with policy-based configuration
//!
//! keyferry only retries one thing: acting as the target principal before
//! its new IAM binding is visible. The engine is generic anyway so the
//! predicate, not the call site, decides what counts as retryable.
//!
//! ```rust,no_run
//! use keyferry_core::retry::{ClosurePredicate, RetryExecutor, TracingObserver};
//! use keyferry_core::types::RetryPolicy;
//!
//! async fn example() {
//!     let executor = RetryExecutor::builder()
//!         .with_policy(RetryPolicy::default())
//!         .with_predicate(ClosurePredicate::new(|e: &std::io::Error| {
//!             e.kind() == std::io::ErrorKind::PermissionDenied
//!         }))
//!         .with_observer(TracingObserver::new("decrypt"))
//!         .build();
//!
//!     let outcome = executor
//!         .execute(|| async { Ok::<_, std::io::Error>("done") })
//!         .await;
//! }
//! ```

mod error;
mod executor;
mod observer;
mod strategies;

pub use error::RetryError;
pub use executor::{RetryExecutor, RetryExecutorBuilder, RetryOutcome};
pub use observer::{NoOpObserver, RetryObserver, TracingObserver};
pub use strategies::{calculate_delay, AlwaysRetry, ClosurePredicate, RetryPredicate};
