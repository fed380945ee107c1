//! Waiting for a fresh decrypter grant to take effect
//!
//! IAM changes are eventually consistent, so the first decrypt as the
//! target can be refused even though the policy write succeeded. Decrypt is
//! retried on permission denial only; any other failure stops at once.

use crate::error::{HandoffError, Result, Stage};
use keyferry_cloud::{Ciphertext, CloudError, KeyManagement};
use keyferry_core::retry::{ClosurePredicate, RetryError, RetryExecutor, TracingObserver};
use keyferry_core::{CryptoKeyName, RetryPolicy};
use std::fmt;

/// Payload returned by a successful decrypt
pub struct Propagated {
    pub plaintext_b64: String,
    /// Attempt that succeeded (1-indexed)
    pub attempts: u32,
}

impl fmt::Debug for Propagated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Propagated")
            .field("plaintext_b64", &"[REDACTED]")
            .field("attempts", &self.attempts)
            .finish()
    }
}

pub async fn decrypt_when_granted(
    kms: &dyn KeyManagement,
    key: &CryptoKeyName,
    ciphertext: &Ciphertext,
    policy: &RetryPolicy,
) -> Result<Propagated> {
    let mut policy = policy.clone();
    policy.max_attempts = policy.max_attempts.max(1);

    let executor = RetryExecutor::builder()
        .with_policy(policy)
        .with_predicate(ClosurePredicate::new(|e: &CloudError| {
            e.is_permission_denied()
        }))
        .with_observer(TracingObserver::new("decrypt as target"))
        .build();

    match executor.execute(|| kms.decrypt(key, ciphertext)).await {
        Ok(outcome) => Ok(Propagated {
            plaintext_b64: outcome.value,
            attempts: outcome.attempts,
        }),
        Err(RetryError::Exhausted {
            attempts, source, ..
        }) if attempts > 1 => Err(HandoffError::GrantNotPropagated { attempts, source }),
        Err(RetryError::Exhausted { source, .. }) | Err(RetryError::NonRetryable { source, .. }) => {
            Err(HandoffError::cloud(Stage::Decrypt, source))
        }
        Err(RetryError::Cancelled { last_error, .. }) => Err(HandoffError::cloud(
            Stage::Decrypt,
            last_error.unwrap_or_else(|| CloudError::api(0, "decrypt was never attempted")),
        )),
    }
}
