//! Secret hygiene and audit logging
//!
//! Provides:
//! - `SecretBytes`, plaintext that is zeroed on drop and never printed
//! - `AuditLog`, one structured event per side effect

use std::fmt;
use std::time::SystemTime;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Plaintext secret bytes, zeroed when dropped
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretBytes {
    inner: Vec<u8>,
}

impl SecretBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { inner: bytes }
    }

    /// Raw bytes (use with caution)
    pub fn expose(&self) -> &[u8] {
        &self.inner
    }

    /// UTF-8 view, if the secret is text
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.inner).ok()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl From<Vec<u8>> for SecretBytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl From<&str> for SecretBytes {
    fn from(s: &str) -> Self {
        Self::new(s.as_bytes().to_vec())
    }
}

impl PartialEq for SecretBytes {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl Eq for SecretBytes {}

impl fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretBytes([REDACTED {} bytes])", self.len())
    }
}

/// Audit entry for a durable change made during a handoff
#[derive(Debug, Clone)]
pub struct AuditLog {
    pub operation: String,
    pub resource: String,
    pub principal: String,
    pub success: bool,
    pub error: Option<String>,
    pub timestamp: SystemTime,
}

impl AuditLog {
    pub fn new(
        operation: impl Into<String>,
        resource: impl Into<String>,
        principal: impl Into<String>,
    ) -> Self {
        Self {
            operation: operation.into(),
            resource: resource.into(),
            principal: principal.into(),
            success: true,
            error: None,
            timestamp: SystemTime::now(),
        }
    }

    pub fn with_error(mut self, error: impl fmt::Display) -> Self {
        self.success = false;
        self.error = Some(error.to_string());
        self
    }

    /// Emit the entry (never includes secret values)
    pub fn log(&self) {
        if self.success {
            tracing::info!(
                operation = %self.operation,
                resource = %self.resource,
                principal = %self.principal,
                timestamp = ?self.timestamp,
                "Audit: change applied"
            );
        } else {
            tracing::warn!(
                operation = %self.operation,
                resource = %self.resource,
                principal = %self.principal,
                error = ?self.error,
                timestamp = ?self.timestamp,
                "Audit: change failed"
            );
        }
    }
}
