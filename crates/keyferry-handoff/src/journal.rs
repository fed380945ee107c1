//! Record of durable changes made by a handoff, and their undo

use crate::grant::revoke;
use crate::security::AuditLog;
use keyferry_cloud::{CloudError, CloudSession};
use keyferry_core::{CryptoKeyName, ObjectLocation};
use std::fmt;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
    PolicyBindingAdded {
        key: CryptoKeyName,
        role: String,
        member: String,
    },
    ObjectWritten {
        location: ObjectLocation,
    },
}

impl fmt::Display for SideEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SideEffect::PolicyBindingAdded { key, role, member } => {
                write!(f, "binding {} for {} on {}", role, member, key)
            }
            SideEffect::ObjectWritten { location } => write!(f, "object gs://{}", location),
        }
    }
}

/// Side effects in the order they happened
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Journal {
    entries: Vec<SideEffect>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, effect: SideEffect) {
        self.entries.push(effect);
    }

    pub fn entries(&self) -> &[SideEffect] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// What compensation managed to undo
#[derive(Debug, Default)]
pub struct CompensationReport {
    pub undone: Vec<SideEffect>,
    pub failed: Vec<(SideEffect, String)>,
}

impl CompensationReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Undo the journal newest-first using `session`
///
/// Failures are collected, never raised, so the error that triggered
/// compensation stays the one reported.
pub async fn compensate(journal: &Journal, session: &CloudSession) -> CompensationReport {
    let mut report = CompensationReport::default();
    let principal = session.principal();

    for effect in journal.entries().iter().rev() {
        let (operation, resource, result) = match effect {
            SideEffect::PolicyBindingAdded { key, role, member } => (
                "remove-binding",
                key.to_string(),
                remove_binding(session, key, role, member).await,
            ),
            SideEffect::ObjectWritten { location } => (
                "delete-object",
                location.to_string(),
                session.store().delete_object(location).await,
            ),
        };

        let audit = AuditLog::new(operation, resource, principal.as_str());
        match result {
            Ok(()) => {
                audit.log();
                info!("Compensated {}", effect);
                report.undone.push(effect.clone());
            }
            Err(e) => {
                audit.with_error(&e).log();
                warn!("Could not undo {}: {}", effect, e);
                report.failed.push((effect.clone(), e.to_string()));
            }
        }
    }

    report
}

async fn remove_binding(
    session: &CloudSession,
    key: &CryptoKeyName,
    role: &str,
    member: &str,
) -> Result<(), CloudError> {
    let mut policy = session.kms().get_iam_policy(key).await?;
    if revoke(&mut policy, role, member) {
        session.kms().set_iam_policy(key, &policy).await?;
    }
    Ok(())
}
