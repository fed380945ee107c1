//! The full twelve-stage handoff

use crate::error::{HandoffError, Result, Stage};
use crate::grant::{GrantMode, GrantResult};
use crate::journal::{compensate, Journal};
use crate::security::SecretBytes;
use crate::steps;
use camino::Utf8PathBuf;
use keyferry_cloud::{Ciphertext, CloudSession, Identity, SessionFactory};
use keyferry_core::{CryptoKeyName, HandoffSettings, ObjectLocation, Principal, RetryPolicy};
use std::sync::Arc;
use tracing::{info, warn};

/// Everything one handoff needs, with resource names already validated
#[derive(Debug, Clone)]
pub struct HandoffRequest {
    pub key: CryptoKeyName,
    pub location: ObjectLocation,
    pub secret_file: Utf8PathBuf,
    pub target: Principal,
    pub target_key_file: Utf8PathBuf,
    pub grant_mode: GrantMode,
    pub propagation: RetryPolicy,
    pub compensate_on_failure: bool,
}

impl HandoffRequest {
    pub fn from_settings(settings: &HandoffSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            key: settings.crypto_key()?,
            location: settings.object_location()?,
            secret_file: settings.secret_file.clone(),
            target: settings.target_principal()?,
            target_key_file: settings.target.key_file.clone(),
            grant_mode: GrantMode::from_dedupe(settings.grant.dedupe),
            propagation: settings.propagation.clone(),
            compensate_on_failure: settings.compensate_on_failure,
        })
    }

    pub fn target_identity(&self) -> Identity {
        Identity::ServiceAccountKey(self.target_key_file.clone().into_std_path_buf())
    }
}

/// A completed handoff
#[derive(Debug)]
pub struct HandoffOutcome {
    pub key: CryptoKeyName,
    pub location: ObjectLocation,
    pub ciphertext: Ciphertext,
    pub recovered: SecretBytes,
    pub grant: GrantResult,
    /// Bindings on the key after the grant
    pub policy_bindings: usize,
    /// Decrypt attempts needed before the grant was honoured
    pub propagation_attempts: u32,
    pub initial_principal: String,
    pub target_principal: String,
    pub journal: Journal,
}

/// Drives a handoff through a [`SessionFactory`]
pub struct HandoffWorkflow {
    factory: Arc<dyn SessionFactory>,
}

impl HandoffWorkflow {
    pub fn new(factory: Arc<dyn SessionFactory>) -> Self {
        Self { factory }
    }

    pub fn factory(&self) -> &dyn SessionFactory {
        self.factory.as_ref()
    }

    /// Run all twelve stages, stopping at the first failure
    ///
    /// With `compensate_on_failure` set, a failed run removes the binding it
    /// added and deletes the object it wrote before returning the original
    /// error. Recoverable failures keep both, so a later
    /// `decrypt --as-target` can still succeed.
    pub async fn run(&self, request: &HandoffRequest) -> Result<HandoffOutcome> {
        info!(
            "Handing off {} to {} via {}",
            request.secret_file,
            request.target.email(),
            request.key
        );

        let mut journal = Journal::new();
        let mut initial = None;

        match self.execute(request, &mut journal, &mut initial).await {
            Ok(mut outcome) => {
                outcome.journal = journal;
                Ok(outcome)
            }
            Err(err) => {
                warn!("Handoff stopped: {}", err);
                self.after_failure(request, &err, &journal, initial.as_ref())
                    .await;
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        request: &HandoffRequest,
        journal: &mut Journal,
        initial_slot: &mut Option<CloudSession>,
    ) -> Result<HandoffOutcome> {
        let secret = steps::read_secret(&request.secret_file).await?;

        let initial = steps::connect(
            self.factory(),
            &Identity::Ambient,
            Stage::ConnectInitial,
            Stage::ConnectInitial,
        )
        .await?;
        let initial = initial_slot.insert(initial);

        let member = request.target.member();
        let grant = steps::grant_decrypter(
            initial,
            &request.key,
            &member,
            request.grant_mode,
            journal,
        )
        .await?;

        let ciphertext = steps::encrypt_secret(initial, &request.key, &secret).await?;
        drop(secret);
        steps::store_ciphertext(initial, &request.location, &ciphertext, journal).await?;

        let target = steps::connect(
            self.factory(),
            &request.target_identity(),
            Stage::SwitchIdentity,
            Stage::ConnectTarget,
        )
        .await?;

        let stored = steps::fetch_ciphertext(&target, &request.location).await?;
        let recovered =
            steps::decrypt_secret(&target, &request.key, &stored, &request.propagation).await?;

        info!(
            "Handoff complete: {} can decrypt gs://{}",
            target.principal(),
            request.location
        );

        Ok(HandoffOutcome {
            key: request.key.clone(),
            location: request.location.clone(),
            ciphertext,
            recovered: recovered.secret,
            grant: grant.result,
            policy_bindings: grant.bindings,
            propagation_attempts: recovered.attempts,
            initial_principal: initial.principal(),
            target_principal: target.principal(),
            journal: Journal::new(),
        })
    }

    async fn after_failure(
        &self,
        request: &HandoffRequest,
        err: &HandoffError,
        journal: &Journal,
        initial: Option<&CloudSession>,
    ) {
        if journal.is_empty() {
            return;
        }

        match (request.compensate_on_failure, initial) {
            (true, Some(_)) if err.is_recoverable() => {
                info!("Keeping the binding and object; the grant may still be propagating");
                for effect in journal.entries() {
                    warn!("Left in place: {}", effect);
                }
            }
            (true, Some(session)) => {
                let report = compensate(journal, session).await;
                if report.is_complete() {
                    info!("Rolled back {} change(s)", report.undone.len());
                } else {
                    warn!(
                        "Rolled back {} change(s), {} left in place",
                        report.undone.len(),
                        report.failed.len()
                    );
                }
            }
            _ => {
                for effect in journal.entries() {
                    warn!("Left in place: {}", effect);
                }
            }
        }
    }
}
