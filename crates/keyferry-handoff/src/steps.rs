//! Individual handoff steps
//!
//! Each function covers one or more [`Stage`]s and tags its errors with
//! the stage that failed. [`crate::HandoffWorkflow`] runs them in order;
//! the CLI's narrower commands call them directly.

use crate::encoding;
use crate::error::{HandoffError, Result, Stage};
use crate::grant::{apply_grant, revoke, GrantMode, GrantResult};
use crate::journal::{Journal, SideEffect};
use crate::propagation::decrypt_when_granted;
use crate::security::{AuditLog, SecretBytes};
use camino::Utf8Path;
use keyferry_cloud::{Ciphertext, CloudSession, Identity, SessionFactory};
use keyferry_core::types::DECRYPTER_ROLE;
use keyferry_core::{CryptoKeyName, ObjectLocation, RetryPolicy};
use std::fmt::Display;
use tracing::{debug, info};
use zeroize::Zeroizing;

fn begin(stage: Stage) {
    debug!("Starting {}", stage);
}

fn finish(stage: Stage, detail: impl Display) {
    info!("{}: {}", stage, detail);
}

/// Result of stages 3 to 5
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyGrant {
    pub result: GrantResult,
    /// Bindings on the key after the write
    pub bindings: usize,
}

/// Decrypted secret and how many decrypt attempts it took
#[derive(Debug)]
pub struct Recovered {
    pub secret: SecretBytes,
    pub attempts: u32,
}

/// Stage 1
pub async fn read_secret(path: &Utf8Path) -> Result<SecretBytes> {
    begin(Stage::ReadSecret);
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| HandoffError::ReadSecret {
            path: path.to_path_buf(),
            source,
        })?;
    let secret = SecretBytes::new(bytes);
    finish(Stage::ReadSecret, format_args!("{} bytes from {}", secret.len(), path));
    Ok(secret)
}

/// Build a session and prove it can authenticate
///
/// Construction failures are tagged `connect_stage`, token failures
/// `auth_stage`. For the initial identity both are stage 2; for the target
/// they are stages 8 and 9.
pub async fn connect(
    factory: &dyn SessionFactory,
    identity: &Identity,
    connect_stage: Stage,
    auth_stage: Stage,
) -> Result<CloudSession> {
    begin(connect_stage);
    let session = factory
        .connect(identity)
        .await
        .map_err(|e| HandoffError::cloud(connect_stage, e))?;
    if connect_stage != auth_stage {
        finish(connect_stage, format_args!("selected {}", identity));
        begin(auth_stage);
    }

    session
        .authenticate()
        .await
        .map_err(|e| HandoffError::cloud(auth_stage, e))?;
    finish(auth_stage, format_args!("acting as {}", session.principal()));
    Ok(session)
}

/// Stages 3 to 5: read the key policy, add the decrypter binding, write it
pub async fn grant_decrypter(
    session: &CloudSession,
    key: &CryptoKeyName,
    member: &str,
    mode: GrantMode,
    journal: &mut Journal,
) -> Result<PolicyGrant> {
    begin(Stage::FetchPolicy);
    let mut policy = session
        .kms()
        .get_iam_policy(key)
        .await
        .map_err(|e| HandoffError::cloud(Stage::FetchPolicy, e))?;
    finish(
        Stage::FetchPolicy,
        format_args!("{} bindings on {}", policy.bindings.len(), key),
    );

    begin(Stage::AppendBinding);
    let result = apply_grant(&mut policy, DECRYPTER_ROLE, member, mode);
    if !result.changed() {
        finish(
            Stage::AppendBinding,
            format_args!("{} already holds {}", member, DECRYPTER_ROLE),
        );
        return Ok(PolicyGrant {
            result,
            bindings: policy.bindings.len(),
        });
    }
    finish(
        Stage::AppendBinding,
        format_args!("{} for {}", DECRYPTER_ROLE, member),
    );

    begin(Stage::WritePolicy);
    let audit = AuditLog::new("set-iam-policy", key.to_string(), session.principal());
    let stored = match session.kms().set_iam_policy(key, &policy).await {
        Ok(stored) => stored,
        Err(e) => {
            audit.with_error(&e).log();
            return Err(HandoffError::cloud(Stage::WritePolicy, e));
        }
    };
    audit.log();
    journal.record(SideEffect::PolicyBindingAdded {
        key: key.clone(),
        role: DECRYPTER_ROLE.to_string(),
        member: member.to_string(),
    });
    finish(
        Stage::WritePolicy,
        format_args!("{} bindings stored", stored.bindings.len()),
    );

    Ok(PolicyGrant {
        result,
        bindings: stored.bindings.len(),
    })
}

/// Remove the member's most recent decrypter binding
///
/// Returns `false` when the member held no binding and the policy was left
/// untouched.
pub async fn revoke_decrypter(
    session: &CloudSession,
    key: &CryptoKeyName,
    member: &str,
) -> Result<bool> {
    begin(Stage::FetchPolicy);
    let mut policy = session
        .kms()
        .get_iam_policy(key)
        .await
        .map_err(|e| HandoffError::cloud(Stage::FetchPolicy, e))?;

    if !revoke(&mut policy, DECRYPTER_ROLE, member) {
        info!("{} holds no {} binding on {}", member, DECRYPTER_ROLE, key);
        return Ok(false);
    }

    begin(Stage::WritePolicy);
    let audit = AuditLog::new("remove-binding", key.to_string(), session.principal());
    if let Err(e) = session.kms().set_iam_policy(key, &policy).await {
        audit.with_error(&e).log();
        return Err(HandoffError::cloud(Stage::WritePolicy, e));
    }
    audit.log();
    finish(
        Stage::WritePolicy,
        format_args!("removed {} for {}", DECRYPTER_ROLE, member),
    );
    Ok(true)
}

/// Stage 6
pub async fn encrypt_secret(
    session: &CloudSession,
    key: &CryptoKeyName,
    secret: &SecretBytes,
) -> Result<Ciphertext> {
    begin(Stage::Encrypt);
    let payload = Zeroizing::new(encoding::encode(secret.expose()));
    let ciphertext = session
        .kms()
        .encrypt(key, &payload)
        .await
        .map_err(|e| HandoffError::cloud(Stage::Encrypt, e))?;
    finish(
        Stage::Encrypt,
        format_args!("{} chars of ciphertext", ciphertext.len()),
    );
    Ok(ciphertext)
}

/// Stage 7: create or replace the object with the ciphertext
pub async fn store_ciphertext(
    session: &CloudSession,
    location: &ObjectLocation,
    ciphertext: &Ciphertext,
    journal: &mut Journal,
) -> Result<()> {
    begin(Stage::StoreObject);
    let audit = AuditLog::new("put-object", location.to_string(), session.principal());
    if let Err(e) = session
        .store()
        .put_object(location, ciphertext.as_str().as_bytes().to_vec())
        .await
    {
        audit.with_error(&e).log();
        return Err(HandoffError::cloud(Stage::StoreObject, e));
    }
    audit.log();
    journal.record(SideEffect::ObjectWritten {
        location: location.clone(),
    });
    finish(Stage::StoreObject, format_args!("wrote gs://{}", location));
    Ok(())
}

/// Stage 10
pub async fn fetch_ciphertext(
    session: &CloudSession,
    location: &ObjectLocation,
) -> Result<Ciphertext> {
    begin(Stage::FetchObject);
    let bytes = session
        .store()
        .get_object(location)
        .await
        .map_err(|e| HandoffError::cloud(Stage::FetchObject, e))?;
    let text = encoding::object_text(bytes)
        .map_err(|e| HandoffError::encoding(Stage::FetchObject, e))?;
    finish(
        Stage::FetchObject,
        format_args!("read {} bytes from gs://{}", text.len(), location),
    );
    Ok(Ciphertext::new(text))
}

/// Stages 11 and 12: decrypt, waiting for the grant if needed, then decode
pub async fn decrypt_secret(
    session: &CloudSession,
    key: &CryptoKeyName,
    ciphertext: &Ciphertext,
    propagation: &RetryPolicy,
) -> Result<Recovered> {
    begin(Stage::Decrypt);
    let propagated = decrypt_when_granted(session.kms(), key, ciphertext, propagation).await?;
    let attempts = propagated.attempts;
    let payload = Zeroizing::new(propagated.plaintext_b64);
    finish(Stage::Decrypt, format_args!("succeeded on attempt {}", attempts));

    begin(Stage::Decode);
    let bytes = encoding::decode(&payload).map_err(|e| HandoffError::encoding(Stage::Decode, e))?;
    let secret = SecretBytes::new(bytes);
    finish(Stage::Decode, format_args!("recovered {} bytes", secret.len()));

    Ok(Recovered { secret, attempts })
}
