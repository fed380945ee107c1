//! In-memory key service and bucket store
//!
//! One shared [`InMemoryCloud`] holds keys, IAM policies and buckets.
//! Clients obtained through [`InMemoryCloud::as_principal`] or through its
//! [`SessionFactory`] implementation act as one member, and every call is
//! checked against the key's owner and policy the way Cloud KMS would.
//!
//! Ciphertext is opaque base64 text tied to the key that produced it, not
//! real cryptography.

use crate::credentials::StaticAuthenticator;
use crate::error::{CloudError, Result};
use crate::session::{CloudSession, Identity, SessionFactory};
use crate::traits::{KeyManagement, ObjectStore};
use crate::types::{Ciphertext, IamPolicy, Operation};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use keyferry_core::types::DECRYPTER_ROLE;
use keyferry_core::{CryptoKeyName, ObjectLocation};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;

const CIPHERTEXT_TAG: &str = "kfm1";
const ENCRYPTER_ROLE: &str = "roles/cloudkms.cryptoKeyEncrypter";
const ENCRYPTER_DECRYPTER_ROLE: &str = "roles/cloudkms.cryptoKeyEncrypterDecrypter";

/// Cloud KMS rejects plaintext above 64 KiB
const MAX_PLAINTEXT_BYTES: usize = 64 * 1024;

/// Injected failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    PermissionDenied,
    NotFound,
    /// HTTP 503 style outage
    Unavailable,
    /// The service refuses the payload: encrypt/decrypt errors for KMS
    /// calls, I/O errors for storage calls
    Rejected,
}

impl Fault {
    fn to_error(self, operation: Operation, resource: &str) -> CloudError {
        let message = format!("{} {}: injected {:?}", operation, resource, self);
        match self {
            Fault::PermissionDenied => CloudError::permission_denied(message),
            Fault::NotFound => CloudError::not_found(message),
            Fault::Unavailable => CloudError::api(503, message),
            Fault::Rejected => match operation {
                Operation::Encrypt => CloudError::encryption(message),
                Operation::Decrypt => CloudError::decryption(message),
                Operation::PutObject | Operation::GetObject | Operation::DeleteObject => {
                    CloudError::Io(std::io::Error::other(message))
                }
                Operation::GetIamPolicy | Operation::SetIamPolicy => CloudError::api(400, message),
            },
        }
    }
}

#[derive(Debug, Clone)]
struct FaultPlan {
    operation: Operation,
    fault: Fault,
    member: Option<String>,
    remaining: Option<u32>,
}

/// One call seen by the simulator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    pub operation: Operation,
    pub member: String,
    pub resource: String,
}

#[derive(Debug)]
struct KeyRecord {
    owner: String,
    policy: IamPolicy,
    revision: u64,
    /// Members whose new grant stays invisible for this many more checks
    pending: HashMap<String, u32>,
}

#[derive(Debug, Default)]
struct CloudState {
    keys: HashMap<String, KeyRecord>,
    buckets: HashMap<String, BTreeMap<String, Vec<u8>>>,
    identities: HashMap<Identity, String>,
    faults: Vec<FaultPlan>,
    calls: Vec<CallRecord>,
    propagation_delay: u32,
    ciphertext_counter: u64,
}

impl CloudState {
    fn record(&mut self, operation: Operation, member: &str, resource: &str) {
        trace!("{} {} as {}", operation, resource, member);
        self.calls.push(CallRecord {
            operation,
            member: member.to_string(),
            resource: resource.to_string(),
        });
    }

    fn injected(&mut self, operation: Operation, member: &str, resource: &str) -> Result<()> {
        let plan = self.faults.iter_mut().find(|plan| {
            plan.operation == operation
                && plan.member.as_deref().map_or(true, |m| m == member)
                && plan.remaining != Some(0)
        });

        match plan {
            Some(plan) => {
                if let Some(remaining) = plan.remaining.as_mut() {
                    *remaining -= 1;
                }
                Err(plan.fault.to_error(operation, resource))
            }
            None => Ok(()),
        }
    }

    /// Record the call, apply injected faults, then look up the key
    fn key_for(
        &mut self,
        operation: Operation,
        member: &str,
        key: &CryptoKeyName,
    ) -> Result<&mut KeyRecord> {
        let name = key.to_string();
        self.record(operation, member, &name);
        self.injected(operation, member, &name)?;
        self.keys
            .get_mut(&name)
            .ok_or_else(|| CloudError::not_found(format!("{} {}: key does not exist", operation, name)))
    }

    fn bucket_for(
        &mut self,
        operation: Operation,
        member: &str,
        location: &ObjectLocation,
    ) -> Result<&mut BTreeMap<String, Vec<u8>>> {
        let name = location.to_string();
        self.record(operation, member, &name);
        self.injected(operation, member, &name)?;
        self.buckets.get_mut(&location.bucket).ok_or_else(|| {
            CloudError::not_found(format!(
                "{} {}: bucket {} does not exist",
                operation, name, location.bucket
            ))
        })
    }
}

fn denied(operation: Operation, key: &CryptoKeyName, member: &str) -> CloudError {
    CloudError::permission_denied(format!("{} {}: {} lacks permission", operation, key, member))
}

/// Shared simulated cloud
#[derive(Debug, Clone, Default)]
pub struct InMemoryCloud {
    state: Arc<Mutex<CloudState>>,
}

impl InMemoryCloud {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CloudState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a key with an empty policy; `owner` may administer and use it
    pub fn create_key(&self, key: &CryptoKeyName, owner: impl Into<String>) -> &Self {
        self.lock().keys.insert(
            key.to_string(),
            KeyRecord {
                owner: owner.into(),
                policy: IamPolicy {
                    version: Some(1),
                    etag: Some(etag_for(0)),
                    bindings: Vec::new(),
                },
                revision: 0,
                pending: HashMap::new(),
            },
        );
        self
    }

    pub fn create_bucket(&self, bucket: impl Into<String>) -> &Self {
        self.lock().buckets.entry(bucket.into()).or_default();
        self
    }

    /// Map an identity to the member it authenticates as
    pub fn register_identity(&self, identity: Identity, member: impl Into<String>) -> &Self {
        self.lock().identities.insert(identity, member.into());
        self
    }

    /// Newly granted members are refused this many decrypts before the
    /// grant takes effect
    pub fn set_propagation_delay(&self, checks: u32) -> &Self {
        self.lock().propagation_delay = checks;
        self
    }

    /// Fail every call of `operation`
    pub fn fail(&self, operation: Operation, fault: Fault) -> &Self {
        self.push_fault(operation, fault, None, None)
    }

    /// Fail the next `times` calls of `operation`
    pub fn fail_times(&self, operation: Operation, fault: Fault, times: u32) -> &Self {
        self.push_fault(operation, fault, None, Some(times))
    }

    /// Fail every call of `operation` made by `member`
    pub fn fail_for(&self, operation: Operation, fault: Fault, member: impl Into<String>) -> &Self {
        self.push_fault(operation, fault, Some(member.into()), None)
    }

    fn push_fault(
        &self,
        operation: Operation,
        fault: Fault,
        member: Option<String>,
        remaining: Option<u32>,
    ) -> &Self {
        self.lock().faults.push(FaultPlan {
            operation,
            fault,
            member,
            remaining,
        });
        self
    }

    pub fn clear_faults(&self) {
        self.lock().faults.clear();
    }

    /// Current policy of a key, bypassing IAM
    pub fn policy(&self, key: &CryptoKeyName) -> Option<IamPolicy> {
        self.lock()
            .keys
            .get(&key.to_string())
            .map(|record| record.policy.clone())
    }

    /// Current object content, bypassing IAM
    pub fn object(&self, location: &ObjectLocation) -> Option<Vec<u8>> {
        self.lock()
            .buckets
            .get(&location.bucket)
            .and_then(|objects| objects.get(&location.object).cloned())
    }

    /// Seed an object directly
    pub fn insert_object(&self, location: &ObjectLocation, data: impl Into<Vec<u8>>) {
        self.lock()
            .buckets
            .entry(location.bucket.clone())
            .or_default()
            .insert(location.object.clone(), data.into());
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, operation: Operation) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.operation == operation)
            .count()
    }

    /// Client acting as `member`
    pub fn as_principal(&self, member: impl Into<String>) -> InMemoryClient {
        InMemoryClient {
            cloud: self.clone(),
            member: member.into(),
        }
    }
}

#[async_trait]
impl SessionFactory for InMemoryCloud {
    async fn connect(&self, identity: &Identity) -> Result<CloudSession> {
        let member = self
            .lock()
            .identities
            .get(identity)
            .cloned()
            .ok_or_else(|| CloudError::auth(format!("no usable credential for {}", identity)))?;

        let client = Arc::new(self.as_principal(member.clone()));
        Ok(CloudSession::new(
            identity.clone(),
            Arc::new(StaticAuthenticator::new(member)),
            client.clone(),
            client,
        ))
    }
}

/// Key service and object store acting as one member
#[derive(Debug, Clone)]
pub struct InMemoryClient {
    cloud: InMemoryCloud,
    member: String,
}

impl InMemoryClient {
    pub fn member(&self) -> &str {
        &self.member
    }
}

#[async_trait]
impl KeyManagement for InMemoryClient {
    async fn get_iam_policy(&self, key: &CryptoKeyName) -> Result<IamPolicy> {
        let mut state = self.cloud.lock();
        let record = state.key_for(Operation::GetIamPolicy, &self.member, key)?;
        if record.owner != self.member {
            return Err(denied(Operation::GetIamPolicy, key, &self.member));
        }
        Ok(record.policy.clone())
    }

    async fn set_iam_policy(&self, key: &CryptoKeyName, policy: &IamPolicy) -> Result<IamPolicy> {
        let mut state = self.cloud.lock();
        let delay = state.propagation_delay;
        let record = state.key_for(Operation::SetIamPolicy, &self.member, key)?;
        if record.owner != self.member {
            return Err(denied(Operation::SetIamPolicy, key, &self.member));
        }

        if let Some(etag) = policy.etag.as_deref() {
            if Some(etag) != record.policy.etag.as_deref() {
                return Err(CloudError::api(
                    409,
                    format!("setIamPolicy {}: etag {} is stale", key, etag),
                ));
            }
        }

        if delay > 0 {
            for binding in policy.bindings.iter().filter(|b| b.role == DECRYPTER_ROLE) {
                for member in &binding.members {
                    if !record.policy.has_member(DECRYPTER_ROLE, member) {
                        record.pending.insert(member.clone(), delay);
                    }
                }
            }
        }

        record.revision += 1;
        record.policy = IamPolicy {
            version: policy.version.or(Some(1)),
            etag: Some(etag_for(record.revision)),
            bindings: policy.bindings.clone(),
        };
        Ok(record.policy.clone())
    }

    async fn encrypt(&self, key: &CryptoKeyName, plaintext_b64: &str) -> Result<Ciphertext> {
        let mut state = self.cloud.lock();
        state.ciphertext_counter += 1;
        let nonce = state.ciphertext_counter;

        let record = state.key_for(Operation::Encrypt, &self.member, key)?;
        let allowed = record.owner == self.member
            || record.policy.has_member(ENCRYPTER_ROLE, &self.member)
            || record.policy.has_member(ENCRYPTER_DECRYPTER_ROLE, &self.member);
        if !allowed {
            return Err(denied(Operation::Encrypt, key, &self.member));
        }

        let plaintext = STANDARD.decode(plaintext_b64).map_err(|e| {
            CloudError::encryption(format!("encrypt {}: plaintext is not base64: {}", key, e))
        })?;
        if plaintext.len() > MAX_PLAINTEXT_BYTES {
            return Err(CloudError::encryption(format!(
                "encrypt {}: plaintext of {} bytes exceeds {} bytes",
                key,
                plaintext.len(),
                MAX_PLAINTEXT_BYTES
            )));
        }

        let sealed = format!("{}:{}:{}:{}", CIPHERTEXT_TAG, nonce, key, plaintext_b64);
        Ok(Ciphertext::new(STANDARD.encode(sealed)))
    }

    async fn decrypt(&self, key: &CryptoKeyName, ciphertext: &Ciphertext) -> Result<String> {
        let mut state = self.cloud.lock();
        let record = state.key_for(Operation::Decrypt, &self.member, key)?;

        if record.owner != self.member {
            if let Some(remaining) = record.pending.get_mut(&self.member) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(denied(Operation::Decrypt, key, &self.member));
                }
            }

            let granted = record.policy.has_member(DECRYPTER_ROLE, &self.member)
                || record.policy.has_member(ENCRYPTER_DECRYPTER_ROLE, &self.member);
            if !granted {
                return Err(denied(Operation::Decrypt, key, &self.member));
            }
        }

        unseal(key, ciphertext)
    }
}

fn unseal(key: &CryptoKeyName, ciphertext: &Ciphertext) -> Result<String> {
    let malformed = || CloudError::decryption(format!("decrypt {}: ciphertext is malformed", key));

    let raw = STANDARD
        .decode(ciphertext.as_str().trim())
        .map_err(|_| malformed())?;
    let sealed = String::from_utf8(raw).map_err(|_| malformed())?;

    let mut parts = sealed.splitn(4, ':');
    let (Some(CIPHERTEXT_TAG), Some(_nonce), Some(sealed_key), Some(payload)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(malformed());
    };

    if sealed_key != key.to_string() {
        return Err(CloudError::decryption(format!(
            "decrypt {}: ciphertext was produced by a different key",
            key
        )));
    }

    Ok(payload.to_string())
}

fn etag_for(revision: u64) -> String {
    STANDARD.encode(format!("rev-{}", revision))
}

#[async_trait]
impl ObjectStore for InMemoryClient {
    async fn put_object(&self, location: &ObjectLocation, data: Vec<u8>) -> Result<()> {
        let mut state = self.cloud.lock();
        let bucket = state.bucket_for(Operation::PutObject, &self.member, location)?;
        bucket.insert(location.object.clone(), data);
        Ok(())
    }

    async fn get_object(&self, location: &ObjectLocation) -> Result<Vec<u8>> {
        let mut state = self.cloud.lock();
        let bucket = state.bucket_for(Operation::GetObject, &self.member, location)?;
        bucket.get(&location.object).cloned().ok_or_else(|| {
            CloudError::not_found(format!("get object {}: no such object", location))
        })
    }

    async fn delete_object(&self, location: &ObjectLocation) -> Result<()> {
        let mut state = self.cloud.lock();
        let bucket = state.bucket_for(Operation::DeleteObject, &self.member, location)?;
        bucket.remove(&location.object).map(|_| ()).ok_or_else(|| {
            CloudError::not_found(format!("delete object {}: no such object", location))
        })
    }
}
