//! Cloud KMS client backed by `google-cloud-kms-v1`

use crate::error::{CloudError, Result};
use crate::rpc::{check_endpoint, classify};
use crate::traits::KeyManagement;
use crate::types::{Binding, Ciphertext, IamPolicy, Operation};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use google_cloud_auth::credentials::Credentials;
use google_cloud_iam_v1::model as iam;
use google_cloud_kms_v1::client::KeyManagementService;
use keyferry_core::CryptoKeyName;
use tracing::debug;

/// Newest policy version; requesting it keeps conditional bindings intact
const REQUESTED_POLICY_VERSION: i32 = 3;

/// Cloud KMS client bound to one identity
#[derive(Clone)]
pub struct CloudKmsClient {
    client: KeyManagementService,
}

impl CloudKmsClient {
    pub async fn new(endpoint: &str, credentials: Credentials) -> Result<Self> {
        check_endpoint(endpoint)?;
        let client = KeyManagementService::builder()
            .with_endpoint(endpoint)
            .with_credentials(credentials)
            .build()
            .await
            .map_err(|e| CloudError::client(format!("Cloud KMS: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl KeyManagement for CloudKmsClient {
    async fn get_iam_policy(&self, key: &CryptoKeyName) -> Result<IamPolicy> {
        debug!("getIamPolicy {}", key);
        let mut options = iam::GetPolicyOptions::default();
        options.requested_policy_version = REQUESTED_POLICY_VERSION;

        let policy = self
            .client
            .get_iam_policy()
            .set_resource(key.to_string())
            .set_options(options)
            .send()
            .await
            .map_err(|e| classify(Operation::GetIamPolicy, &key.to_string(), e))?;
        policy_from_wire(policy)
    }

    async fn set_iam_policy(&self, key: &CryptoKeyName, policy: &IamPolicy) -> Result<IamPolicy> {
        debug!("setIamPolicy {} ({} bindings)", key, policy.bindings.len());
        let stored = self
            .client
            .set_iam_policy()
            .set_resource(key.to_string())
            .set_policy(policy_to_wire(policy)?)
            .send()
            .await
            .map_err(|e| classify(Operation::SetIamPolicy, &key.to_string(), e))?;
        policy_from_wire(stored)
    }

    async fn encrypt(&self, key: &CryptoKeyName, plaintext_b64: &str) -> Result<Ciphertext> {
        debug!("encrypt {}", key);
        let plaintext = STANDARD
            .decode(plaintext_b64)
            .map_err(|e| CloudError::encryption(format!("plaintext is not base64: {}", e)))?;

        let response = self
            .client
            .encrypt()
            .set_name(key.to_string())
            .set_plaintext(Bytes::from(plaintext))
            .send()
            .await
            .map_err(|e| classify(Operation::Encrypt, &key.to_string(), e))?;
        Ok(Ciphertext::new(STANDARD.encode(&response.ciphertext)))
    }

    async fn decrypt(&self, key: &CryptoKeyName, ciphertext: &Ciphertext) -> Result<String> {
        debug!("decrypt {}", key);
        let raw = STANDARD
            .decode(ciphertext.as_str().trim())
            .map_err(|e| CloudError::decryption(format!("ciphertext is not base64: {}", e)))?;

        let response = self
            .client
            .decrypt()
            .set_name(key.to_string())
            .set_ciphertext(Bytes::from(raw))
            .send()
            .await
            .map_err(|e| classify(Operation::Decrypt, &key.to_string(), e))?;
        Ok(STANDARD.encode(&response.plaintext))
    }
}

/// Etags travel as base64 text, the way the JSON API shows them
fn policy_from_wire(policy: iam::Policy) -> Result<IamPolicy> {
    let bindings = policy
        .bindings
        .into_iter()
        .map(|binding| -> Result<Binding> {
            let condition = binding.condition.map(serde_json::to_value).transpose()?;
            Ok(Binding {
                role: binding.role,
                members: binding.members,
                condition,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(IamPolicy {
        version: (policy.version != 0).then_some(policy.version),
        etag: (!policy.etag.is_empty()).then(|| STANDARD.encode(&policy.etag)),
        bindings,
    })
}

fn policy_to_wire(policy: &IamPolicy) -> Result<iam::Policy> {
    let mut wire = iam::Policy::default();
    wire.version = policy.version.unwrap_or_default();
    if let Some(etag) = &policy.etag {
        let raw = STANDARD
            .decode(etag)
            .map_err(|e| CloudError::service("InvalidArgument", format!("etag: {}", e)))?;
        wire.etag = Bytes::from(raw);
    }
    wire.bindings = policy
        .bindings
        .iter()
        .map(|binding| -> Result<iam::Binding> {
            let mut wire_binding = iam::Binding::default();
            wire_binding.role = binding.role.clone();
            wire_binding.members = binding.members.clone();
            wire_binding.condition = binding
                .condition
                .clone()
                .map(serde_json::from_value)
                .transpose()?;
            Ok(wire_binding)
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(wire)
}
