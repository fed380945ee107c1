//! Configuration file types (keyferry.yaml)

use super::{CryptoKeyName, ObjectLocation, Principal, RetryPolicy};
use crate::error::Result;
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// Default Cloud KMS API endpoint
pub const DEFAULT_KMS_ENDPOINT: &str = "https://cloudkms.googleapis.com";

/// Default Cloud Storage API endpoint
pub const DEFAULT_STORAGE_ENDPOINT: &str = "https://storage.googleapis.com";

/// Everything one handoff run needs to know
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct HandoffSettings {
    /// Cloud project owning the key ring
    pub project_id: String,

    /// Region of the key ring
    pub location_id: String,

    pub key_ring_id: String,

    pub crypto_key_id: String,

    /// Bucket receiving the ciphertext
    pub bucket: String,

    /// Object name of the ciphertext
    pub object: String,

    /// Local file holding the plaintext
    pub secret_file: Utf8PathBuf,

    pub target: TargetSettings,

    pub grant: GrantSettings,

    /// Bounded wait for the decrypt grant to become visible
    pub propagation: RetryPolicy,

    pub endpoints: EndpointSettings,

    /// Undo the policy change and object write when a later stage fails
    pub compensate_on_failure: bool,
}

impl Default for HandoffSettings {
    fn default() -> Self {
        Self {
            project_id: "your_project_id".to_string(),
            location_id: "us-central1".to_string(),
            key_ring_id: "mykeyring".to_string(),
            crypto_key_id: "key1".to_string(),
            bucket: "mybucket".to_string(),
            object: "service_account.json.encrypted".to_string(),
            secret_file: Utf8PathBuf::from("secret_file.txt"),
            target: TargetSettings::default(),
            grant: GrantSettings::default(),
            propagation: RetryPolicy::default(),
            endpoints: EndpointSettings::default(),
            compensate_on_failure: false,
        }
    }
}

impl HandoffSettings {
    /// Crypto key this run encrypts and decrypts with
    pub fn crypto_key(&self) -> Result<CryptoKeyName> {
        CryptoKeyName::new(
            &self.project_id,
            &self.location_id,
            &self.key_ring_id,
            &self.crypto_key_id,
        )
    }

    /// Where the ciphertext is stored
    pub fn object_location(&self) -> Result<ObjectLocation> {
        ObjectLocation::new(&self.bucket, &self.object)
    }

    /// Identity receiving decrypt rights
    pub fn target_principal(&self) -> Result<Principal> {
        Principal::new(&self.target.service_account)
    }

    /// Check every derived resource name up front
    pub fn validate(&self) -> Result<()> {
        self.crypto_key()?;
        self.object_location()?;
        self.target_principal()?;
        if self.target.key_file.as_str().is_empty() {
            return Err(crate::error::Error::missing_field("target.key-file"));
        }
        if self.secret_file.as_str().is_empty() {
            return Err(crate::error::Error::missing_field("secret-file"));
        }
        if self.propagation.max_attempts == 0 {
            return Err(crate::error::Error::invalid_config(
                "propagation.max-attempts must be at least 1",
            ));
        }
        Ok(())
    }
}

/// The service account that must be able to decrypt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct TargetSettings {
    /// Service-account e-mail granted the decrypter role
    pub service_account: String,

    /// Private key file used to act as that service account
    pub key_file: Utf8PathBuf,
}

impl Default for TargetSettings {
    fn default() -> Self {
        Self {
            service_account: "svc-account-secret@PROJECT.iam.gserviceaccount.com".to_string(),
            key_file: Utf8PathBuf::from("svc-account-secret.json"),
        }
    }
}

/// IAM grant behaviour
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct GrantSettings {
    /// Skip the append when the member already holds the decrypter role
    pub dedupe: bool,
}

/// API endpoints, overridable for emulators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct EndpointSettings {
    pub kms: String,
    pub storage: String,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            kms: DEFAULT_KMS_ENDPOINT.to_string(),
            storage: DEFAULT_STORAGE_ENDPOINT.to_string(),
        }
    }
}
