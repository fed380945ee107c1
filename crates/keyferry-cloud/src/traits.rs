//! Collaborator traits the handoff workflow is written against

use crate::error::Result;
use crate::types::{Ciphertext, IamPolicy};
use async_trait::async_trait;
use keyferry_core::{CryptoKeyName, ObjectLocation};

/// Key management: IAM policy read/write and encrypt/decrypt on one key
#[async_trait]
pub trait KeyManagement: Send + Sync {
    /// Fetch the key's current IAM policy
    async fn get_iam_policy(&self, key: &CryptoKeyName) -> Result<IamPolicy>;

    /// Replace the key's IAM policy, returning the stored policy
    async fn set_iam_policy(&self, key: &CryptoKeyName, policy: &IamPolicy) -> Result<IamPolicy>;

    /// Encrypt base64 transport text
    async fn encrypt(&self, key: &CryptoKeyName, plaintext_b64: &str) -> Result<Ciphertext>;

    /// Decrypt, returning base64 transport text
    async fn decrypt(&self, key: &CryptoKeyName, ciphertext: &Ciphertext) -> Result<String>;
}

/// Bucket-backed object storage
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Create or replace the object with exactly `data`
    async fn put_object(&self, location: &ObjectLocation, data: Vec<u8>) -> Result<()>;

    /// Read the full object content
    async fn get_object(&self, location: &ObjectLocation) -> Result<Vec<u8>>;

    async fn delete_object(&self, location: &ObjectLocation) -> Result<()>;
}
