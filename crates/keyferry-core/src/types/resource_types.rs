//! Resource names for the cloud objects a handoff touches

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// IAM role that allows decrypting with a single crypto key
pub const DECRYPTER_ROLE: &str = "roles/cloudkms.cryptoKeyDecrypter";

/// Member prefix IAM uses for service-account identities
pub const SERVICE_ACCOUNT_PREFIX: &str = "serviceAccount:";

/// Fully-qualified Cloud KMS crypto key reference
///
/// Renders as `projects/{p}/locations/{l}/keyRings/{kr}/cryptoKeys/{k}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CryptoKeyName {
    pub project_id: String,
    pub location_id: String,
    pub key_ring_id: String,
    pub crypto_key_id: String,
}

impl CryptoKeyName {
    /// Build a key name, rejecting empty segments and segments containing `/`
    pub fn new(
        project_id: impl Into<String>,
        location_id: impl Into<String>,
        key_ring_id: impl Into<String>,
        crypto_key_id: impl Into<String>,
    ) -> Result<Self> {
        let name = Self {
            project_id: project_id.into(),
            location_id: location_id.into(),
            key_ring_id: key_ring_id.into(),
            crypto_key_id: crypto_key_id.into(),
        };

        for (field, value) in [
            ("project id", &name.project_id),
            ("location id", &name.location_id),
            ("key ring id", &name.key_ring_id),
            ("crypto key id", &name.crypto_key_id),
        ] {
            validate_segment(&name.to_string(), field, value)?;
        }

        Ok(name)
    }
}

impl fmt::Display for CryptoKeyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "projects/{}/locations/{}/keyRings/{}/cryptoKeys/{}",
            self.project_id, self.location_id, self.key_ring_id, self.crypto_key_id
        )
    }
}

impl FromStr for CryptoKeyName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('/').collect();
        match parts.as_slice() {
            ["projects", project, "locations", location, "keyRings", ring, "cryptoKeys", key] => {
                Self::new(*project, *location, *ring, *key)
            }
            _ => Err(Error::invalid_resource_name(
                s,
                "expected projects/{project}/locations/{location}/keyRings/{ring}/cryptoKeys/{key}",
            )),
        }
    }
}

/// Bucket and object name of the stored ciphertext
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectLocation {
    pub bucket: String,
    pub object: String,
}

impl ObjectLocation {
    /// Build a location; the bucket may not contain `/`, the object may
    pub fn new(bucket: impl Into<String>, object: impl Into<String>) -> Result<Self> {
        let location = Self {
            bucket: bucket.into(),
            object: object.into(),
        };
        validate_segment(&location.to_string(), "bucket", &location.bucket)?;
        if location.object.is_empty() {
            return Err(Error::invalid_resource_name(
                location.to_string(),
                "object name is empty",
            ));
        }
        Ok(location)
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.object)
    }
}

/// Service-account identity that receives decrypt rights
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Principal {
    email: String,
}

impl Principal {
    /// Accepts either a bare e-mail or an IAM member string with the
    /// `serviceAccount:` prefix
    pub fn new(value: impl AsRef<str>) -> Result<Self> {
        let trimmed = value.as_ref().trim();
        let email = trimmed
            .strip_prefix(SERVICE_ACCOUNT_PREFIX)
            .unwrap_or(trimmed);
        if email.is_empty() {
            return Err(Error::invalid_resource_name(
                value.as_ref(),
                "service account is empty",
            ));
        }
        Ok(Self {
            email: email.to_string(),
        })
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    /// IAM member string, e.g. `serviceAccount:svc@p.iam.gserviceaccount.com`
    pub fn member(&self) -> String {
        format!("{}{}", SERVICE_ACCOUNT_PREFIX, self.email)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.email)
    }
}

impl TryFrom<String> for Principal {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Principal> for String {
    fn from(principal: Principal) -> Self {
        principal.email
    }
}

fn validate_segment(name: &str, field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::invalid_resource_name(
            name,
            format!("{} is empty", field),
        ));
    }
    if value.contains('/') {
        return Err(Error::invalid_resource_name(
            name,
            format!("{} may not contain '/'", field),
        ));
    }
    Ok(())
}
