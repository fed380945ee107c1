//! Google credentials for the two identities a handoff uses
//!
//! The ambient identity comes from application-default credentials. The
//! target identity comes from a service-account key file, which is read
//! once and never modified.

use crate::error::{CloudError, Result};
use async_trait::async_trait;
use google_cloud_auth::credentials::{service_account, Builder as AdcBuilder, Credentials};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use tracing::debug;

/// Proves an identity can obtain tokens and names it for logs
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self) -> Result<()>;

    /// Human-readable principal
    fn principal(&self) -> String;
}

/// Fixed principal that always authenticates; used by the in-memory cloud
#[derive(Debug, Clone)]
pub struct StaticAuthenticator {
    principal: String,
}

impl StaticAuthenticator {
    pub fn new(principal: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
        }
    }
}

#[async_trait]
impl Authenticator for StaticAuthenticator {
    async fn authenticate(&self) -> Result<()> {
        Ok(())
    }

    fn principal(&self) -> String {
        self.principal.clone()
    }
}

/// Service-account key file contents
///
/// Only the fields keyferry checks are typed; the full document is handed
/// to the credentials builder unchanged.
#[derive(Clone)]
pub struct ServiceAccountKey {
    client_email: String,
    document: serde_json::Value,
}

#[derive(Deserialize)]
struct KeyHeader {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    client_email: Option<String>,
    #[serde(default)]
    private_key: Option<String>,
}

impl ServiceAccountKey {
    pub async fn read(path: &Path) -> Result<Self> {
        let label = path.display().to_string();
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CloudError::invalid_credentials(&label, e.to_string()))?;
        Self::from_json(&label, &contents)
    }

    pub fn from_json(label: &str, contents: &str) -> Result<Self> {
        let document: serde_json::Value = serde_json::from_str(contents)
            .map_err(|e| CloudError::invalid_credentials(label, format!("malformed: {}", e)))?;
        let header: KeyHeader = serde_json::from_value(document.clone())
            .map_err(|e| CloudError::invalid_credentials(label, format!("malformed: {}", e)))?;

        if header.kind != "service_account" {
            return Err(CloudError::invalid_credentials(
                label,
                format!("expected a service_account key, found '{}'", header.kind),
            ));
        }
        let client_email = header
            .client_email
            .filter(|email| !email.is_empty())
            .ok_or_else(|| CloudError::invalid_credentials(label, "missing client_email"))?;
        if header.private_key.as_deref().map_or(true, str::is_empty) {
            return Err(CloudError::invalid_credentials(label, "missing private_key"));
        }

        Ok(Self {
            client_email,
            document,
        })
    }

    pub fn client_email(&self) -> &str {
        &self.client_email
    }
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .finish_non_exhaustive()
    }
}

/// Credentials built by google-cloud-auth, plus the principal they act as
#[derive(Clone)]
pub struct GoogleCredentials {
    credentials: Credentials,
    principal: String,
}

impl GoogleCredentials {
    /// Application-default credentials of the environment
    pub fn application_default() -> Result<Self> {
        let credentials = AdcBuilder::default().build().map_err(|e| {
            CloudError::auth(format!("application-default credentials: {}", e))
        })?;
        Ok(Self {
            credentials,
            principal: "application-default credentials".to_string(),
        })
    }

    pub async fn from_key_file(path: &Path) -> Result<Self> {
        let key = ServiceAccountKey::read(path).await?;
        Self::from_service_account(&path.display().to_string(), key)
    }

    pub fn from_service_account(label: &str, key: ServiceAccountKey) -> Result<Self> {
        let principal = key.client_email.clone();
        let credentials = service_account::Builder::new(key.document)
            .build()
            .map_err(|e| CloudError::invalid_credentials(label, e.to_string()))?;
        debug!("Loaded service account key for {}", principal);
        Ok(Self {
            credentials,
            principal,
        })
    }

    pub fn credentials(&self) -> Credentials {
        self.credentials.clone()
    }
}

impl fmt::Debug for GoogleCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleCredentials")
            .field("principal", &self.principal)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Authenticator for GoogleCredentials {
    async fn authenticate(&self) -> Result<()> {
        self.credentials
            .headers(http::Extensions::new())
            .await
            .map_err(|e| CloudError::auth(format!("{}: {}", self.principal, e)))?;
        Ok(())
    }

    fn principal(&self) -> String {
        self.principal.clone()
    }
}
