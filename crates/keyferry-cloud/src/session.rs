//! Identities and the sessions built from them
//!
//! A session bundles the key-management and object-store clients for one
//! identity. Switching identity means building a second session; nothing
//! process-wide is mutated.

use crate::credentials::{Authenticator, GoogleCredentials};
use crate::error::Result;
use crate::kms::CloudKmsClient;
use crate::rpc::check_endpoint;
use crate::storage::CloudStorageClient;
use crate::traits::{KeyManagement, ObjectStore};
use async_trait::async_trait;
use keyferry_core::types::EndpointSettings;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Which credential a session acts as
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    /// Application-default credentials of the environment
    Ambient,
    /// An explicit credential file, typically a service-account key
    ServiceAccountKey(PathBuf),
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Ambient => f.write_str("ambient credentials"),
            Identity::ServiceAccountKey(path) => write!(f, "key file {}", path.display()),
        }
    }
}

/// Clients bound to one identity
#[derive(Clone)]
pub struct CloudSession {
    identity: Identity,
    auth: Arc<dyn Authenticator>,
    kms: Arc<dyn KeyManagement>,
    store: Arc<dyn ObjectStore>,
}

impl CloudSession {
    pub fn new(
        identity: Identity,
        auth: Arc<dyn Authenticator>,
        kms: Arc<dyn KeyManagement>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            identity,
            auth,
            kms,
            store,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn principal(&self) -> String {
        self.auth.principal()
    }

    pub fn kms(&self) -> &dyn KeyManagement {
        self.kms.as_ref()
    }

    pub fn store(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }

    /// Check that the identity can mint a token
    pub async fn authenticate(&self) -> Result<()> {
        self.auth.authenticate().await?;
        debug!("Authenticated as {}", self.principal());
        Ok(())
    }
}

impl fmt::Debug for CloudSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudSession")
            .field("identity", &self.identity)
            .field("principal", &self.principal())
            .finish_non_exhaustive()
    }
}

/// Builds sessions for identities
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn connect(&self, identity: &Identity) -> Result<CloudSession>;
}

/// Sessions against Google Cloud KMS and Cloud Storage
pub struct GoogleSessionFactory {
    kms_endpoint: String,
    storage_endpoint: String,
}

impl GoogleSessionFactory {
    pub fn new(endpoints: &EndpointSettings) -> Result<Self> {
        check_endpoint(&endpoints.kms)?;
        check_endpoint(&endpoints.storage)?;

        Ok(Self {
            kms_endpoint: endpoints.kms.clone(),
            storage_endpoint: endpoints.storage.clone(),
        })
    }
}

#[async_trait]
impl SessionFactory for GoogleSessionFactory {
    async fn connect(&self, identity: &Identity) -> Result<CloudSession> {
        let credentials = match identity {
            Identity::Ambient => GoogleCredentials::application_default()?,
            Identity::ServiceAccountKey(path) => GoogleCredentials::from_key_file(path).await?,
        };
        debug!("Building clients for {}", credentials.principal());

        let kms = CloudKmsClient::new(&self.kms_endpoint, credentials.credentials()).await?;
        let store =
            CloudStorageClient::new(&self.storage_endpoint, credentials.credentials()).await?;

        Ok(CloudSession::new(
            identity.clone(),
            Arc::new(credentials),
            Arc::new(kms),
            Arc::new(store),
        ))
    }
}
