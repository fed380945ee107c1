//! Cloud Storage client backed by `google-cloud-storage`

use crate::error::{CloudError, Result};
use crate::rpc::{check_endpoint, classify};
use crate::traits::ObjectStore;
use crate::types::Operation;
use async_trait::async_trait;
use bytes::Bytes;
use google_cloud_auth::credentials::Credentials;
use google_cloud_gax::error::Error as GaxError;
use google_cloud_storage::client::{Storage, StorageControl};
use keyferry_core::ObjectLocation;
use tracing::debug;

/// Cloud Storage client bound to one identity
///
/// Reads and writes go through [`Storage`]; deletes through
/// [`StorageControl`].
#[derive(Clone)]
pub struct CloudStorageClient {
    storage: Storage,
    control: StorageControl,
}

impl CloudStorageClient {
    pub async fn new(endpoint: &str, credentials: Credentials) -> Result<Self> {
        check_endpoint(endpoint)?;
        let storage = Storage::builder()
            .with_endpoint(endpoint)
            .with_credentials(credentials.clone())
            .build()
            .await
            .map_err(|e| CloudError::client(format!("Cloud Storage: {}", e)))?;
        let control = StorageControl::builder()
            .with_endpoint(endpoint)
            .with_credentials(credentials)
            .build()
            .await
            .map_err(|e| CloudError::client(format!("Cloud Storage control: {}", e)))?;
        Ok(Self { storage, control })
    }
}

/// Bucket resource name in the form the v2 API expects
fn bucket_path(location: &ObjectLocation) -> String {
    format!("projects/_/buckets/{}", location.bucket)
}

#[async_trait]
impl ObjectStore for CloudStorageClient {
    async fn put_object(&self, location: &ObjectLocation, data: Vec<u8>) -> Result<()> {
        debug!("write gs://{} ({} bytes)", location, data.len());
        let object = self
            .storage
            .write_object(bucket_path(location), location.object.clone(), Bytes::from(data))
            .send_unbuffered()
            .await
            .map_err(|e| classify(Operation::PutObject, &location.to_string(), e))?;
        debug!("Stored gs://{} generation {}", location, object.generation);
        Ok(())
    }

    async fn get_object(&self, location: &ObjectLocation) -> Result<Vec<u8>> {
        debug!("read gs://{}", location);
        let fail = |e: GaxError| classify(Operation::GetObject, &location.to_string(), e);

        let mut reader = self
            .storage
            .read_object(bucket_path(location), location.object.clone())
            .send()
            .await
            .map_err(fail)?;

        let mut contents = Vec::new();
        while let Some(chunk) = reader.next().await.transpose().map_err(fail)? {
            contents.extend_from_slice(&chunk);
        }
        Ok(contents)
    }

    async fn delete_object(&self, location: &ObjectLocation) -> Result<()> {
        debug!("delete gs://{}", location);
        self.control
            .delete_object()
            .set_bucket(bucket_path(location))
            .set_object(location.object.clone())
            .send()
            .await
            .map_err(|e| classify(Operation::DeleteObject, &location.to_string(), e))?;
        Ok(())
    }
}
