//! Endpoint checks and error mapping shared by the KMS and Storage clients

use crate::error::{CloudError, Result};
use crate::types::Operation;
use google_cloud_gax::error::rpc::Code;
use google_cloud_gax::error::Error as GaxError;
use url::Url;

/// Reject endpoints the client builders could not use
pub(crate) fn check_endpoint(endpoint: &str) -> Result<()> {
    let url = Url::parse(endpoint)
        .map_err(|e| CloudError::invalid_endpoint(endpoint, e.to_string()))?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(CloudError::invalid_endpoint(endpoint, "not an http(s) base URL"));
    }
    Ok(())
}

/// Map a Google client error onto the error taxonomy
pub(crate) fn classify(operation: Operation, resource: &str, err: GaxError) -> CloudError {
    let message = format!("{} {}: {}", operation, resource, detail(&err));

    if err.is_authentication() {
        return CloudError::auth(message);
    }

    if let Some(status) = err.status() {
        return match status.code {
            Code::Unauthenticated => CloudError::auth(message),
            Code::PermissionDenied => CloudError::permission_denied(message),
            Code::NotFound => CloudError::not_found(message),
            Code::InvalidArgument | Code::FailedPrecondition | Code::ResourceExhausted
                if operation == Operation::Encrypt =>
            {
                CloudError::encryption(message)
            }
            Code::InvalidArgument | Code::FailedPrecondition if operation == Operation::Decrypt => {
                CloudError::decryption(message)
            }
            code => CloudError::service(format!("{:?}", code), message),
        };
    }

    match err.http_status_code() {
        Some(401) => CloudError::auth(message),
        Some(403) => CloudError::permission_denied(message),
        Some(404) => CloudError::not_found(message),
        Some(status) => CloudError::api(status, message),
        None => CloudError::transport(message),
    }
}

fn detail(err: &GaxError) -> String {
    match err.status() {
        Some(status) if !status.message.is_empty() => status.message.clone(),
        _ => err.to_string(),
    }
}
