//! Error taxonomy for cloud calls

use thiserror::Error;

/// Result type alias using keyferry-cloud's error type
pub type Result<T> = std::result::Result<T, CloudError>;

/// Failures from key management, storage and credential calls
#[derive(Error, Debug)]
pub enum CloudError {
    /// Local or object-store I/O failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No usable credential, or the token exchange was refused
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    /// A credential file exists but cannot be used
    #[error("Invalid credentials file {path}: {message}")]
    InvalidCredentials { path: String, message: String },

    /// Caller lacks rights for the operation
    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    /// Key, bucket or object does not exist
    #[error("Not found: {message}")]
    NotFound { message: String },

    /// Service-side encryption failure (quota, disabled key, bad input)
    #[error("Encryption failed: {message}")]
    Encryption { message: String },

    /// Service-side decryption failure (malformed or foreign ciphertext)
    #[error("Decryption failed: {message}")]
    Decryption { message: String },

    /// Any other non-success HTTP response
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// Any other RPC status reported by the service
    #[error("API error ({code}): {message}")]
    Service { code: String, message: String },

    /// Endpoint URL could not be used
    #[error("Invalid endpoint '{endpoint}': {message}")]
    InvalidEndpoint { endpoint: String, message: String },

    /// A Google API client could not be built
    #[error("Client setup failed: {message}")]
    Client { message: String },

    /// Network or protocol failure before a response arrived
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// Payload did not match the expected shape
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CloudError {
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    pub fn invalid_credentials(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidCredentials {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn encryption(message: impl Into<String>) -> Self {
        Self::Encryption {
            message: message.into(),
        }
    }

    pub fn decryption(message: impl Into<String>) -> Self {
        Self::Decryption {
            message: message.into(),
        }
    }

    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn service(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Service {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn client(message: impl Into<String>) -> Self {
        Self::Client {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn invalid_endpoint(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Credential problems, whether discovery or token exchange
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. } | Self::InvalidCredentials { .. })
    }
}
