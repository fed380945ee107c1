//! Transport encoding between plaintext bytes and KMS payload text

use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncodingError {
    #[error("payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("stored ciphertext is not UTF-8 text: {0}")]
    NotText(#[from] std::string::FromUtf8Error),
}

/// Standard base64 with padding
pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Inverse of [`encode`]; surrounding whitespace is ignored
pub fn decode(text: &str) -> Result<Vec<u8>, EncodingError> {
    Ok(STANDARD.decode(text.trim())?)
}

/// Object content as ciphertext text
pub fn object_text(bytes: Vec<u8>) -> Result<String, EncodingError> {
    Ok(String::from_utf8(bytes)?)
}
