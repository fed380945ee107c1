//! Wire types shared by the Google clients and the in-memory simulator

use serde::{Deserialize, Serialize};
use std::fmt;

/// IAM policy attached to a crypto key
///
/// Field names follow the Google JSON representation. The etag read from
/// the service is sent back unchanged on write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IamPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bindings: Vec<Binding>,
}

impl IamPolicy {
    /// Whether any binding for `role` lists `member`
    pub fn has_member(&self, role: &str, member: &str) -> bool {
        self.bindings
            .iter()
            .any(|b| b.role == role && b.members.iter().any(|m| m == member))
    }

    /// Number of bindings for `role` that list `member`
    pub fn binding_count(&self, role: &str, member: &str) -> usize {
        self.bindings
            .iter()
            .filter(|b| b.role == role && b.members.iter().any(|m| m == member))
            .count()
    }
}

/// One role granted to a list of members
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub role: String,

    #[serde(default)]
    pub members: Vec<String>,

    /// Conditional bindings are carried through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<serde_json::Value>,
}

impl Binding {
    pub fn new(role: impl Into<String>, members: Vec<String>) -> Self {
        Self {
            role: role.into(),
            members,
            condition: None,
        }
    }
}

/// Opaque ciphertext text returned by the key service
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Ciphertext(String);

impl Ciphertext {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Ciphertext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Ciphertext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ciphertext({} chars)", self.0.len())
    }
}

/// Remote operations keyferry performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    GetIamPolicy,
    SetIamPolicy,
    Encrypt,
    Decrypt,
    PutObject,
    GetObject,
    DeleteObject,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::GetIamPolicy => "getIamPolicy",
            Operation::SetIamPolicy => "setIamPolicy",
            Operation::Encrypt => "encrypt",
            Operation::Decrypt => "decrypt",
            Operation::PutObject => "put object",
            Operation::GetObject => "get object",
            Operation::DeleteObject => "delete object",
        };
        f.write_str(name)
    }
}
