//! Stage model and handoff errors

use crate::encoding::EncodingError;
use camino::Utf8PathBuf;
use keyferry_cloud::CloudError;
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, HandoffError>;

/// The twelve steps of a handoff, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    ReadSecret,
    ConnectInitial,
    FetchPolicy,
    AppendBinding,
    WritePolicy,
    Encrypt,
    StoreObject,
    SwitchIdentity,
    ConnectTarget,
    FetchObject,
    Decrypt,
    Decode,
}

impl Stage {
    pub const ALL: [Stage; 12] = [
        Stage::ReadSecret,
        Stage::ConnectInitial,
        Stage::FetchPolicy,
        Stage::AppendBinding,
        Stage::WritePolicy,
        Stage::Encrypt,
        Stage::StoreObject,
        Stage::SwitchIdentity,
        Stage::ConnectTarget,
        Stage::FetchObject,
        Stage::Decrypt,
        Stage::Decode,
    ];

    /// 1-based position
    pub fn number(self) -> u8 {
        match self {
            Stage::ReadSecret => 1,
            Stage::ConnectInitial => 2,
            Stage::FetchPolicy => 3,
            Stage::AppendBinding => 4,
            Stage::WritePolicy => 5,
            Stage::Encrypt => 6,
            Stage::StoreObject => 7,
            Stage::SwitchIdentity => 8,
            Stage::ConnectTarget => 9,
            Stage::FetchObject => 10,
            Stage::Decrypt => 11,
            Stage::Decode => 12,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Stage::ReadSecret => "read secret",
            Stage::ConnectInitial => "connect as initial identity",
            Stage::FetchPolicy => "fetch key policy",
            Stage::AppendBinding => "append decrypter binding",
            Stage::WritePolicy => "write key policy",
            Stage::Encrypt => "encrypt secret",
            Stage::StoreObject => "store ciphertext",
            Stage::SwitchIdentity => "switch to target identity",
            Stage::ConnectTarget => "connect as target identity",
            Stage::FetchObject => "fetch ciphertext",
            Stage::Decrypt => "decrypt as target",
            Stage::Decode => "decode plaintext",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage {} ({})", self.number(), self.label())
    }
}

/// Why a handoff stopped
#[derive(Error, Debug)]
pub enum HandoffError {
    /// Settings did not yield valid resource names
    #[error("Invalid handoff settings: {0}")]
    Config(#[from] keyferry_core::Error),

    #[error("{}: cannot read {path}: {source}", Stage::ReadSecret)]
    ReadSecret {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("{stage}: {source}")]
    Stage { stage: Stage, source: CloudError },

    #[error("{stage}: {source}")]
    Encoding { stage: Stage, source: EncodingError },

    /// Decrypt kept being refused after the policy write; usually a matter
    /// of waiting for IAM to catch up
    #[error(
        "{}: decrypter grant not visible after {attempts} attempts, retry later: {source}",
        Stage::Decrypt
    )]
    GrantNotPropagated { attempts: u32, source: CloudError },
}

impl HandoffError {
    pub fn cloud(stage: Stage, source: CloudError) -> Self {
        Self::Stage { stage, source }
    }

    pub fn encoding(stage: Stage, source: EncodingError) -> Self {
        Self::Encoding { stage, source }
    }

    /// Stage that failed; `None` for settings errors raised before stage 1
    pub fn stage(&self) -> Option<Stage> {
        match self {
            HandoffError::Config(_) => None,
            HandoffError::ReadSecret { .. } => Some(Stage::ReadSecret),
            HandoffError::Stage { stage, .. } | HandoffError::Encoding { stage, .. } => Some(*stage),
            HandoffError::GrantNotPropagated { .. } => Some(Stage::Decrypt),
        }
    }

    pub fn cloud_error(&self) -> Option<&CloudError> {
        match self {
            HandoffError::Stage { source, .. } | HandoffError::GrantNotPropagated { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }

    /// The service refused the caller, including a decrypter grant that
    /// never became visible; [`is_recoverable`](Self::is_recoverable) tells
    /// the two apart
    pub fn is_permission_denied(&self) -> bool {
        self.cloud_error()
            .is_some_and(|source| source.is_permission_denied())
    }

    /// Re-running later may succeed without changing anything
    pub fn is_recoverable(&self) -> bool {
        matches!(self, HandoffError::GrantNotPropagated { .. })
    }
}
