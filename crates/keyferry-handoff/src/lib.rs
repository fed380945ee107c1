//! Secret handoff between two cloud identities
//!
//! A handoff reads a local secret, grants a target service account
//! decrypt rights on a Cloud KMS key, encrypts the secret and parks the
//! ciphertext in a bucket, then proves the grant works by reading and
//! decrypting the object as the target.
//!
//! [`HandoffWorkflow::run`] drives all twelve [`Stage`]s. The individual
//! steps in [`steps`] back the narrower CLI commands.

pub mod encoding;
pub mod error;
pub mod grant;
pub mod journal;
pub mod propagation;
pub mod security;
pub mod steps;
pub mod workflow;

pub use error::{HandoffError, Result, Stage};
pub use grant::{GrantMode, GrantResult};
pub use journal::{CompensationReport, Journal, SideEffect};
pub use security::{AuditLog, SecretBytes};
pub use workflow::{HandoffOutcome, HandoffRequest, HandoffWorkflow};
