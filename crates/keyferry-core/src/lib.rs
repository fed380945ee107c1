//! # keyferry-core
//!
//! Core library for keyferry providing:
//! - Configuration file parsing (keyferry.yaml) and flag/file/default merging
//! - Resource-name types for Cloud KMS keys, storage objects and principals
//! - Retry execution engine with policy-based configuration

pub mod config;
pub mod error;
pub mod retry;
pub mod types;

pub use config::{KeyferryConfig, ConfigOverrides};
pub use error::{Error, Result};
pub use types::{CryptoKeyName, HandoffSettings, ObjectLocation, Principal, RetryPolicy};
