//! Cloud collaborators for keyferry
//!
//! This crate provides:
//! - **Traits**: `KeyManagement`, `ObjectStore` and `SessionFactory`, the seams
//!   the handoff workflow is written against
//! - **Google Cloud**: Cloud KMS and Cloud Storage adapters over the
//!   google-cloud-rust clients, with credentials from google-cloud-auth
//! - **In-memory**: a simulated key service and bucket store with IAM
//!   enforcement, propagation delay and fault injection

pub mod credentials;
pub mod error;
pub mod kms;
pub mod memory;
mod rpc;
pub mod session;
pub mod storage;
pub mod traits;
pub mod types;

pub use error::{CloudError, Result};
pub use kms::CloudKmsClient;
pub use session::{CloudSession, GoogleSessionFactory, Identity, SessionFactory};
pub use storage::CloudStorageClient;
pub use traits::{KeyManagement, ObjectStore};
pub use types::{Binding, Ciphertext, IamPolicy, Operation};
