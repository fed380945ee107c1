//! Shared fixture for handoff integration tests

#![allow(dead_code)]

use camino::Utf8PathBuf;
use keyferry_cloud::memory::InMemoryCloud;
use keyferry_cloud::Identity;
use keyferry_core::types::RetryStrategy;
use keyferry_core::{CryptoKeyName, ObjectLocation, Principal, RetryPolicy};
use keyferry_handoff::{GrantMode, HandoffRequest, HandoffWorkflow};
use std::sync::Arc;
use tempfile::TempDir;

pub const OWNER: &str = "user:ops@example.com";
pub const TARGET_EMAIL: &str = "svc-account-secret@p.iam.gserviceaccount.com";

pub fn target_member() -> String {
    format!("serviceAccount:{}", TARGET_EMAIL)
}

pub fn key() -> CryptoKeyName {
    "projects/p/locations/us-central1/keyRings/kr/cryptoKeys/k1"
        .parse()
        .unwrap()
}

pub fn location() -> ObjectLocation {
    ObjectLocation::new("b1", "service_account.json.encrypted").unwrap()
}

/// Fixed tiny delays so retry tests stay fast
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        strategy: RetryStrategy::FixedDelay,
        initial_delay_ms: 1,
        max_delay_ms: 1,
        ..Default::default()
    }
}

/// A simulated project: key k1 owned by the ambient identity, bucket b1,
/// and a target service account whose key file maps to its member
pub struct Fixture {
    pub cloud: InMemoryCloud,
    pub dir: TempDir,
    pub request: HandoffRequest,
}

impl Fixture {
    pub fn new(secret: &[u8]) -> Self {
        let dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let secret_file = root.join("secret_file.txt");
        std::fs::write(&secret_file, secret).unwrap();
        let target_key_file = root.join("svc-account-secret.json");

        let request = HandoffRequest {
            key: key(),
            location: location(),
            secret_file,
            target: Principal::new(TARGET_EMAIL).unwrap(),
            target_key_file,
            grant_mode: GrantMode::Append,
            propagation: fast_retry(5),
            compensate_on_failure: false,
        };

        let cloud = InMemoryCloud::new();
        cloud
            .create_key(&key(), OWNER)
            .create_bucket("b1")
            .register_identity(Identity::Ambient, OWNER)
            .register_identity(request.target_identity(), target_member());

        Self {
            cloud,
            dir,
            request,
        }
    }

    pub fn workflow(&self) -> HandoffWorkflow {
        HandoffWorkflow::new(Arc::new(self.cloud.clone()))
    }
}
