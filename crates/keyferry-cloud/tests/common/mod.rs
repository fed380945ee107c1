//! Shared helpers for keyferry-cloud integration tests

#![allow(dead_code)]

use google_cloud_auth::credentials::{anonymous, Credentials};
use keyferry_core::{CryptoKeyName, ObjectLocation};
use serde_json::{json, Value};
use std::ffi::OsString;

pub const KEY_PATH: &str = "/v1/projects/p/locations/us-central1/keyRings/kr/cryptoKeys/k1";
pub const PRIVATE_KEY_PEM: &str = include_str!("../fixtures/test_rsa_key.pem");
pub const SERVICE_ACCOUNT_EMAIL: &str = "svc-account-secret@p.iam.gserviceaccount.com";

/// Credentials that add no authorization header
pub fn anonymous_credentials() -> Credentials {
    anonymous::Builder::new().build()
}

pub fn key_name() -> CryptoKeyName {
    CryptoKeyName::new("p", "us-central1", "kr", "k1").unwrap()
}

pub fn location() -> ObjectLocation {
    ObjectLocation::new("b1", "service_account.json.encrypted").unwrap()
}

pub fn google_error(code: u16, status: &str, message: &str) -> Value {
    json!({"error": {"code": code, "message": message, "status": status}})
}

pub fn service_account_json() -> String {
    json!({
        "type": "service_account",
        "project_id": "p",
        "private_key_id": "kid-1",
        "private_key": PRIVATE_KEY_PEM,
        "client_email": SERVICE_ACCOUNT_EMAIL,
        "client_id": "1234567890",
        "token_uri": "https://oauth2.googleapis.com/token",
    })
    .to_string()
}

pub fn authorized_user_json() -> String {
    json!({
        "type": "authorized_user",
        "client_id": "cid.apps.googleusercontent.com",
        "client_secret": "client-secret",
        "refresh_token": "1//refresh",
    })
    .to_string()
}

/// Sets environment variables for one test and restores them on drop
pub struct EnvGuard {
    saved: Vec<(&'static str, Option<OsString>)>,
}

impl EnvGuard {
    pub fn new() -> Self {
        Self { saved: Vec::new() }
    }

    fn save(&mut self, name: &'static str) {
        if !self.saved.iter().any(|(n, _)| *n == name) {
            self.saved.push((name, std::env::var_os(name)));
        }
    }

    pub fn set(&mut self, name: &'static str, value: impl AsRef<std::ffi::OsStr>) -> &mut Self {
        self.save(name);
        std::env::set_var(name, value);
        self
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (name, value) in self.saved.drain(..) {
            match value {
                Some(value) => std::env::set_var(name, value),
                None => std::env::remove_var(name),
            }
        }
    }
}
