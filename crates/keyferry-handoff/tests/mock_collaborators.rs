//! Stage ordering and error attribution with mocked collaborators

mod common;

use async_trait::async_trait;
use common::*;
use keyferry_cloud::credentials::StaticAuthenticator;
use keyferry_cloud::{
    Ciphertext, CloudError, CloudSession, IamPolicy, Identity, KeyManagement, ObjectStore,
    SessionFactory,
};
use keyferry_core::{CryptoKeyName, ObjectLocation};
use keyferry_handoff::{HandoffError, HandoffWorkflow, Stage};
use mockall::{mock, Sequence};
use std::sync::Arc;

mock! {
    pub Kms {}

    #[async_trait]
    impl KeyManagement for Kms {
        async fn get_iam_policy(&self, key: &CryptoKeyName) -> keyferry_cloud::Result<IamPolicy>;
        async fn set_iam_policy(&self, key: &CryptoKeyName, policy: &IamPolicy) -> keyferry_cloud::Result<IamPolicy>;
        async fn encrypt(&self, key: &CryptoKeyName, plaintext_b64: &str) -> keyferry_cloud::Result<Ciphertext>;
        async fn decrypt(&self, key: &CryptoKeyName, ciphertext: &Ciphertext) -> keyferry_cloud::Result<String>;
    }
}

mock! {
    pub Store {}

    #[async_trait]
    impl ObjectStore for Store {
        async fn put_object(&self, location: &ObjectLocation, data: Vec<u8>) -> keyferry_cloud::Result<()>;
        async fn get_object(&self, location: &ObjectLocation) -> keyferry_cloud::Result<Vec<u8>>;
        async fn delete_object(&self, location: &ObjectLocation) -> keyferry_cloud::Result<()>;
    }
}

/// Hands out one prepared session per identity
struct StubFactory {
    initial: CloudSession,
    target: CloudSession,
}

#[async_trait]
impl SessionFactory for StubFactory {
    async fn connect(&self, identity: &Identity) -> keyferry_cloud::Result<CloudSession> {
        match identity {
            Identity::Ambient => Ok(self.initial.clone()),
            Identity::ServiceAccountKey(_) => Ok(self.target.clone()),
        }
    }
}

fn session(identity: Identity, principal: &str, kms: MockKms, store: MockStore) -> CloudSession {
    CloudSession::new(
        identity,
        Arc::new(StaticAuthenticator::new(principal)),
        Arc::new(kms),
        Arc::new(store),
    )
}

/// Initial-side mocks that succeed through stage 7
fn happy_initial(seq: &mut Sequence) -> (MockKms, MockStore) {
    let mut kms = MockKms::new();
    let mut store = MockStore::new();

    kms.expect_get_iam_policy()
        .times(1)
        .in_sequence(seq)
        .returning(|_| {
            Ok(IamPolicy {
                etag: Some("BwX".into()),
                ..Default::default()
            })
        });
    kms.expect_set_iam_policy()
        .withf(|_, policy| policy.etag.as_deref() == Some("BwX") && policy.bindings.len() == 1)
        .times(1)
        .in_sequence(seq)
        .returning(|_, policy| Ok(policy.clone()));
    kms.expect_encrypt()
        .withf(|_, plaintext| plaintext == "aGVsbG8td29ybGQ=")
        .times(1)
        .in_sequence(seq)
        .returning(|_, _| Ok(Ciphertext::new("CiQAopaque")));
    store
        .expect_put_object()
        .withf(|location, data| {
            location.object == "service_account.json.encrypted" && data == b"CiQAopaque"
        })
        .times(1)
        .in_sequence(seq)
        .returning(|_, _| Ok(()));

    (kms, store)
}

fn workflow(initial: (MockKms, MockStore), target: (MockKms, MockStore)) -> HandoffWorkflow {
    let fixture_target = Identity::ServiceAccountKey("svc-account-secret.json".into());
    HandoffWorkflow::new(Arc::new(StubFactory {
        initial: session(Identity::Ambient, OWNER, initial.0, initial.1),
        target: session(fixture_target, TARGET_EMAIL, target.0, target.1),
    }))
}

#[tokio::test]
async fn test_stages_run_in_order() {
    let fixture = Fixture::new(b"hello-world");
    let mut seq = Sequence::new();
    let initial = happy_initial(&mut seq);

    let mut target_kms = MockKms::new();
    let mut target_store = MockStore::new();
    target_store
        .expect_get_object()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(b"CiQAopaque".to_vec()));
    target_kms
        .expect_decrypt()
        .withf(|_, ciphertext| ciphertext.as_str() == "CiQAopaque")
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok("aGVsbG8td29ybGQ=".to_string()));

    let outcome = workflow(initial, (target_kms, target_store))
        .run(&fixture.request)
        .await
        .unwrap();

    assert_eq!(outcome.recovered.as_text(), Some("hello-world"));
    assert_eq!(outcome.target_principal, TARGET_EMAIL);
}

#[tokio::test]
async fn test_store_failure_never_reaches_target() {
    let fixture = Fixture::new(b"hello-world");

    let mut kms = MockKms::new();
    kms.expect_get_iam_policy()
        .returning(|_| Ok(IamPolicy::default()));
    kms.expect_set_iam_policy()
        .returning(|_, policy| Ok(policy.clone()));
    kms.expect_encrypt()
        .returning(|_, _| Ok(Ciphertext::new("CiQAopaque")));
    let mut store = MockStore::new();
    store.expect_put_object().times(1).returning(|_, _| {
        Err(CloudError::Io(std::io::Error::other("disk quota exceeded")))
    });

    let mut target_kms = MockKms::new();
    target_kms.expect_decrypt().times(0);
    let mut target_store = MockStore::new();
    target_store.expect_get_object().times(0);

    let err = workflow((kms, store), (target_kms, target_store))
        .run(&fixture.request)
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Some(Stage::StoreObject));
}

#[tokio::test]
async fn test_permission_error_distinct_from_decryption_error() {
    let mut fixture = Fixture::new(b"hello-world");
    fixture.request.propagation = fast_retry(1);

    let mut seq = Sequence::new();
    let initial = happy_initial(&mut seq);
    let mut target_kms = MockKms::new();
    let mut target_store = MockStore::new();
    target_store
        .expect_get_object()
        .returning(|_| Ok(b"CiQAopaque".to_vec()));
    target_kms.expect_decrypt().times(1).returning(|_, _| {
        Err(CloudError::permission_denied(
            "Permission 'cloudkms.cryptoKeyVersions.useToDecrypt' denied",
        ))
    });

    let err = workflow(initial, (target_kms, target_store))
        .run(&fixture.request)
        .await
        .unwrap_err();
    assert_eq!(err.stage(), Some(Stage::Decrypt));
    assert!(err.is_permission_denied());

    let mut seq = Sequence::new();
    let initial = happy_initial(&mut seq);
    let mut target_kms = MockKms::new();
    let mut target_store = MockStore::new();
    target_store
        .expect_get_object()
        .returning(|_| Ok(b"CiQAopaque".to_vec()));
    target_kms
        .expect_decrypt()
        .times(1)
        .returning(|_, _| Err(CloudError::decryption("ciphertext is invalid")));

    let err = workflow(initial, (target_kms, target_store))
        .run(&fixture.request)
        .await
        .unwrap_err();
    assert_eq!(err.stage(), Some(Stage::Decrypt));
    assert!(!err.is_permission_denied());
    assert!(matches!(
        err,
        HandoffError::Stage {
            source: CloudError::Decryption { .. },
            ..
        }
    ));
}

#[tokio::test]
async fn test_garbled_decrypt_payload_fails_decode() {
    let fixture = Fixture::new(b"hello-world");
    let mut seq = Sequence::new();
    let initial = happy_initial(&mut seq);

    let mut target_kms = MockKms::new();
    let mut target_store = MockStore::new();
    target_store
        .expect_get_object()
        .returning(|_| Ok(b"CiQAopaque".to_vec()));
    target_kms
        .expect_decrypt()
        .returning(|_, _| Ok("%%% not base64 %%%".to_string()));

    let err = workflow(initial, (target_kms, target_store))
        .run(&fixture.request)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        HandoffError::Encoding {
            stage: Stage::Decode,
            ..
        }
    ));
}
