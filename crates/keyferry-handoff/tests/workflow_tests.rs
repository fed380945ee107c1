//! End-to-end handoff runs against the in-memory cloud

mod common;

use common::*;
use keyferry_cloud::memory::{Fault, InMemoryCloud};
use keyferry_cloud::{CloudError, Identity, Operation, SessionFactory};
use keyferry_core::types::DECRYPTER_ROLE;
use keyferry_core::HandoffSettings;
use keyferry_handoff::{
    steps, GrantMode, GrantResult, HandoffError, HandoffRequest, HandoffWorkflow, SideEffect,
    Stage,
};
use std::sync::Arc;

#[tokio::test]
async fn test_round_trip() {
    let fixture = Fixture::new(b"db-password=hunter2\n");

    let outcome = fixture.workflow().run(&fixture.request).await.unwrap();

    assert_eq!(outcome.recovered.expose(), b"db-password=hunter2\n");
    assert_ne!(outcome.ciphertext.as_str(), "db-password=hunter2\n");
    assert_eq!(outcome.grant, GrantResult::Appended);
    assert_eq!(outcome.policy_bindings, 1);
    assert_eq!(outcome.propagation_attempts, 1);
    assert_eq!(outcome.initial_principal, OWNER);
    assert_eq!(outcome.target_principal, target_member());
    assert_eq!(outcome.journal.len(), 2);

    let stored = fixture.cloud.object(&location()).unwrap();
    assert_eq!(stored, outcome.ciphertext.as_str().as_bytes());

    let policy = fixture.cloud.policy(&key()).unwrap();
    assert!(policy.has_member(DECRYPTER_ROLE, &target_member()));
}

#[tokio::test]
async fn test_hello_world_scenario() {
    let fixture = Fixture::new(b"hello-world");

    let outcome = fixture.workflow().run(&fixture.request).await.unwrap();

    assert_eq!(
        outcome.key.to_string(),
        "projects/p/locations/us-central1/keyRings/kr/cryptoKeys/k1"
    );
    assert_eq!(outcome.location.bucket, "b1");
    assert_eq!(outcome.location.object, "service_account.json.encrypted");
    assert_eq!(outcome.recovered.as_text(), Some("hello-world"));
}

#[tokio::test]
async fn test_binary_secret() {
    let secret = [0u8, 159, 146, 150, 255, 10];
    let fixture = Fixture::new(&secret);

    let outcome = fixture.workflow().run(&fixture.request).await.unwrap();
    assert_eq!(outcome.recovered.expose(), &secret);
}

#[tokio::test]
async fn test_rerun_appends_duplicate_binding() {
    let fixture = Fixture::new(b"hello-world");
    let workflow = fixture.workflow();

    workflow.run(&fixture.request).await.unwrap();
    let second = workflow.run(&fixture.request).await.unwrap();

    assert_eq!(second.recovered.as_text(), Some("hello-world"));
    assert_eq!(second.policy_bindings, 2);
    let policy = fixture.cloud.policy(&key()).unwrap();
    assert_eq!(policy.binding_count(DECRYPTER_ROLE, &target_member()), 2);
}

#[tokio::test]
async fn test_ensure_present_keeps_single_binding() {
    let mut fixture = Fixture::new(b"hello-world");
    fixture.request.grant_mode = GrantMode::EnsurePresent;
    let workflow = fixture.workflow();

    workflow.run(&fixture.request).await.unwrap();
    let second = workflow.run(&fixture.request).await.unwrap();

    assert_eq!(second.grant, GrantResult::AlreadyPresent);
    assert_eq!(
        second.journal.entries(),
        &[SideEffect::ObjectWritten {
            location: location()
        }]
    );
    let policy = fixture.cloud.policy(&key()).unwrap();
    assert_eq!(policy.binding_count(DECRYPTER_ROLE, &target_member()), 1);
    assert_eq!(fixture.cloud.call_count(Operation::SetIamPolicy), 1);
}

#[tokio::test]
async fn test_existing_object_is_overwritten() {
    let fixture = Fixture::new(b"hello-world");
    fixture.cloud.insert_object(&location(), b"stale ciphertext".to_vec());

    let outcome = fixture.workflow().run(&fixture.request).await.unwrap();

    assert_eq!(
        fixture.cloud.object(&location()).unwrap(),
        outcome.ciphertext.as_str().as_bytes()
    );
}

#[tokio::test]
async fn test_store_failure_stops_pipeline() {
    let fixture = Fixture::new(b"hello-world");
    fixture.cloud.fail(Operation::PutObject, Fault::Rejected);

    let err = fixture.workflow().run(&fixture.request).await.unwrap_err();

    assert_eq!(err.stage(), Some(Stage::StoreObject));
    assert!(matches!(err.cloud_error(), Some(CloudError::Io(_))));
    assert_eq!(fixture.cloud.call_count(Operation::GetObject), 0);
    assert_eq!(fixture.cloud.call_count(Operation::Decrypt), 0);

    // No rollback unless asked for
    let policy = fixture.cloud.policy(&key()).unwrap();
    assert!(policy.has_member(DECRYPTER_ROLE, &target_member()));
}

#[tokio::test]
async fn test_missing_secret_file() {
    let mut fixture = Fixture::new(b"");
    fixture.request.secret_file = fixture.request.secret_file.with_file_name("absent.txt");

    let err = fixture.workflow().run(&fixture.request).await.unwrap_err();

    assert!(matches!(err, HandoffError::ReadSecret { .. }));
    assert_eq!(err.stage(), Some(Stage::ReadSecret));
    assert!(fixture.cloud.calls().is_empty());
}

#[tokio::test]
async fn test_empty_secret_round_trips() {
    let fixture = Fixture::new(b"");
    let outcome = fixture.workflow().run(&fixture.request).await.unwrap();
    assert!(outcome.recovered.is_empty());
}

#[tokio::test]
async fn test_no_ambient_credential() {
    let fixture = Fixture::new(b"hello-world");
    let bare = InMemoryCloud::new();
    bare.create_key(&key(), OWNER).create_bucket("b1");

    let err = HandoffWorkflow::new(Arc::new(bare.clone()))
        .run(&fixture.request)
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Some(Stage::ConnectInitial));
    assert!(err.cloud_error().unwrap().is_auth());
    assert!(bare.calls().is_empty());
}

#[tokio::test]
async fn test_policy_write_without_admin_rights() {
    let fixture = Fixture::new(b"hello-world");
    fixture
        .cloud
        .fail(Operation::SetIamPolicy, Fault::PermissionDenied);

    let err = fixture.workflow().run(&fixture.request).await.unwrap_err();

    assert_eq!(err.stage(), Some(Stage::WritePolicy));
    assert!(err.is_permission_denied());
    assert_eq!(fixture.cloud.call_count(Operation::Encrypt), 0);
}

#[tokio::test]
async fn test_unusable_target_key_file() {
    let mut fixture = Fixture::new(b"hello-world");
    fixture.request.target_key_file = fixture
        .request
        .target_key_file
        .with_file_name("unknown.json");

    let err = fixture.workflow().run(&fixture.request).await.unwrap_err();

    assert_eq!(err.stage(), Some(Stage::SwitchIdentity));
    assert!(err.cloud_error().unwrap().is_auth());
    // Earlier side effects stay
    assert!(fixture.cloud.object(&location()).is_some());
}

#[tokio::test]
async fn test_target_cannot_read_object() {
    let fixture = Fixture::new(b"hello-world");
    fixture
        .cloud
        .fail_for(Operation::GetObject, Fault::PermissionDenied, target_member());

    let err = fixture.workflow().run(&fixture.request).await.unwrap_err();

    assert_eq!(err.stage(), Some(Stage::FetchObject));
    assert!(err.is_permission_denied());
}

#[tokio::test]
async fn test_waits_for_grant_propagation() {
    let fixture = Fixture::new(b"hello-world");
    fixture.cloud.set_propagation_delay(2);

    let outcome = fixture.workflow().run(&fixture.request).await.unwrap();

    assert_eq!(outcome.propagation_attempts, 3);
    assert_eq!(outcome.recovered.as_text(), Some("hello-world"));
}

#[tokio::test]
async fn test_grant_not_propagated_is_recoverable() {
    let mut fixture = Fixture::new(b"hello-world");
    fixture.cloud.set_propagation_delay(10);
    fixture.request.propagation = fast_retry(3);

    let err = fixture.workflow().run(&fixture.request).await.unwrap_err();

    assert!(err.is_recoverable());
    assert!(err.is_permission_denied());
    assert!(matches!(
        err,
        HandoffError::GrantNotPropagated { attempts: 3, .. }
    ));
    assert_eq!(fixture.cloud.call_count(Operation::Decrypt), 3);
}

#[tokio::test]
async fn test_compensation_skipped_while_grant_propagates() {
    let mut fixture = Fixture::new(b"hello-world");
    fixture.cloud.set_propagation_delay(10);
    fixture.request.propagation = fast_retry(3);
    fixture.request.compensate_on_failure = true;

    let err = fixture.workflow().run(&fixture.request).await.unwrap_err();

    assert!(err.is_recoverable());
    // Both stay so a later decrypt as the target can succeed
    let policy = fixture.cloud.policy(&key()).unwrap();
    assert!(policy.has_member(DECRYPTER_ROLE, &target_member()));
    assert!(fixture.cloud.object(&location()).is_some());
    assert_eq!(fixture.cloud.call_count(Operation::DeleteObject), 0);
    assert_eq!(fixture.cloud.call_count(Operation::SetIamPolicy), 1);
}

#[tokio::test]
async fn test_single_attempt_reports_permission_error() {
    let mut fixture = Fixture::new(b"hello-world");
    fixture.cloud.set_propagation_delay(1);
    fixture.request.propagation = fast_retry(1);

    let err = fixture.workflow().run(&fixture.request).await.unwrap_err();

    assert!(err.is_permission_denied());
    assert_eq!(err.stage(), Some(Stage::Decrypt));
}

#[tokio::test]
async fn test_compensation_rolls_back() {
    let mut fixture = Fixture::new(b"hello-world");
    fixture.request.compensate_on_failure = true;
    fixture
        .cloud
        .fail_for(Operation::Decrypt, Fault::Rejected, target_member());

    let err = fixture.workflow().run(&fixture.request).await.unwrap_err();

    assert!(matches!(
        err.cloud_error(),
        Some(CloudError::Decryption { .. })
    ));
    let policy = fixture.cloud.policy(&key()).unwrap();
    assert!(!policy.has_member(DECRYPTER_ROLE, &target_member()));
    assert!(fixture.cloud.object(&location()).is_none());
}

#[tokio::test]
async fn test_compensation_keeps_preexisting_binding() {
    let mut fixture = Fixture::new(b"hello-world");
    fixture.workflow().run(&fixture.request).await.unwrap();

    fixture.request.compensate_on_failure = true;
    fixture
        .cloud
        .fail_for(Operation::GetObject, Fault::NotFound, target_member());

    let err = fixture.workflow().run(&fixture.request).await.unwrap_err();

    assert!(err.cloud_error().unwrap().is_not_found());
    let policy = fixture.cloud.policy(&key()).unwrap();
    assert_eq!(policy.binding_count(DECRYPTER_ROLE, &target_member()), 1);
}

#[tokio::test]
async fn test_request_from_settings() {
    let mut settings = HandoffSettings {
        project_id: "p".into(),
        key_ring_id: "kr".into(),
        crypto_key_id: "k1".into(),
        bucket: "b1".into(),
        ..Default::default()
    };
    settings.grant.dedupe = true;

    let request = HandoffRequest::from_settings(&settings).unwrap();
    assert_eq!(request.key, key());
    assert_eq!(request.location, location());
    assert_eq!(request.grant_mode, GrantMode::EnsurePresent);
    assert_eq!(
        request.target_identity(),
        Identity::ServiceAccountKey("svc-account-secret.json".into())
    );

    settings.bucket.clear();
    assert!(matches!(
        HandoffRequest::from_settings(&settings),
        Err(HandoffError::Config(_))
    ));
}

#[tokio::test]
async fn test_revoke_removes_one_duplicate_binding() {
    let fixture = Fixture::new(b"hello-world");
    let workflow = fixture.workflow();
    workflow.run(&fixture.request).await.unwrap();
    workflow.run(&fixture.request).await.unwrap();

    let session = workflow.factory().connect(&Identity::Ambient).await.unwrap();
    let removed = steps::revoke_decrypter(&session, &key(), &target_member())
        .await
        .unwrap();

    assert!(removed);
    let policy = fixture.cloud.policy(&key()).unwrap();
    assert_eq!(policy.binding_count(DECRYPTER_ROLE, &target_member()), 1);
    assert_eq!(fixture.cloud.call_count(Operation::SetIamPolicy), 3);
}

#[tokio::test]
async fn test_revoke_without_binding_leaves_policy_alone() {
    let fixture = Fixture::new(b"hello-world");
    let session = fixture.cloud.connect(&Identity::Ambient).await.unwrap();

    let removed = steps::revoke_decrypter(&session, &key(), &target_member())
        .await
        .unwrap();

    assert!(!removed);
    assert_eq!(fixture.cloud.call_count(Operation::GetIamPolicy), 1);
    assert_eq!(fixture.cloud.call_count(Operation::SetIamPolicy), 0);
}

#[tokio::test]
async fn test_revoke_policy_write_failure_is_tagged() {
    let fixture = Fixture::new(b"hello-world");
    fixture.workflow().run(&fixture.request).await.unwrap();
    fixture
        .cloud
        .fail(Operation::SetIamPolicy, Fault::PermissionDenied);

    let session = fixture.cloud.connect(&Identity::Ambient).await.unwrap();
    let err = steps::revoke_decrypter(&session, &key(), &target_member())
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Some(Stage::WritePolicy));
    assert!(err.is_permission_denied());
    let policy = fixture.cloud.policy(&key()).unwrap();
    assert!(policy.has_member(DECRYPTER_ROLE, &target_member()));
}
