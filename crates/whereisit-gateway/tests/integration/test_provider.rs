//! Integration tests for the identity provider: events, persistence and
//! silent restore

use std::sync::Arc;
use std::time::Duration;

use wiremock::MockServer;

use whereisit_core::config::OAuthConfig;
use whereisit_core::domain::{Email, SubjectId};
use whereisit_core::ports::{CredentialError, ICredentialProvider, IdentityEvent};
use whereisit_gateway::{FileTokenStore, IdentityProvider, IdentityStore, PersistedIdentity};

use crate::common;

const MARGIN: Duration = Duration::from_secs(300);

struct Harness {
    server: MockServer,
    provider: IdentityProvider,
    store: Arc<FileTokenStore>,
    _dir: tempfile::TempDir,
}

async fn harness() -> Harness {
    let (server, client) = common::setup_identity_mock().await;
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileTokenStore::new(dir.path().join("identity.json")));
    let provider = IdentityProvider::new(
        client,
        &OAuthConfig::default(),
        MARGIN,
        Some(store.clone() as Arc<dyn IdentityStore>),
    );
    Harness {
        server,
        provider,
        store,
        _dir: dir,
    }
}

fn persisted(local_id: &str, email: &str) -> PersistedIdentity {
    PersistedIdentity {
        subject_id: SubjectId::new(local_id).unwrap(),
        email: Email::new(email).unwrap(),
        display_name: Some("Ana".into()),
        refresh_token: format!("refresh-{local_id}"),
    }
}

#[tokio::test]
async fn test_authenticate_emits_signed_in_and_persists() {
    let h = harness().await;
    common::mount_account_endpoint(
        &h.server,
        "signInWithPassword",
        200,
        common::account_json("sub-ana", "ana@campus.edu", "3600"),
    )
    .await;
    let mut events = h.provider.subscribe();

    let identity = h
        .provider
        .authenticate(&Email::new("ana@campus.edu").unwrap(), "secret1")
        .await
        .unwrap();

    assert_eq!(events.recv().await.unwrap(), IdentityEvent::SignedIn(identity.clone()));
    let stored = h.store.load().unwrap().expect("identity persisted");
    assert_eq!(stored.subject_id, identity.subject_id);
    assert_eq!(stored.refresh_token, "refresh-sub-ana");
    assert_eq!(h.provider.current().await, Some(identity));
}

#[tokio::test]
async fn test_create_identity_publishes_nothing() {
    let h = harness().await;
    common::mount_account_endpoint(
        &h.server,
        "signUp",
        200,
        common::account_json("sub-new", "new@campus.edu", "3600"),
    )
    .await;
    let mut events = h.provider.subscribe();

    h.provider
        .create_identity(&Email::new("new@campus.edu").unwrap(), "hunter22")
        .await
        .unwrap();

    assert!(events.try_recv().is_err());
    assert!(h.store.load().unwrap().is_some());
}

#[tokio::test]
async fn test_restore_refreshes_persisted_identity() {
    let h = harness().await;
    h.store.save(&persisted("sub-ana", "ana@campus.edu")).unwrap();
    common::mount_refresh(&h.server, "sub-ana", "id-token-restored").await;
    let mut events = h.provider.subscribe();

    let identity = h.provider.restore().await.unwrap().expect("restored");

    assert_eq!(identity.token.value, "id-token-restored");
    assert_eq!(identity.display_name.as_deref(), Some("Ana"));
    assert_eq!(events.recv().await.unwrap(), IdentityEvent::Restored(identity));
    let stored = h.store.load().unwrap().unwrap();
    assert_eq!(stored.refresh_token, "refresh-sub-ana-rotated");
}

#[tokio::test]
async fn test_restore_without_persisted_identity() {
    let h = harness().await;

    assert_eq!(h.provider.restore().await.unwrap(), None);
}

#[tokio::test]
async fn test_restore_with_revoked_refresh_token_forgets_identity() {
    let h = harness().await;
    h.store.save(&persisted("sub-ana", "ana@campus.edu")).unwrap();
    wiremock::Mock::given(wiremock::matchers::path("/token"))
        .respond_with(
            wiremock::ResponseTemplate::new(400)
                .set_body_json(common::identity_error("INVALID_REFRESH_TOKEN")),
        )
        .mount(&h.server)
        .await;

    let err = h.provider.restore().await.unwrap_err();

    assert!(matches!(err, CredentialError::InvalidToken(_)));
    assert!(h.store.load().unwrap().is_none());
    assert_eq!(h.provider.current().await, None);
}

#[tokio::test]
async fn test_sign_out_clears_store_and_emits() {
    let h = harness().await;
    common::mount_account_endpoint(
        &h.server,
        "signInWithPassword",
        200,
        common::account_json("sub-ana", "ana@campus.edu", "3600"),
    )
    .await;
    h.provider
        .authenticate(&Email::new("ana@campus.edu").unwrap(), "secret1")
        .await
        .unwrap();
    let mut events = h.provider.subscribe();

    h.provider.sign_out().await.unwrap();

    assert_eq!(events.recv().await.unwrap(), IdentityEvent::SignedOut);
    assert!(h.store.load().unwrap().is_none());
    assert_eq!(h.provider.current().await, None);
}

#[tokio::test]
async fn test_get_token_refreshes_inside_margin() {
    let h = harness().await;
    common::mount_account_endpoint(
        &h.server,
        "signInWithPassword",
        200,
        common::account_json("sub-ana", "ana@campus.edu", "60"),
    )
    .await;
    common::mount_refresh(&h.server, "sub-ana", "id-token-fresh").await;
    let identity = h
        .provider
        .authenticate(&Email::new("ana@campus.edu").unwrap(), "secret1")
        .await
        .unwrap();

    let token = h.provider.get_token(&identity).await.unwrap();

    assert_eq!(token.value, "id-token-fresh");
}

#[tokio::test]
async fn test_get_token_returns_current_token_outside_margin() {
    let h = harness().await;
    common::mount_account_endpoint(
        &h.server,
        "signInWithPassword",
        200,
        common::account_json("sub-ana", "ana@campus.edu", "3600"),
    )
    .await;
    let identity = h
        .provider
        .authenticate(&Email::new("ana@campus.edu").unwrap(), "secret1")
        .await
        .unwrap();

    let token = h.provider.get_token(&identity).await.unwrap();

    assert_eq!(token.value, "id-token-sub-ana");
}

#[tokio::test]
async fn test_provider_sign_in_requires_client_id() {
    let h = harness().await;

    let err = h.provider.authenticate_via_provider().await.unwrap_err();

    assert!(matches!(err, CredentialError::Other(_)));
}

async fn mount_rejected_refresh(server: &MockServer, delay: Duration) {
    wiremock::Mock::given(wiremock::matchers::path("/token"))
        .respond_with(
            wiremock::ResponseTemplate::new(400)
                .set_body_json(common::identity_error("INVALID_REFRESH_TOKEN"))
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

async fn mount_sign_in_for(server: &MockServer, local_id: &str, email: &str, expires_in: &str) {
    wiremock::Mock::given(wiremock::matchers::method("POST"))
        .and(wiremock::matchers::path("/v1/accounts:signInWithPassword"))
        .and(wiremock::matchers::body_partial_json(
            serde_json::json!({ "email": email }),
        ))
        .respond_with(
            wiremock::ResponseTemplate::new(200)
                .set_body_json(common::account_json(local_id, email, expires_in)),
        )
        .mount(server)
        .await;
}

async fn refresh_requested(server: &MockServer) -> bool {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .any(|request| request.url.path() == "/token")
}

#[tokio::test]
async fn test_background_refresh_rejection_signs_out() {
    let h = harness().await;
    mount_sign_in_for(&h.server, "sub-ana", "ana@campus.edu", "60").await;
    mount_rejected_refresh(&h.server, Duration::ZERO).await;
    h.provider
        .authenticate(&Email::new("ana@campus.edu").unwrap(), "secret1")
        .await
        .unwrap();
    let mut events = h.provider.subscribe();

    let event = tokio::time::timeout(Duration::from_secs(15), events.recv())
        .await
        .expect("refresher never ran")
        .unwrap();

    assert_eq!(event, IdentityEvent::SignedOut);
    assert_eq!(h.provider.current().await, None);
    assert!(h.store.load().unwrap().is_none());
}

#[tokio::test]
async fn test_late_refresh_rejection_keeps_newer_identity() {
    let h = harness().await;
    mount_sign_in_for(&h.server, "sub-ana", "ana@campus.edu", "60").await;
    mount_sign_in_for(&h.server, "sub-bo", "bo@campus.edu", "3600").await;
    mount_rejected_refresh(&h.server, Duration::from_secs(2)).await;

    h.provider
        .authenticate(&Email::new("ana@campus.edu").unwrap(), "secret1")
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(15), async {
        while !refresh_requested(&h.server).await {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("refresher never ran");

    // Ana's refresh is still in flight when Bo signs in
    let mut events = h.provider.subscribe();
    let bo = h
        .provider
        .authenticate(&Email::new("bo@campus.edu").unwrap(), "secret2")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_eq!(h.provider.current().await, Some(bo.clone()));
    let stored = h.store.load().unwrap().expect("bo still persisted");
    assert_eq!(stored.subject_id, bo.subject_id);
    assert_eq!(events.recv().await.unwrap(), IdentityEvent::SignedIn(bo));
    assert!(events.try_recv().is_err(), "no sign-out after the late rejection");
}
