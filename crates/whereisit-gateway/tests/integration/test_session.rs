//! Integration tests for the backend session endpoints

use chrono::Utc;
use serde_json::json;
use wiremock::matchers::{body_json, header, header_exists, method, path};
use wiremock::{Mock, ResponseTemplate};

use whereisit_core::domain::Role;
use whereisit_core::ports::{GatewayError, ISessionGateway, IdentityToken};

use crate::common;

fn token(value: &str) -> IdentityToken {
    IdentityToken {
        value: value.to_string(),
        expires_at: Utc::now() + chrono::Duration::hours(1),
    }
}

#[tokio::test]
async fn test_session_login_sends_token_and_name() {
    let (server, client) = common::setup_backend_mock().await;
    Mock::given(method("POST"))
        .and(path("/users/session-login"))
        .and(body_json(json!({"token": "id-token-1", "name": "Fay Finder"})))
        .and(header_exists("x-request-id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user": common::user_json("fay@campus.edu", "admin")
        })))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;

    let user = client
        .session_login(&token("id-token-1"), Some("Fay Finder"))
        .await
        .expect("session_login failed");

    assert_eq!(user.email.as_str(), "fay@campus.edu");
    assert_eq!(user.role, Role::Admin);
    assert_eq!(user.photo_url.as_deref(), Some("https://img.example/avatar.png"));
}

#[tokio::test]
async fn test_session_cookie_is_sent_on_later_requests() {
    let (server, client) = common::setup_backend_mock().await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .and(header("cookie", common::SESSION_COOKIE))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    client.session_login(&token("t"), None).await.unwrap();
    let items = client.list_items().await.expect("cookie not forwarded");

    assert!(items.is_empty());
}

#[tokio::test]
async fn test_session_login_rejected_token_is_unauthorized() {
    let (server, client) = common::setup_backend_mock().await;
    Mock::given(method("POST"))
        .and(path("/users/session-login"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"message": "Invalid ID token"})),
        )
        .with_priority(1)
        .mount(&server)
        .await;

    let err = client.session_login(&token("bad"), None).await.unwrap_err();

    assert_eq!(err, GatewayError::Unauthorized("Invalid ID token".into()));
}

#[tokio::test]
async fn test_logout_posts_empty_body() {
    let (server, client) = common::setup_backend_mock().await;
    Mock::given(method("POST"))
        .and(path("/users/logout"))
        .and(body_json(json!({})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;

    client.logout().await.expect("logout failed");
}

#[tokio::test]
async fn test_unreachable_backend_is_network_error() {
    let client = whereisit_gateway::GatewayClient::with_base_url("http://127.0.0.1:1").unwrap();

    let err = client.logout().await.unwrap_err();

    assert!(matches!(err, GatewayError::Network(_)));
    assert!(err.is_transient());
}
