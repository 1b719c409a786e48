//! Shared test helpers for gateway integration tests
//!
//! Each helper mounts the endpoints a test needs on a wiremock server and
//! returns clients pointing at it.

use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use whereisit_gateway::{GatewayClient, IdentityClient};

pub const API_KEY: &str = "test-api-key";
pub const SESSION_COOKIE: &str = "session=s3cr3t";

/// A backend user document as returned by `session-login`
pub fn user_json(email: &str, role: &str) -> serde_json::Value {
    let local = email.split('@').next().unwrap_or(email);
    json!({
        "_id": format!("u-{local}"),
        "uid": format!("sub-{local}"),
        "email": email,
        "name": "Test User",
        "role": role,
        "photoURL": "https://img.example/avatar.png"
    })
}

/// An item document
pub fn item_json(id: &str, status: &str, owner: &str, date: &str) -> serde_json::Value {
    json!({
        "_id": id,
        "postType": "Lost",
        "status": status,
        "contactEmail": owner,
        "contactName": "Olive Owner",
        "title": format!("Item {id}"),
        "location": "Library",
        "date": date,
        "description": "Blue with a sticker",
        "category": "Bags",
        "thumbnail": "https://img.example/item.png"
    })
}

/// Starts a backend mock whose `session-login` accepts any token and sets
/// a session cookie
pub async fn setup_backend_mock() -> (MockServer, GatewayClient) {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/users/session-login"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "user": user_json("finder@campus.edu", "user") }))
                .insert_header("set-cookie", format!("{SESSION_COOKIE}; Path=/; HttpOnly")),
        )
        .mount(&server)
        .await;

    let client = GatewayClient::with_base_url(server.uri()).expect("client");
    (server, client)
}

/// Starts an identity service mock and returns a client for it
///
/// The account endpoints live under `/v1`, the token endpoint at `/token`.
pub async fn setup_identity_mock() -> (MockServer, IdentityClient) {
    let server = MockServer::start().await;
    let client = IdentityClient::with_endpoints(
        format!("{}/v1", server.uri()),
        format!("{}/token", server.uri()),
        API_KEY,
    );
    (server, client)
}

/// A successful `accounts:*` response
pub fn account_json(local_id: &str, email: &str, expires_in: &str) -> serde_json::Value {
    json!({
        "kind": "identitytoolkit#VerifyPasswordResponse",
        "localId": local_id,
        "email": email,
        "displayName": "",
        "idToken": format!("id-token-{local_id}"),
        "refreshToken": format!("refresh-{local_id}"),
        "expiresIn": expires_in,
        "registered": true
    })
}

/// Mounts an `accounts:*` endpoint answering `body` with `status`
pub async fn mount_account_endpoint(
    server: &MockServer,
    endpoint: &str,
    status: u16,
    body: serde_json::Value,
) {
    Mock::given(method("POST"))
        .and(path(format!("/v1/accounts:{endpoint}")))
        .and(query_param("key", API_KEY))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}

/// Mounts the refresh-token endpoint
pub async fn mount_refresh(server: &MockServer, local_id: &str, id_token: &str) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(query_param("key", API_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "expires_in": "3600",
            "token_type": "Bearer",
            "refresh_token": format!("refresh-{local_id}-rotated"),
            "id_token": id_token,
            "user_id": local_id,
            "project_id": "whereisit-test"
        })))
        .mount(server)
        .await;
}

/// Identity service error body
pub fn identity_error(message: &str) -> serde_json::Value {
    json!({
        "error": {
            "code": 400,
            "message": message,
            "errors": [{"message": message, "domain": "global", "reason": "invalid"}]
        }
    })
}
