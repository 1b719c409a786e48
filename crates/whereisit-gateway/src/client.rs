//! WhereIsIt backend HTTP client
//!
//! Provides a typed HTTP client for the backend's session, item and
//! recovery endpoints. The application session is a cookie set by
//! `POST /users/session-login`; the client keeps it in reqwest's cookie
//! store, so every later request on the same client carries it.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use whereisit_gateway::client::GatewayClient;
//! use whereisit_core::ports::ISessionGateway;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = GatewayClient::with_base_url("http://localhost:5000")?;
//! let items = client.list_items().await?;
//! println!("{} items", items.len());
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use whereisit_core::config::BackendConfig;
use whereisit_core::domain::{
    Item, ItemDraft, ItemId, RecoveryRecord, RecoveryRequest, RequestId, UserProfile,
};
use whereisit_core::ports::{GatewayError, ISessionGateway, IdentityToken};

/// Header carrying the per-request correlation id
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Longest Retry-After we honour when the backend sends an HTTP date
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct SessionLoginRequest<'a> {
    token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

/// `session-login` answers `{user}`; older deployments answer the bare user
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SessionLoginResponse {
    Wrapped { user: UserProfile },
    Bare(UserProfile),
}

impl SessionLoginResponse {
    fn into_user(self) -> UserProfile {
        match self {
            SessionLoginResponse::Wrapped { user } | SessionLoginResponse::Bare(user) => user,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RecoverResponse {
    Wrapped {
        #[serde(rename = "recoveryRecord")]
        recovery_record: RecoveryRecord,
    },
    Bare(RecoveryRecord),
}

impl RecoverResponse {
    fn into_record(self) -> RecoveryRecord {
        match self {
            RecoverResponse::Wrapped { recovery_record } | RecoverResponse::Bare(recovery_record) => {
                recovery_record
            }
        }
    }
}

/// `POST /items` answers with the insert result, the stored item, or the
/// stored item wrapped in `{item}`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CreateItemResponse {
    Inserted {
        #[serde(rename = "insertedId")]
        inserted_id: ItemId,
    },
    Wrapped {
        item: Item,
    },
    Bare(Item),
    IdOnly {
        #[serde(rename = "_id", alias = "id")]
        id: ItemId,
    },
}

impl CreateItemResponse {
    fn into_id(self) -> ItemId {
        match self {
            CreateItemResponse::Inserted { inserted_id: id }
            | CreateItemResponse::IdOnly { id } => id,
            CreateItemResponse::Wrapped { item } | CreateItemResponse::Bare(item) => item.id,
        }
    }
}

/// The own-items listing comes as `{sampleItems}`, `{items}` or a bare array
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MyItemsResponse {
    Sample {
        #[serde(rename = "sampleItems")]
        sample_items: Vec<Item>,
    },
    Wrapped {
        items: Vec<Item>,
    },
    Bare(Vec<Item>),
}

impl MyItemsResponse {
    fn into_items(self) -> Vec<Item> {
        match self {
            MyItemsResponse::Sample { sample_items: items }
            | MyItemsResponse::Wrapped { items }
            | MyItemsResponse::Bare(items) => items,
        }
    }
}

/// Error body: `{reason}` or `{message}`
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    reason: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

// ============================================================================
// GatewayClient
// ============================================================================

/// HTTP client for the WhereIsIt backend
///
/// Cheap to clone; clones share the connection pool and the cookie store,
/// and therefore the application session.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    /// The underlying HTTP client, with a cookie store
    client: Client,
    /// Base URL for API requests, without a trailing slash
    base_url: String,
}

impl GatewayClient {
    /// Creates a client from the backend configuration section
    ///
    /// # Errors
    /// `GatewayError::InvalidResponse` if the HTTP client cannot be built
    /// (TLS backend initialisation failure)
    pub fn new(config: &BackendConfig) -> Result<Self, GatewayError> {
        Self::build(&config.base_url, Some(Duration::from_secs(config.timeout_secs)))
    }

    /// Creates a client with a custom base URL and no request timeout
    /// (useful for testing)
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, GatewayError> {
        Self::build(&base_url.into(), None)
    }

    fn build(base_url: &str, timeout: Option<Duration>) -> Result<Self, GatewayError> {
        let mut builder = Client::builder().cookie_store(true);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| GatewayError::InvalidResponse(format!("http client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Returns the base URL for API requests
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Creates a request builder for the given method and path
    ///
    /// Prepends the base URL and attaches a fresh `X-Request-Id`.
    ///
    /// # Arguments
    /// * `method` - HTTP method
    /// * `path` - API path relative to base URL (e.g., "/items")
    pub fn request(&self, method: Method, path: &str) -> (RequestId, RequestBuilder) {
        let request_id = RequestId::new();
        let url = format!("{}{}", self.base_url, path);
        let builder = self
            .client
            .request(method, url)
            .header(REQUEST_ID_HEADER, request_id.to_string());
        (request_id, builder)
    }

    /// Sends a request and decodes a JSON success body
    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T, GatewayError> {
        let response = self.send(method, path, body).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| GatewayError::InvalidResponse(format!("{path}: {e}")))
    }

    /// Sends a request and maps any non-2xx status to a `GatewayError`
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<Response, GatewayError> {
        let (request_id, mut builder) = self.request(method.clone(), path);
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        debug!(request_id = %request_id, %method, path, "Sending backend request");
        let response = builder.send().await.map_err(|e| {
            warn!(request_id = %request_id, path, error = %e, "Backend request failed");
            GatewayError::Network(e.to_string())
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = parse_retry_after(response.headers());
        let text = response.text().await.unwrap_or_default();
        let err = map_status(status, &text, retry_after);
        debug!(request_id = %request_id, path, status = status.as_u16(), error = %err, "Backend refused request");
        Err(err)
    }
}

// ============================================================================
// Error mapping
// ============================================================================

/// Extracts the human reason from an error body
///
/// The backend answers `{reason}` for recovery refusals and `{message}`
/// elsewhere; a non-JSON body is used verbatim.
fn error_reason(status: StatusCode, body: &str) -> String {
    let parsed = serde_json::from_str::<ErrorBody>(body).unwrap_or_default();
    parsed
        .reason
        .or(parsed.message)
        .or(parsed.error)
        .or_else(|| {
            let trimmed = body.trim();
            (!trimmed.is_empty() && !trimmed.starts_with('{')).then(|| trimmed.to_string())
        })
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string())
}

/// Maps a non-success status and body to the gateway error taxonomy
pub(crate) fn map_status(
    status: StatusCode,
    body: &str,
    retry_after: Option<Duration>,
) -> GatewayError {
    let reason = error_reason(status, body);
    match status {
        StatusCode::UNAUTHORIZED => GatewayError::Unauthorized(reason),
        StatusCode::FORBIDDEN => GatewayError::Forbidden(reason),
        StatusCode::NOT_FOUND => GatewayError::NotFound(reason),
        StatusCode::CONFLICT => GatewayError::Conflict(reason),
        StatusCode::TOO_MANY_REQUESTS => GatewayError::TooManyRequests { retry_after },
        s if s.is_server_error() => GatewayError::Server(reason),
        s => GatewayError::Rejected {
            status: s.as_u16(),
            reason,
        },
    }
}

/// Parses a `Retry-After` header as integer seconds or an HTTP date
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let date = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let wait = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
    wait.to_std().ok().filter(|d| *d <= MAX_RETRY_AFTER)
}

// ============================================================================
// ISessionGateway
// ============================================================================

#[async_trait::async_trait]
impl ISessionGateway for GatewayClient {
    async fn session_login(
        &self,
        token: &IdentityToken,
        name: Option<&str>,
    ) -> Result<UserProfile, GatewayError> {
        let body = serde_json::to_value(SessionLoginRequest {
            token: &token.value,
            name,
        })
        .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        let response: SessionLoginResponse = self
            .send_json(Method::POST, "/users/session-login", Some(body))
            .await?;
        let user = response.into_user();
        info!(user = %user.email, role = ?user.role, "Backend session established");
        Ok(user)
    }

    async fn logout(&self) -> Result<(), GatewayError> {
        self.send(Method::POST, "/users/logout", Some(serde_json::json!({})))
            .await?;
        info!("Backend session ended");
        Ok(())
    }

    async fn get_item(&self, id: &ItemId) -> Result<Item, GatewayError> {
        self.send_json(Method::GET, &format!("/items/{id}"), None)
            .await
    }

    async fn list_items(&self) -> Result<Vec<Item>, GatewayError> {
        self.send_json(Method::GET, "/items", None).await
    }

    async fn list_my_items(&self) -> Result<Vec<Item>, GatewayError> {
        let response: MyItemsResponse = self.send_json(Method::GET, "/debug/my-items", None).await?;
        Ok(response.into_items())
    }

    async fn create_item(&self, draft: &ItemDraft) -> Result<ItemId, GatewayError> {
        let body =
            serde_json::to_value(draft).map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        let response: CreateItemResponse = self.send_json(Method::POST, "/items", Some(body)).await?;
        let id = response.into_id();
        info!(item = %id, post_type = %draft.post_type, "Item created");
        Ok(id)
    }

    async fn update_item(&self, id: &ItemId, draft: &ItemDraft) -> Result<(), GatewayError> {
        let body =
            serde_json::to_value(draft).map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        self.send(Method::PUT, &format!("/items/{id}"), Some(body))
            .await?;
        info!(item = %id, "Item updated");
        Ok(())
    }

    async fn delete_item(&self, id: &ItemId) -> Result<(), GatewayError> {
        self.send(Method::DELETE, &format!("/items/{id}"), None)
            .await?;
        info!(item = %id, "Item deleted");
        Ok(())
    }

    async fn recover_item(
        &self,
        request: &RecoveryRequest,
    ) -> Result<RecoveryRecord, GatewayError> {
        let body = serde_json::to_value(request)
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        let path = format!("/items/{}/recover", request.item_id());

        let response: RecoverResponse = self.send_json(Method::POST, &path, Some(body)).await?;
        let record = response.into_record();
        info!(item = %request.item_id(), record = %record.id, "Recovery recorded");
        Ok(record)
    }

    async fn list_recoveries(&self) -> Result<Vec<RecoveryRecord>, GatewayError> {
        self.send_json(Method::GET, "/recoveries", None).await
    }
}
