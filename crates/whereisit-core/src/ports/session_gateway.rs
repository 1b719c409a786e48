//! Session gateway port (driven/secondary port)
//!
//! This module defines the backend HTTP surface the core depends on:
//! session exchange, logout, item queries, item posting and recovery
//! submission. The
//! application session travels in a cookie held by the implementation;
//! callers never pass credentials.
//!
//! | Method | Endpoint |
//! |---|---|
//! | [`ISessionGateway::session_login`] | `POST /users/session-login` |
//! | [`ISessionGateway::logout`] | `POST /users/logout` |
//! | [`ISessionGateway::get_item`] | `GET /items/{id}` |
//! | [`ISessionGateway::list_items`] | `GET /items` |
//! | [`ISessionGateway::list_my_items`] | `GET /debug/my-items` |
//! | [`ISessionGateway::create_item`] | `POST /items` |
//! | [`ISessionGateway::update_item`] | `PUT /items/{id}` |
//! | [`ISessionGateway::delete_item`] | `DELETE /items/{id}` |
//! | [`ISessionGateway::recover_item`] | `POST /items/{id}/recover` |
//! | [`ISessionGateway::list_recoveries`] | `GET /recoveries` |

use std::time::Duration;

use thiserror::Error;

use crate::domain::{Item, ItemDraft, ItemId, RecoveryRecord, RecoveryRequest, UserProfile};
use crate::ports::credential_provider::IdentityToken;

/// Errors that can occur when calling the backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The session cookie or identity token was not accepted (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The backend refused the operation for this user (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The resource does not exist (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// The operation conflicts with current server state (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Any other 4xx
    #[error("Rejected ({status}): {reason}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Reason given by the backend
        reason: String,
    },

    /// Rate limit exceeded (429)
    #[error("Too many requests, retry after {retry_after:?}")]
    TooManyRequests {
        /// Duration the backend asked us to wait, if it said
        retry_after: Option<Duration>,
    },

    /// A server-side error occurred (5xx)
    #[error("Server error: {0}")]
    Server(String),

    /// Connection, DNS, TLS or timeout failure
    #[error("Network error: {0}")]
    Network(String),

    /// The response could not be parsed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    /// Reason text carried by the error
    pub fn reason(&self) -> &str {
        match self {
            GatewayError::Unauthorized(r)
            | GatewayError::Forbidden(r)
            | GatewayError::NotFound(r)
            | GatewayError::Conflict(r)
            | GatewayError::Server(r)
            | GatewayError::Network(r)
            | GatewayError::InvalidResponse(r) => r,
            GatewayError::Rejected { reason, .. } => reason,
            GatewayError::TooManyRequests { .. } => "",
        }
    }

    /// Returns true for faults where repeating the call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GatewayError::Network(_)
                | GatewayError::Server(_)
                | GatewayError::TooManyRequests { .. }
        )
    }
}

/// Port trait for the backend session and item endpoints
#[async_trait::async_trait]
pub trait ISessionGateway: Send + Sync {
    /// Exchanges an identity token for an application session
    ///
    /// # Arguments
    /// * `token` - Fresh identity token
    /// * `name` - Display name to record on first login (sign-up)
    ///
    /// # Returns
    /// The backend's canonical profile for the session user
    async fn session_login(
        &self,
        token: &IdentityToken,
        name: Option<&str>,
    ) -> Result<UserProfile, GatewayError>;

    /// Invalidates the application session
    async fn logout(&self) -> Result<(), GatewayError>;

    /// Fetches a single item
    async fn get_item(&self, id: &ItemId) -> Result<Item, GatewayError>;

    /// Fetches every item
    async fn list_items(&self) -> Result<Vec<Item>, GatewayError>;

    /// Fetches the items posted by the session user
    async fn list_my_items(&self) -> Result<Vec<Item>, GatewayError>;

    /// Posts a new item
    ///
    /// # Returns
    /// The id the backend assigned
    async fn create_item(&self, draft: &ItemDraft) -> Result<ItemId, GatewayError>;

    /// Replaces the poster-written fields of an item
    ///
    /// # Errors
    /// `Forbidden` when the session user may not edit the item
    async fn update_item(&self, id: &ItemId, draft: &ItemDraft) -> Result<(), GatewayError>;

    /// Deletes an item
    async fn delete_item(&self, id: &ItemId) -> Result<(), GatewayError>;

    /// Submits a recovery claim
    ///
    /// # Errors
    /// `Forbidden` when the backend decides the claimant owns the item,
    /// `Conflict` when the item is already recovered
    async fn recover_item(&self, request: &RecoveryRequest)
        -> Result<RecoveryRecord, GatewayError>;

    /// Lists recovery records visible to the session user
    async fn list_recoveries(&self) -> Result<Vec<RecoveryRecord>, GatewayError>;
}
