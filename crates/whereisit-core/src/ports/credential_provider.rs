//! Credential provider port (driven/secondary port)
//!
//! This module defines the interface to the external identity service that
//! issues short-lived identity tokens. The core never stores an identity;
//! it borrows one long enough to mint a backend session.
//!
//! ## Design Notes
//!
//! - Errors are typed ([`CredentialError`]) because the session bridge needs
//!   to tell a cancelled consent flow from a bad password from an expired
//!   token.
//! - Identity changes (sign-in, token refresh, silent restore, sign-out) are
//!   published on a `tokio::sync::broadcast` channel obtained through
//!   [`ICredentialProvider::subscribe`].
//! - Token refresh happens inside the adapter; the port only ever hands out
//!   a token that was valid when it was issued.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::domain::newtypes::{Email, SubjectId};
use crate::domain::user::NewProfile;

// ============================================================================
// Identity
// ============================================================================

/// Short-lived identity token issued by the identity service
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityToken {
    /// Raw token value
    pub value: String,
    /// When the token stops being accepted
    pub expires_at: DateTime<Utc>,
}

impl IdentityToken {
    /// Returns true if the token has expired
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Returns true if the token will expire within the given duration
    pub fn expires_within(&self, duration: chrono::Duration) -> bool {
        Utc::now() + duration >= self.expires_at
    }
}

impl std::fmt::Debug for IdentityToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Opaque external-identity reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Subject id assigned by the identity service
    pub subject_id: SubjectId,
    /// Email the identity was created with
    pub email: Email,
    /// Display name held by the identity service, if any
    pub display_name: Option<String>,
    /// Most recent token
    pub token: IdentityToken,
}

/// Identity-changed notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityEvent {
    /// An explicit sign-in or sign-up completed
    SignedIn(Identity),
    /// The adapter refreshed the token in the background
    TokenRefreshed(Identity),
    /// A persisted identity was restored at start-up
    Restored(Identity),
    /// The identity was signed out or revoked
    SignedOut,
}

impl IdentityEvent {
    /// The identity carried by the event, if any
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            IdentityEvent::SignedIn(identity)
            | IdentityEvent::TokenRefreshed(identity)
            | IdentityEvent::Restored(identity) => Some(identity),
            IdentityEvent::SignedOut => None,
        }
    }

    /// Short name used in log fields
    pub fn kind(&self) -> &'static str {
        match self {
            IdentityEvent::SignedIn(_) => "signed_in",
            IdentityEvent::TokenRefreshed(_) => "token_refreshed",
            IdentityEvent::Restored(_) => "restored",
            IdentityEvent::SignedOut => "signed_out",
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors reported by a credential provider
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    /// Another identity already uses this email
    #[error("Email already in use")]
    EmailInUse,

    /// The password was refused by the identity service
    #[error("Weak credential: {0}")]
    WeakCredential(String),

    /// The email address was refused by the identity service
    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    /// Unknown account or wrong password
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// The user declined or closed the consent flow
    #[error("Cancelled by user")]
    UserCancelled,

    /// The identity token or refresh token is malformed, expired or revoked
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// The identity service could not be reached
    #[error("Network error: {0}")]
    Network(String),

    /// Anything else
    #[error("{0}")]
    Other(String),
}

// ============================================================================
// ICredentialProvider trait
// ============================================================================

/// Port trait for the external identity service
///
/// ## Implementation Notes
///
/// - `authenticate` and `authenticate_via_provider` publish
///   [`IdentityEvent::SignedIn`] in addition to returning the identity.
///   `create_identity` does not; sign-up completes the profile first and
///   syncs explicitly. `sign_out` publishes [`IdentityEvent::SignedOut`].
/// - `restore` publishes [`IdentityEvent::Restored`] when it finds a
///   persisted identity.
/// - A background refresh publishes [`IdentityEvent::TokenRefreshed`].
#[async_trait::async_trait]
pub trait ICredentialProvider: Send + Sync {
    /// Creates a new email/password identity and signs it in
    ///
    /// # Arguments
    /// * `email` - Address for the new identity
    /// * `password` - Password, already checked against the client policy
    async fn create_identity(
        &self,
        email: &Email,
        password: &str,
    ) -> Result<Identity, CredentialError>;

    /// Pushes display name and photo to the identity
    async fn update_profile(
        &self,
        identity: &Identity,
        profile: &NewProfile,
    ) -> Result<Identity, CredentialError>;

    /// Authenticates with email and password
    async fn authenticate(&self, email: &Email, password: &str)
        -> Result<Identity, CredentialError>;

    /// Authenticates through the provider-hosted consent flow
    ///
    /// # Errors
    /// `CredentialError::UserCancelled` if the user declines or closes the
    /// flow
    async fn authenticate_via_provider(&self) -> Result<Identity, CredentialError>;

    /// Ends the identity session and forgets any persisted identity
    async fn sign_out(&self) -> Result<(), CredentialError>;

    /// Returns a token for `identity` that is valid now
    ///
    /// Refreshes first if the current token is expired or about to expire.
    async fn get_token(&self, identity: &Identity) -> Result<IdentityToken, CredentialError>;

    /// Restores a persisted identity, if any
    async fn restore(&self) -> Result<Option<Identity>, CredentialError>;

    /// Subscribes to identity-changed notifications
    fn subscribe(&self) -> broadcast::Receiver<IdentityEvent>;
}
