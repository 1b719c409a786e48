//! Client error taxonomy
//!
//! Every public use-case operation fails with a [`ClientError`]. Port
//! adapters report their own typed errors (`CredentialError`,
//! `GatewayError`) which the use cases classify into this taxonomy.
//!
//! Two variants deserve care in the UI:
//! - [`ClientError::AlreadyRecovered`] means someone else won the race;
//!   there is nothing for the user to do.
//! - [`ClientError::OwnershipConflict`] means the backend decided the user
//!   owns the item even though the cached copy said otherwise.
//!
//! Neither should be presented as a retryable fault; only
//! [`ClientError::Transient`] is.

use thiserror::Error;

use crate::domain::ItemId;

/// Client-side precondition that blocked an operation before any network I/O
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ValidationRule {
    /// No authenticated session
    #[error("you must be signed in")]
    NotAuthenticated,
    /// The cached item is already recovered
    #[error("the item has already been recovered")]
    ItemAlreadyRecovered,
    /// The session user posted the item
    #[error("you cannot recover your own item")]
    OwnItem,
    /// The claim has no location
    #[error("a claimed location is required")]
    MissingClaimLocation,
    /// An item draft has a blank required field
    #[error("the item {0} is required")]
    MissingItemField(&'static str),
    /// Only the poster or an admin may change or delete an item
    #[error("you can only change items you posted")]
    NotItemOwner,
}

/// Why an identity could not be created
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityCreationReason {
    /// Another identity uses this email
    #[error("the email address is already in use")]
    EmailInUse,
    /// The password does not meet the policy
    #[error("weak password: {0}")]
    WeakCredential(String),
    /// The email address is malformed
    #[error("invalid email: {0}")]
    InvalidEmail(String),
    /// Any other identity service refusal, verbatim
    #[error("{0}")]
    Other(String),
}

/// Errors returned by session and recovery operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Sign-up failed at the identity service
    #[error("Identity creation failed: {0}")]
    IdentityCreation(IdentityCreationReason),

    /// Sign-in was refused by the identity service
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The user closed or declined the provider consent flow
    #[error("Sign-in cancelled by user")]
    UserCancelled,

    /// The identity was valid but the backend session could not be minted
    #[error("Backend session sync failed: {0}")]
    BackendSync(String),

    /// A client-side precondition failed; nothing was sent
    #[error("Validation failed: {0}")]
    Validation(ValidationRule),

    /// The backend decided the claimant owns the item
    #[error("Ownership conflict: you cannot recover your own item")]
    OwnershipConflict,

    /// Another claimant recovered the item first
    #[error("Item already recovered")]
    AlreadyRecovered,

    /// Network or server fault; safe to retry
    #[error("Transient error: {0}")]
    Transient(String),

    /// The backend no longer recognises the session
    #[error("Session expired")]
    SessionExpired,

    /// The item does not exist on the backend
    #[error("Item not found: {0}")]
    ItemNotFound(ItemId),

    /// The backend rejected the request for another reason
    #[error("Request rejected: {0}")]
    Rejected(String),
}

impl ClientError {
    /// Returns true if repeating the same call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Transient(_))
    }

    /// Message suitable for showing to the user
    ///
    /// `AlreadyRecovered`, `OwnershipConflict` and `Transient` each get
    /// distinct wording since they call for different remediation.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::IdentityCreation(reason) => {
                format!("Could not create your account: {reason}")
            }
            ClientError::Authentication(_) => {
                "Sign-in failed. Check your email and password.".to_string()
            }
            ClientError::UserCancelled => "Sign-in was cancelled.".to_string(),
            ClientError::BackendSync(_) => {
                "Signed in, but the server session could not be started. Please try again."
                    .to_string()
            }
            ClientError::Validation(rule) => {
                let mut text = rule.to_string();
                if let Some(first) = text.get_mut(0..1) {
                    first.make_ascii_uppercase();
                }
                format!("{text}.")
            }
            ClientError::OwnershipConflict => "You cannot recover your own item.".to_string(),
            ClientError::AlreadyRecovered => {
                "Someone else has already recovered this item. There is nothing more to do."
                    .to_string()
            }
            ClientError::Transient(_) => {
                "The server could not be reached. Please try again.".to_string()
            }
            ClientError::SessionExpired => {
                "Your session has expired. Please sign in again.".to_string()
            }
            ClientError::ItemNotFound(_) => "This item no longer exists.".to_string(),
            ClientError::Rejected(reason) => format!("The request was rejected: {reason}"),
        }
    }
}

impl From<ValidationRule> for ClientError {
    fn from(rule: ValidationRule) -> Self {
        ClientError::Validation(rule)
    }
}

impl From<IdentityCreationReason> for ClientError {
    fn from(reason: IdentityCreationReason) -> Self {
        ClientError::IdentityCreation(reason)
    }
}
