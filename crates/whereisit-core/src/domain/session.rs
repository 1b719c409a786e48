//! Session domain value
//!
//! The [`Session`] is the single, process-wide answer to "who is signed in".
//! It pairs a [`SessionStatus`] with an optional [`UserProfile`] and can only
//! be built through constructors that keep the two consistent:
//!
//! ```text
//!                    sign-in / identity event
//!  ┌─────────────────┐ ──────────────────────► ┌────────────────┐
//!  │ Unauthenticated │                         │ Authenticating │
//!  └─────────────────┘ ◄──── invalid token ─── └────────────────┘
//!          ▲                                      │          │
//!          │ sign-out                     exchange ok   exchange failed
//!          │                                      ▼          ▼
//!          │                         ┌───────────────┐  ┌────────────┐
//!          └──────────────────────── │ Authenticated │  │ SyncFailed │
//!                                    │   (user set)  │  └────────────┘
//!                                    └───────────────┘
//! ```

use serde::{Deserialize, Serialize};

use super::user::{Role, UserProfile};

/// Status of the application session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// No identity, or the identity was rejected
    #[default]
    Unauthenticated,
    /// A backend exchange is in flight
    Authenticating,
    /// The backend accepted the identity and returned a profile
    Authenticated,
    /// The last exchange failed; the caller decides whether to retry
    SyncFailed,
}

impl SessionStatus {
    /// Returns true if a backend session is established
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionStatus::Authenticated)
    }

    /// Returns true while a sync attempt is in flight
    pub fn is_pending(&self) -> bool {
        matches!(self, SessionStatus::Authenticating)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Unauthenticated => write!(f, "unauthenticated"),
            SessionStatus::Authenticating => write!(f, "authenticating"),
            SessionStatus::Authenticated => write!(f, "authenticated"),
            SessionStatus::SyncFailed => write!(f, "sync_failed"),
        }
    }
}

/// Immutable snapshot of the application session
///
/// `status == Authenticated` if and only if `user` is present. Fields are
/// private so a half-updated session cannot be built outside this module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Session {
    status: SessionStatus,
    user: Option<UserProfile>,
}

impl Session {
    /// No identity
    pub fn unauthenticated() -> Self {
        Self {
            status: SessionStatus::Unauthenticated,
            user: None,
        }
    }

    /// Exchange in flight
    pub fn authenticating() -> Self {
        Self {
            status: SessionStatus::Authenticating,
            user: None,
        }
    }

    /// Backend session established for `user`
    pub fn authenticated(user: UserProfile) -> Self {
        Self {
            status: SessionStatus::Authenticated,
            user: Some(user),
        }
    }

    /// Last exchange failed
    pub fn sync_failed() -> Self {
        Self {
            status: SessionStatus::SyncFailed,
            user: None,
        }
    }

    /// Returns the session status
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Returns the signed-in user, present only when authenticated
    pub fn user(&self) -> Option<&UserProfile> {
        self.user.as_ref()
    }

    /// Returns true if a backend session is established
    pub fn is_authenticated(&self) -> bool {
        self.status.is_authenticated()
    }

    /// Returns the user if it holds at least `role`
    ///
    /// `Role::User` is satisfied by any authenticated user; `Role::Admin`
    /// only by admins.
    pub fn require_role(&self, role: Role) -> Option<&UserProfile> {
        self.user().filter(|user| match role {
            Role::User => true,
            Role::Admin => user.is_admin(),
        })
    }

    /// Checks the status/user pairing
    pub fn is_consistent(&self) -> bool {
        self.status.is_authenticated() == self.user.is_some()
    }
}

impl std::fmt::Display for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.user {
            Some(user) => write!(f, "{} as {}", self.status, user.email),
            None => write!(f, "{}", self.status),
        }
    }
}
