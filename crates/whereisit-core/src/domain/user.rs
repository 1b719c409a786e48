//! User profile domain types
//!
//! The [`UserProfile`] is the backend's canonical view of the signed-in user.
//! It is produced only by a successful session exchange and is never patched
//! field by field on the client.

use serde::{Deserialize, Serialize};

use super::newtypes::{BackendUserId, Email, SubjectId};

/// Application role of a user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum Role {
    /// Regular user
    #[default]
    User,
    /// Administrator with access to moderation screens
    Admin,
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        if value.eq_ignore_ascii_case("admin") {
            Role::Admin
        } else {
            Role::User
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

/// Canonical user profile returned by `POST /users/session-login`
///
/// Field names follow the backend document (`_id`, `uid`, `name`,
/// `photoURL`); common alternates are accepted as aliases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Subject id of the identity this profile was minted for
    #[serde(rename = "uid", alias = "subjectId", alias = "firebaseUid")]
    pub subject_id: SubjectId,
    /// Email address, lower-cased
    pub email: Email,
    /// Display name as stored by the backend
    #[serde(rename = "name", alias = "displayName", default)]
    pub display_name: String,
    /// Application role
    #[serde(default)]
    pub role: Role,
    /// Backend user document id
    #[serde(rename = "_id", alias = "id", alias = "backendId")]
    pub backend_id: BackendUserId,
    /// Avatar URL
    #[serde(
        rename = "photoURL",
        alias = "photoUrl",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub photo_url: Option<String>,
}

impl UserProfile {
    /// Returns true if the user holds the admin role
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Name to show in the UI, falling back to the email's local part
    pub fn display_label(&self) -> &str {
        if self.display_name.trim().is_empty() {
            self.email
                .as_str()
                .split('@')
                .next()
                .unwrap_or(self.email.as_str())
        } else {
            &self.display_name
        }
    }
}

/// Profile details supplied at sign-up
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewProfile {
    /// Full name entered on the registration form
    pub display_name: String,
    /// Optional avatar URL
    pub photo_url: Option<String>,
}

impl NewProfile {
    /// Creates a profile with just a display name
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            photo_url: None,
        }
    }

    /// Sets the avatar URL; blank values are treated as absent
    pub fn with_photo_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.photo_url = if url.trim().is_empty() { None } else { Some(url) };
        self
    }
}
