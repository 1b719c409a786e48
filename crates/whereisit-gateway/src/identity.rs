//! Identity service REST client
//!
//! Talks to an identity-toolkit style service:
//!
//! | operation | endpoint |
//! |---|---|
//! | sign up | `POST {base}/accounts:signUp?key=` |
//! | password sign-in | `POST {base}/accounts:signInWithPassword?key=` |
//! | profile update | `POST {base}/accounts:update?key=` |
//! | provider sign-in | `POST {base}/accounts:signInWithIdp?key=` |
//! | token refresh | `POST {token_url}?key=` (refresh grant) |
//!
//! Error bodies look like `{"error": {"code": 400, "message": "EMAIL_EXISTS"}}`,
//! sometimes with a detail after `" : "`. The code is mapped to a typed
//! [`CredentialError`].

use std::time::Duration;

use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use whereisit_core::config::IdentityConfig;
use whereisit_core::domain::{Email, NewProfile, SubjectId};
use whereisit_core::ports::{CredentialError, Identity, IdentityToken};

/// Token lifetime assumed when the service omits `expiresIn`
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRequest<'a> {
    id_token: &'a str,
    display_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    photo_url: Option<&'a str>,
    return_secure_token: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IdpRequest<'a> {
    post_body: String,
    request_uri: &'a str,
    return_idp_credential: bool,
    return_secure_token: bool,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    grant_type: &'static str,
    refresh_token: &'a str,
}

/// Response of the `accounts:*` endpoints
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    local_id: String,
    email: Option<String>,
    display_name: Option<String>,
    photo_url: Option<String>,
    id_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<String>,
}

/// Response of the token endpoint (snake_case, unlike the rest)
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

// ============================================================================
// Results
// ============================================================================

/// A signed-in identity together with its refresh token
#[derive(Debug, Clone)]
pub struct IdentitySession {
    /// Identity as handed to the core
    pub identity: Identity,
    /// Long-lived refresh token
    pub refresh_token: String,
    /// Avatar URL held by the identity service
    pub photo_url: Option<String>,
}

/// A refreshed identity token
#[derive(Debug, Clone)]
pub struct RefreshedToken {
    /// Subject the token was issued for
    pub subject_id: SubjectId,
    /// The new identity token
    pub token: IdentityToken,
    /// Refresh token to use next time (may be rotated)
    pub refresh_token: String,
}

// ============================================================================
// IdentityClient
// ============================================================================

/// HTTP client for the identity service
#[derive(Debug, Clone)]
pub struct IdentityClient {
    client: Client,
    base_url: String,
    token_url: String,
    api_key: Option<String>,
}

impl IdentityClient {
    /// Creates a client from the identity configuration section
    ///
    /// A missing API key is not an error here; every call then fails with
    /// `CredentialError::Other`, so commands that never authenticate still
    /// work.
    pub fn new(config: &IdentityConfig, timeout: Duration) -> Result<Self, CredentialError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CredentialError::Other(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token_url: config.token_url.clone(),
            api_key: config.api_key.clone(),
        })
    }

    /// Creates a client against custom endpoints (useful for testing)
    pub fn with_endpoints(
        base_url: impl Into<String>,
        token_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            token_url: token_url.into(),
            api_key: Some(api_key.into()),
        }
    }

    /// Creates a new email/password account
    pub async fn sign_up(
        &self,
        email: &Email,
        password: &str,
    ) -> Result<IdentitySession, CredentialError> {
        let body = PasswordRequest {
            email: email.as_str(),
            password,
            return_secure_token: true,
        };
        let response: AccountResponse = self.post_account("accounts:signUp", &body).await?;
        session_from(response, email.as_str())
    }

    /// Signs in with email and password
    pub async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &str,
    ) -> Result<IdentitySession, CredentialError> {
        let body = PasswordRequest {
            email: email.as_str(),
            password,
            return_secure_token: true,
        };
        let response: AccountResponse = self
            .post_account("accounts:signInWithPassword", &body)
            .await?;
        session_from(response, email.as_str())
    }

    /// Signs in with an access token obtained from an external provider
    ///
    /// # Arguments
    /// * `provider_id` - Provider name known to the identity service ("google.com")
    /// * `access_token` - OAuth access token issued by that provider
    /// * `request_uri` - Redirect URI used in the consent flow
    pub async fn sign_in_with_idp(
        &self,
        provider_id: &str,
        access_token: &str,
        request_uri: &str,
    ) -> Result<IdentitySession, CredentialError> {
        let post_body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("access_token", access_token)
            .append_pair("providerId", provider_id)
            .finish();
        let body = IdpRequest {
            post_body,
            request_uri,
            return_idp_credential: true,
            return_secure_token: true,
        };
        let response: AccountResponse = self.post_account("accounts:signInWithIdp", &body).await?;
        let email = response.email.clone().unwrap_or_default();
        session_from(response, &email)
    }

    /// Updates display name and photo; returns the refreshed session if the
    /// service rotated the tokens
    pub async fn update_profile(
        &self,
        id_token: &str,
        profile: &NewProfile,
    ) -> Result<ProfileUpdate, CredentialError> {
        let body = UpdateRequest {
            id_token,
            display_name: &profile.display_name,
            photo_url: profile.photo_url.as_deref(),
            return_secure_token: true,
        };
        let response: AccountResponse = self.post_account("accounts:update", &body).await?;
        let token = match (&response.id_token, &response.expires_in) {
            (Some(value), expires_in) => Some(IdentityToken {
                value: value.clone(),
                expires_at: expiry(expires_in.as_deref()),
            }),
            (None, _) => None,
        };
        Ok(ProfileUpdate {
            display_name: response.display_name,
            photo_url: response.photo_url,
            token,
            refresh_token: response.refresh_token,
        })
    }

    /// Exchanges a refresh token for a new identity token
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken, CredentialError> {
        let url = format!("{}?key={}", self.token_url, self.api_key()?);
        let body = RefreshRequest {
            grant_type: "refresh_token",
            refresh_token,
        };
        let response: RefreshResponse = self.post(&url, &body, "token").await?;
        Ok(RefreshedToken {
            subject_id: SubjectId::new(response.user_id)
                .map_err(|e| CredentialError::Other(e.to_string()))?,
            token: IdentityToken {
                value: response.id_token,
                expires_at: expiry(Some(&response.expires_in)),
            },
            refresh_token: response.refresh_token,
        })
    }

    fn api_key(&self) -> Result<&str, CredentialError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| CredentialError::Other("identity.api_key is not configured".to_string()))
    }

    async fn post_account<B: Serialize, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, CredentialError> {
        let url = format!("{}/{}?key={}", self.base_url, endpoint, self.api_key()?);
        self.post(&url, body, endpoint).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
        endpoint: &str,
    ) -> Result<T, CredentialError> {
        debug!(endpoint, "Calling identity service");
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| CredentialError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| CredentialError::Other(format!("{endpoint}: invalid response: {e}")));
        }

        let text = response.text().await.unwrap_or_default();
        let err = map_error(status, &text);
        warn!(endpoint, status = status.as_u16(), error = %err, "Identity service refused request");
        Err(err)
    }
}

/// Result of a profile update
#[derive(Debug, Clone)]
pub struct ProfileUpdate {
    /// Display name now held by the service
    pub display_name: Option<String>,
    /// Photo URL now held by the service
    pub photo_url: Option<String>,
    /// Rotated identity token, if the service issued one
    pub token: Option<IdentityToken>,
    /// Rotated refresh token, if the service issued one
    pub refresh_token: Option<String>,
}

fn expiry(expires_in: Option<&str>) -> chrono::DateTime<Utc> {
    let seconds = expires_in
        .and_then(|s| s.trim().parse::<i64>().ok())
        .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
    Utc::now() + chrono::Duration::seconds(seconds)
}

fn session_from(
    response: AccountResponse,
    fallback_email: &str,
) -> Result<IdentitySession, CredentialError> {
    let invalid = |what: &str| CredentialError::Other(format!("identity response missing {what}"));

    let subject_id =
        SubjectId::new(response.local_id).map_err(|e| CredentialError::Other(e.to_string()))?;
    let email = Email::new(response.email.as_deref().unwrap_or(fallback_email))
        .map_err(|e| CredentialError::InvalidEmail(e.to_string()))?;
    let id_token = response.id_token.ok_or_else(|| invalid("idToken"))?;
    let refresh_token = response.refresh_token.ok_or_else(|| invalid("refreshToken"))?;

    Ok(IdentitySession {
        identity: Identity {
            subject_id,
            email,
            display_name: response.display_name.filter(|n| !n.is_empty()),
            token: IdentityToken {
                value: id_token,
                expires_at: expiry(response.expires_in.as_deref()),
            },
        },
        refresh_token,
        photo_url: response.photo_url,
    })
}

/// Maps an identity service error body to a typed credential error
pub(crate) fn map_error(status: StatusCode, body: &str) -> CredentialError {
    let message = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => envelope.error.message,
        Err(_) if status.is_server_error() => {
            return CredentialError::Network(format!("identity service returned {status}"));
        }
        Err(_) => return CredentialError::Other(format!("identity service returned {status}")),
    };

    let (code, detail) = match message.split_once(" : ") {
        Some((code, detail)) => (code.trim(), detail.trim().to_string()),
        None => (message.trim(), String::new()),
    };
    let detail_or = |fallback: &str| {
        if detail.is_empty() {
            fallback.to_string()
        } else {
            detail.clone()
        }
    };

    match code {
        "EMAIL_EXISTS" => CredentialError::EmailInUse,
        "WEAK_PASSWORD" => CredentialError::WeakCredential(detail_or("password is too weak")),
        "INVALID_EMAIL" => CredentialError::InvalidEmail(detail_or("email address is malformed")),
        "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" => {
            CredentialError::InvalidCredentials(detail_or("wrong email or password"))
        }
        "USER_DISABLED" => CredentialError::InvalidCredentials(detail_or("account disabled")),
        "TOKEN_EXPIRED" | "INVALID_ID_TOKEN" | "INVALID_REFRESH_TOKEN" | "USER_NOT_FOUND" => {
            CredentialError::InvalidToken(code.to_string())
        }
        _ if status.is_server_error() => CredentialError::Network(message),
        _ => CredentialError::Other(message),
    }
}
