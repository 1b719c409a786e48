//! Configuration module for WhereIsIt.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Environment variable that overrides `backend.base_url`.
pub const API_BASE_URL_ENV: &str = "WHEREISIT_API_BASE_URL";

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for WhereIsIt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub identity: IdentityConfig,
    pub oauth: OAuthConfig,
    pub session: SessionConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

/// Backend REST API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the backend, e.g. `https://api.whereisit.app`.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

/// Identity service (email/password accounts) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Base URL of the accounts REST API.
    pub base_url: String,
    /// Secure token endpoint used for the refresh-token grant.
    pub token_url: String,
    /// Public web API key. `None` until configured.
    pub api_key: Option<String>,
}

/// Provider-hosted consent flow (OAuth2 Authorization Code with PKCE).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// OAuth client ID. `None` disables `auth login-provider`.
    pub client_id: Option<String>,
    /// Authorization endpoint.
    pub auth_url: String,
    /// Token endpoint.
    pub token_url: String,
    /// Loopback redirect URI the local callback server listens on.
    pub redirect_uri: String,
    /// Scopes to request.
    pub scopes: Vec<String>,
    /// Provider id passed to the identity service when linking the credential.
    pub provider_id: String,
}

/// Session bridge and identity persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Refresh the identity token this many seconds before it expires.
    pub refresh_margin_secs: u64,
    /// Persist the refresh token in the OS keyring for silent restore.
    pub persist_identity: bool,
}

/// Item cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Number of items in the "latest items" listing.
    pub latest_items: usize,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Output format: `pretty` or `json`.
    pub format: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/whereisit/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("whereisit")
            .join("config.yaml")
    }

    /// Apply environment overrides on top of the file values.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup(API_BASE_URL_ENV).filter(|v| !v.trim().is_empty()) {
            tracing::debug!(base_url = %url, "Backend base URL overridden from environment");
            self.backend.base_url = url;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Config::default()
// ---------------------------------------------------------------------------

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            base_url: "https://identitytoolkit.googleapis.com/v1".to_string(),
            token_url: "https://securetoken.googleapis.com/v1/token".to_string(),
            api_key: None,
        }
    }
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            redirect_uri: "http://127.0.0.1:8400/callback".to_string(),
            scopes: vec![
                "openid".to_string(),
                "email".to_string(),
                "profile".to_string(),
            ],
            provider_id: "google.com".to_string(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_margin_secs: 300,
            persist_identity: true,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { latest_items: 6 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"backend.timeout_secs"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid values for `logging.format`.
const VALID_LOG_FORMATS: &[&str] = &["pretty", "json"];

/// Identity tokens live for an hour; a larger margin would refresh forever.
const MAX_REFRESH_MARGIN_SECS: u64 = 3600;

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- backend ---
        if !is_http_url(&self.backend.base_url) {
            errors.push(ValidationError {
                field: "backend.base_url".into(),
                message: format!("must be an http(s) URL, got '{}'", self.backend.base_url),
            });
        }
        if self.backend.timeout_secs == 0 {
            errors.push(ValidationError {
                field: "backend.timeout_secs".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- identity ---
        if !is_http_url(&self.identity.base_url) {
            errors.push(ValidationError {
                field: "identity.base_url".into(),
                message: format!("must be an http(s) URL, got '{}'", self.identity.base_url),
            });
        }
        if !is_http_url(&self.identity.token_url) {
            errors.push(ValidationError {
                field: "identity.token_url".into(),
                message: format!("must be an http(s) URL, got '{}'", self.identity.token_url),
            });
        }
        if matches!(&self.identity.api_key, Some(key) if key.trim().is_empty()) {
            errors.push(ValidationError {
                field: "identity.api_key".into(),
                message: "must not be blank when set".into(),
            });
        }

        // --- oauth ---
        if self.oauth.client_id.is_some() {
            if !is_http_url(&self.oauth.auth_url) {
                errors.push(ValidationError {
                    field: "oauth.auth_url".into(),
                    message: "must be an http(s) URL".into(),
                });
            }
            if !is_http_url(&self.oauth.token_url) {
                errors.push(ValidationError {
                    field: "oauth.token_url".into(),
                    message: "must be an http(s) URL".into(),
                });
            }
            if self.oauth.scopes.is_empty() {
                errors.push(ValidationError {
                    field: "oauth.scopes".into(),
                    message: "must request at least one scope".into(),
                });
            }
        }
        if !(self.oauth.redirect_uri.starts_with("http://127.0.0.1:")
            || self.oauth.redirect_uri.starts_with("http://localhost:"))
        {
            errors.push(ValidationError {
                field: "oauth.redirect_uri".into(),
                message: "must be a loopback http URL with an explicit port".into(),
            });
        }

        // --- session ---
        if self.session.refresh_margin_secs >= MAX_REFRESH_MARGIN_SECS {
            errors.push(ValidationError {
                field: "session.refresh_margin_secs".into(),
                message: format!("must be less than {MAX_REFRESH_MARGIN_SECS}"),
            });
        }

        // --- cache ---
        if self.cache.latest_items == 0 {
            errors.push(ValidationError {
                field: "cache.latest_items".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }
        if !VALID_LOG_FORMATS.contains(&self.logging.format.as_str()) {
            errors.push(ValidationError {
                field: "logging.format".into(),
                message: format!(
                    "invalid format '{}'; valid options: {}",
                    self.logging.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use whereisit_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .backend_base_url("https://api.whereisit.app")
///     .identity_api_key("web-api-key")
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- backend ---

    pub fn backend_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.backend.base_url = url.into();
        self
    }

    pub fn backend_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.backend.timeout_secs = seconds;
        self
    }

    // --- identity ---

    pub fn identity_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.identity.base_url = url.into();
        self
    }

    pub fn identity_token_url(mut self, url: impl Into<String>) -> Self {
        self.config.identity.token_url = url.into();
        self
    }

    pub fn identity_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.identity.api_key = Some(key.into());
        self
    }

    // --- oauth ---

    pub fn oauth_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.config.oauth.client_id = Some(client_id.into());
        self
    }

    pub fn oauth_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.config.oauth.redirect_uri = uri.into();
        self
    }

    pub fn oauth_scopes(mut self, scopes: Vec<String>) -> Self {
        self.config.oauth.scopes = scopes;
        self
    }

    // --- session ---

    pub fn session_refresh_margin_secs(mut self, seconds: u64) -> Self {
        self.config.session.refresh_margin_secs = seconds;
        self
    }

    pub fn session_persist_identity(mut self, persist: bool) -> Self {
        self.config.session.persist_identity = persist;
        self
    }

    // --- cache ---

    pub fn cache_latest_items(mut self, n: usize) -> Self {
        self.config.cache.latest_items = n;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_format(mut self, format: impl Into<String>) -> Self {
        self.config.logging.format = format.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
