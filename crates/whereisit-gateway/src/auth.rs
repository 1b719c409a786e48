//! Provider-hosted consent flow (OAuth2 Authorization Code with PKCE)
//!
//! Used for "sign in with Google" style authentication. The provider's
//! access token is then handed to the identity service
//! (`accounts:signInWithIdp`) which mints the identity.
//!
//! ## Components
//!
//! - [`ConsentConfig`] - Endpoints, client id, redirect and scopes
//! - [`PKCEFlow`] - OAuth2 PKCE challenge/exchange logic
//! - [`LocalCallbackServer`] - Minimal HTTP server for the OAuth redirect
//! - [`ConsentFlow`] - Orchestrates browser, callback and code exchange

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use oauth2::{
    basic::BasicClient, AuthUrl, AuthorizationCode, ClientId, CsrfToken, EndpointNotSet,
    EndpointSet, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope, TokenResponse,
    TokenUrl,
};
use tracing::{debug, info, warn};

use whereisit_core::config::OAuthConfig;
use whereisit_core::ports::CredentialError;

/// How long the callback server waits for the browser
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

// ============================================================================
// ConsentConfig
// ============================================================================

/// Configuration for the consent flow
#[derive(Debug, Clone)]
pub struct ConsentConfig {
    /// OAuth client id registered with the provider
    pub client_id: String,
    /// Authorization endpoint
    pub auth_url: String,
    /// Token endpoint
    pub token_url: String,
    /// Loopback redirect URI served by [`LocalCallbackServer`]
    pub redirect_uri: String,
    /// OAuth scopes to request
    pub scopes: Vec<String>,
}

impl ConsentConfig {
    /// Builds the consent configuration from the `oauth` section
    ///
    /// Returns `None` when no client id is configured, in which case
    /// provider sign-in is unavailable.
    pub fn from_config(config: &OAuthConfig) -> Option<Self> {
        let client_id = config.client_id.clone().filter(|id| !id.trim().is_empty())?;
        Some(Self {
            client_id,
            auth_url: config.auth_url.clone(),
            token_url: config.token_url.clone(),
            redirect_uri: config.redirect_uri.clone(),
            scopes: config.scopes.clone(),
        })
    }

    /// Address the callback server binds, taken from the redirect URI
    pub fn callback_addr(&self) -> Result<SocketAddr> {
        let url = url::Url::parse(&self.redirect_uri).context("Invalid redirect URI")?;
        let host = url.host_str().ok_or_else(|| anyhow!("Redirect URI has no host"))?;
        let host = if host == "localhost" { "127.0.0.1" } else { host };
        let port = url
            .port_or_known_default()
            .ok_or_else(|| anyhow!("Redirect URI has no port"))?;
        format!("{host}:{port}")
            .parse()
            .with_context(|| format!("Redirect host {host} is not a loopback address"))
    }
}

// ============================================================================
// PKCEFlow
// ============================================================================

/// OAuth2 PKCE flow implementation using the `oauth2` crate
pub struct PKCEFlow {
    client: BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>,
    scopes: Vec<String>,
}

impl PKCEFlow {
    /// Creates a new PKCEFlow with the given configuration
    pub fn new(config: &ConsentConfig) -> Result<Self> {
        let client = BasicClient::new(ClientId::new(config.client_id.clone()))
            .set_auth_uri(AuthUrl::new(config.auth_url.clone()).context("Invalid authorization URL")?)
            .set_token_uri(TokenUrl::new(config.token_url.clone()).context("Invalid token URL")?)
            .set_redirect_uri(
                RedirectUrl::new(config.redirect_uri.clone()).context("Invalid redirect URI")?,
            );

        Ok(Self {
            client,
            scopes: config.scopes.clone(),
        })
    }

    /// Generates an authorization URL with a PKCE challenge
    ///
    /// # Returns
    /// A tuple of `(authorization_url, csrf_token, pkce_verifier)`.
    pub fn generate_auth_url(&self) -> (String, CsrfToken, PkceCodeVerifier) {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let mut auth_request = self.client.authorize_url(CsrfToken::new_random);
        for scope in &self.scopes {
            auth_request = auth_request.add_scope(Scope::new(scope.clone()));
        }
        let (auth_url, csrf_token) = auth_request.set_pkce_challenge(pkce_challenge).url();

        debug!("Generated authorization URL");
        (auth_url.to_string(), csrf_token, pkce_verifier)
    }

    /// Exchanges an authorization code for the provider's access token
    pub async fn exchange_code(
        &self,
        code: String,
        pkce_verifier: PkceCodeVerifier,
    ) -> Result<String> {
        info!("Exchanging authorization code with the provider");

        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("Failed to build HTTP client")?;
        let token_result = self
            .client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(pkce_verifier)
            .request_async(&http_client)
            .await
            .context("Failed to exchange authorization code")?;

        Ok(token_result.access_token().secret().to_string())
    }
}

// ============================================================================
// LocalCallbackServer
// ============================================================================

/// Minimal HTTP server that listens on the loopback redirect address.
///
/// Serves connections until one carries either an authorization code or an
/// error, answers it with a small HTML page, and returns.
pub struct LocalCallbackServer;

/// Parameters extracted from the OAuth2 callback
#[derive(Debug, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// The user granted consent
    Granted {
        /// The authorization code
        code: String,
        /// The CSRF state parameter
        state: String,
    },
    /// The provider redirected back with `error=...`
    Denied(String),
}

impl LocalCallbackServer {
    /// Starts the callback server on `addr` and waits for the redirect
    pub async fn start(addr: SocketAddr) -> Result<CallbackOutcome> {
        use http_body_util::Full;
        use hyper::body::Bytes;
        use hyper::server::conn::http1;
        use hyper::service::service_fn;
        use hyper::{Request, Response, StatusCode};
        use hyper_util::rt::TokioIo;
        use tokio::net::TcpListener;
        use tokio::sync::mpsc;

        info!(%addr, "Starting local OAuth callback server");

        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind callback server to {addr}"))?;

        let (tx, mut rx) = mpsc::channel::<CallbackOutcome>(1);

        loop {
            let (stream, _peer) = tokio::select! {
                accepted = listener.accept() => {
                    accepted.context("Failed to accept connection on callback server")?
                }
                Some(outcome) = rx.recv() => {
                    info!("Received OAuth callback");
                    return Ok(outcome);
                }
            };

            let io = TokioIo::new(stream);
            let tx = tx.clone();
            let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                let tx = tx.clone();
                async move {
                    let uri = req.uri().to_string();
                    debug!("Callback server received request: {}", uri);

                    let (status, html) = match parse_callback(&uri) {
                        Some(outcome) => {
                            let page = match &outcome {
                                CallbackOutcome::Granted { .. } => success_html(),
                                CallbackOutcome::Denied(reason) => error_html(reason),
                            };
                            let _ = tx.send(outcome).await;
                            (StatusCode::OK, page)
                        }
                        None => (
                            StatusCode::NOT_FOUND,
                            error_html("Missing authorization code in callback"),
                        ),
                    };

                    let mut response = Response::new(Full::new(Bytes::from(html)));
                    *response.status_mut() = status;
                    response.headers_mut().insert(
                        hyper::header::CONTENT_TYPE,
                        hyper::header::HeaderValue::from_static("text/html; charset=utf-8"),
                    );
                    Ok::<_, hyper::Error>(response)
                }
            });

            tokio::spawn(async move {
                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    warn!("Callback server connection error: {}", e);
                }
            });
        }
    }
}

/// Parses the authorization code, state or error from a callback URI
fn parse_callback(uri: &str) -> Option<CallbackOutcome> {
    let url = url::Url::parse(&format!("http://localhost{}", uri)).ok()?;
    let mut code = None;
    let mut state = None;
    let mut error = None;

    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.to_string()),
            "state" => state = Some(value.to_string()),
            "error" => error = Some(value.to_string()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Some(CallbackOutcome::Denied(error));
    }
    Some(CallbackOutcome::Granted {
        code: code?,
        state: state.unwrap_or_default(),
    })
}

fn success_html() -> String {
    r#"<!DOCTYPE html>
<html>
<head><title>WhereIsIt - Signed In</title></head>
<body style="font-family: sans-serif; text-align: center; padding-top: 50px;">
    <h1>Signed In</h1>
    <p>You can close this window and return to WhereIsIt.</p>
    <script>setTimeout(function() { window.close(); }, 3000);</script>
</body>
</html>"#
        .to_string()
}

fn error_html(message: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>WhereIsIt - Sign-in Failed</title></head>
<body style="font-family: sans-serif; text-align: center; padding-top: 50px;">
    <h1>Sign-in Failed</h1>
    <p>{}</p>
    <p>Please close this window and try again.</p>
</body>
</html>"#,
        message
    )
}

// ============================================================================
// ConsentFlow
// ============================================================================

/// Runs the interactive consent flow end to end.
///
/// 1. Generates a PKCE authorization URL
/// 2. Opens the user's browser at the provider's consent page
/// 3. Waits on the loopback callback server for the redirect
/// 4. Checks the CSRF state and exchanges the code
pub struct ConsentFlow {
    config: ConsentConfig,
}

impl ConsentFlow {
    /// Creates a new ConsentFlow with the given configuration
    pub fn new(config: ConsentConfig) -> Self {
        Self { config }
    }

    /// Returns a reference to the current configuration
    pub fn config(&self) -> &ConsentConfig {
        &self.config
    }

    /// Runs the flow and returns the provider's access token
    ///
    /// # Errors
    /// `CredentialError::UserCancelled` if the user declines, closes the
    /// page without answering, or the provider reports `access_denied`
    pub async fn login(&self) -> Result<String, CredentialError> {
        info!("Starting provider consent flow");
        let other = |e: anyhow::Error| CredentialError::Other(format!("{e:#}"));

        let flow = PKCEFlow::new(&self.config).map_err(other)?;
        let addr = self.config.callback_addr().map_err(other)?;
        let (auth_url, csrf_token, pkce_verifier) = flow.generate_auth_url();

        info!("Opening browser for provider sign-in");
        if let Err(e) = webbrowser::open(&auth_url) {
            warn!(error = %e, url = %auth_url, "Could not open a browser; open the URL manually");
        }

        let outcome = tokio::time::timeout(CALLBACK_TIMEOUT, LocalCallbackServer::start(addr))
            .await
            .map_err(|_| CredentialError::UserCancelled)?
            .map_err(other)?;

        let code = match outcome {
            CallbackOutcome::Granted { code, state } => {
                if state != *csrf_token.secret() {
                    return Err(CredentialError::Other(
                        "OAuth state mismatch in callback".to_string(),
                    ));
                }
                code
            }
            CallbackOutcome::Denied(reason) => {
                info!(reason = %reason, "Provider consent declined");
                return Err(if reason == "access_denied" {
                    CredentialError::UserCancelled
                } else {
                    CredentialError::Other(format!("provider returned {reason}"))
                });
            }
        };

        let token = flow.exchange_code(code, pkce_verifier).await.map_err(other)?;
        info!("Provider consent flow completed");
        Ok(token)
    }
}
