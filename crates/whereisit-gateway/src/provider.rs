//! IdentityProvider - ICredentialProvider implementation
//!
//! Wraps the [`IdentityClient`] and, optionally, a [`ConsentFlow`] and an
//! [`IdentityStore`] to fulfil the [`ICredentialProvider`] port contract.
//!
//! ## Design Notes
//!
//! - One identity is active at a time. It is held behind a
//!   `tokio::sync::Mutex` that is never held across a network call.
//! - Every activation (sign-up, sign-in, restore) persists the refresh token
//!   and restarts the background refresher. The refresher wakes
//!   `refresh_margin` before expiry, refreshes, and publishes
//!   [`IdentityEvent::TokenRefreshed`].
//! - A refresh token the service rejects ends the identity: the store is
//!   cleared and [`IdentityEvent::SignedOut`] is published. A rejection
//!   that arrives after another identity was activated, or after the
//!   refresher was stopped, changes nothing.
//! - The store is only written or cleared while the `active` lock is held,
//!   so persisted state always follows the active identity.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use whereisit_core::config::{Config, OAuthConfig};
use whereisit_core::domain::{Email, NewProfile, SubjectId};
use whereisit_core::ports::{
    CredentialError, ICredentialProvider, Identity, IdentityEvent, IdentityToken,
};

use crate::auth::{ConsentConfig, ConsentFlow};
use crate::identity::{IdentityClient, IdentitySession};
use crate::storage::{IdentityStore, PersistedIdentity};

/// Capacity of the identity event channel
const EVENT_CAPACITY: usize = 32;

/// Floor for the refresher's sleep, so a token shorter than the margin
/// does not spin
const MIN_REFRESH_DELAY: Duration = Duration::from_secs(5);

/// Wait before retrying a refresh that failed for a transient reason
const REFRESH_RETRY_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
struct ActiveIdentity {
    identity: Identity,
    refresh_token: String,
}

impl ActiveIdentity {
    fn persisted(&self) -> PersistedIdentity {
        PersistedIdentity {
            subject_id: self.identity.subject_id.clone(),
            email: self.identity.email.clone(),
            display_name: self.identity.display_name.clone(),
            refresh_token: self.refresh_token.clone(),
        }
    }
}

struct ProviderInner {
    client: IdentityClient,
    consent: Option<ConsentFlow>,
    store: Option<Arc<dyn IdentityStore>>,
    provider_id: String,
    redirect_uri: String,
    refresh_margin: chrono::Duration,
    events: broadcast::Sender<IdentityEvent>,
    active: Mutex<Option<ActiveIdentity>>,
    refresher: Mutex<Option<CancellationToken>>,
}

/// Credential provider backed by the identity service REST API
#[derive(Clone)]
pub struct IdentityProvider {
    inner: Arc<ProviderInner>,
}

impl IdentityProvider {
    /// Creates a provider
    ///
    /// # Arguments
    /// * `client` - Identity service client
    /// * `oauth` - Consent flow settings; provider sign-in is disabled
    ///   without a client id
    /// * `refresh_margin` - How long before expiry tokens are refreshed
    /// * `store` - Where the identity is kept between runs; `None` disables
    ///   silent restore
    pub fn new(
        client: IdentityClient,
        oauth: &OAuthConfig,
        refresh_margin: Duration,
        store: Option<Arc<dyn IdentityStore>>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(ProviderInner {
                client,
                consent: ConsentConfig::from_config(oauth).map(ConsentFlow::new),
                store,
                provider_id: oauth.provider_id.clone(),
                redirect_uri: oauth.redirect_uri.clone(),
                refresh_margin: chrono::Duration::from_std(refresh_margin)
                    .unwrap_or_else(|_| chrono::Duration::minutes(5)),
                events,
                active: Mutex::new(None),
                refresher: Mutex::new(None),
            }),
        }
    }

    /// Creates a provider from the full configuration
    ///
    /// `store` is ignored when `session.persist_identity` is off.
    pub fn from_config(
        config: &Config,
        store: Option<Arc<dyn IdentityStore>>,
    ) -> Result<Self, CredentialError> {
        let client = IdentityClient::new(
            &config.identity,
            Duration::from_secs(config.backend.timeout_secs),
        )?;
        Ok(Self::new(
            client,
            &config.oauth,
            Duration::from_secs(config.session.refresh_margin_secs),
            store.filter(|_| config.session.persist_identity),
        ))
    }

    /// The active identity, if any
    pub async fn current(&self) -> Option<Identity> {
        self.inner
            .active
            .lock()
            .await
            .as_ref()
            .map(|active| active.identity.clone())
    }
}

impl ProviderInner {
    fn emit(&self, event: IdentityEvent) {
        debug!(event = event.kind(), "Publishing identity event");
        // No receivers is fine; nobody is listening yet.
        let _ = self.events.send(event);
    }

    fn persist(&self, active: &ActiveIdentity) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(&active.persisted()) {
                warn!(error = %format!("{e:#}"), "Failed to persist identity");
            }
        }
    }

    fn forget(&self) -> Result<(), CredentialError> {
        match &self.store {
            Some(store) => store
                .clear()
                .map_err(|e| CredentialError::Other(format!("{e:#}"))),
            None => Ok(()),
        }
    }

    async fn stop_refresher(&self) {
        if let Some(token) = self.refresher.lock().await.take() {
            token.cancel();
        }
    }

    /// Makes `session` the active identity and starts refreshing it
    async fn activate(self: &Arc<Self>, session: IdentitySession) -> Identity {
        let active = ActiveIdentity {
            identity: session.identity,
            refresh_token: session.refresh_token,
        };
        let identity = active.identity.clone();
        {
            let mut guard = self.active.lock().await;
            self.persist(&active);
            *guard = Some(active);
        }
        self.start_refresher().await;
        info!(email = %identity.email, "Identity active");
        identity
    }

    async fn start_refresher(self: &Arc<Self>) {
        let token = CancellationToken::new();
        if let Some(previous) = self.refresher.lock().await.replace(token.clone()) {
            previous.cancel();
        }

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let (subject, delay) = match inner.next_refresh().await {
                    Some(next) => next,
                    None => break,
                };
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }

                match inner.refresh_now().await {
                    Ok(identity) => inner.emit(IdentityEvent::TokenRefreshed(identity)),
                    Err(CredentialError::InvalidToken(reason)) => {
                        if token.is_cancelled() {
                            debug!(reason = %reason, "Refresh rejected after refresher was stopped");
                            break;
                        }
                        if inner.end_identity(&subject).await {
                            warn!(reason = %reason, "Refresh token rejected, signing out");
                            inner.emit(IdentityEvent::SignedOut);
                        } else {
                            debug!(reason = %reason, "Refresh rejected for an identity no longer active");
                        }
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "Background token refresh failed, will retry");
                        tokio::select! {
                            _ = token.cancelled() => break,
                            _ = tokio::time::sleep(REFRESH_RETRY_DELAY) => {}
                        }
                    }
                }
            }
            debug!("Token refresher stopped");
        });
    }

    /// The active subject and how long until its token is due for refresh
    async fn next_refresh(&self) -> Option<(SubjectId, Duration)> {
        let guard = self.active.lock().await;
        let identity = &guard.as_ref()?.identity;
        let due = identity.token.expires_at - self.refresh_margin - Utc::now();
        Some((
            identity.subject_id.clone(),
            due.to_std().unwrap_or(Duration::ZERO).max(MIN_REFRESH_DELAY),
        ))
    }

    /// Drops the active identity and its persisted copy if `subject` is
    /// still the one active
    ///
    /// Returns false when another identity took its place.
    async fn end_identity(&self, subject: &SubjectId) -> bool {
        let mut guard = self.active.lock().await;
        if !guard
            .as_ref()
            .is_some_and(|active| &active.identity.subject_id == subject)
        {
            return false;
        }
        *guard = None;
        if let Err(e) = self.forget() {
            warn!(error = %e, "Failed to clear persisted identity");
        }
        true
    }

    /// Refreshes the active identity's token and persists the result
    async fn refresh_now(&self) -> Result<Identity, CredentialError> {
        let refresh_token = self
            .active
            .lock()
            .await
            .as_ref()
            .map(|active| active.refresh_token.clone())
            .ok_or_else(|| CredentialError::InvalidToken("no active identity".to_string()))?;

        let refreshed = self.client.refresh(&refresh_token).await?;

        let snapshot = {
            let mut guard = self.active.lock().await;
            let active = guard
                .as_mut()
                .filter(|active| active.identity.subject_id == refreshed.subject_id)
                .ok_or_else(|| {
                    CredentialError::InvalidToken("identity changed during refresh".to_string())
                })?;
            active.identity.token = refreshed.token;
            active.refresh_token = refreshed.refresh_token;
            let snapshot = active.clone();
            self.persist(&snapshot);
            snapshot
        };

        debug!(email = %snapshot.identity.email, "Identity token refreshed");
        Ok(snapshot.identity)
    }
}

#[async_trait::async_trait]
impl ICredentialProvider for IdentityProvider {
    async fn create_identity(
        &self,
        email: &Email,
        password: &str,
    ) -> Result<Identity, CredentialError> {
        let session = self.inner.client.sign_up(email, password).await?;
        Ok(self.inner.activate(session).await)
    }

    async fn update_profile(
        &self,
        identity: &Identity,
        profile: &NewProfile,
    ) -> Result<Identity, CredentialError> {
        let update = self
            .inner
            .client
            .update_profile(&identity.token.value, profile)
            .await?;

        let mut updated = identity.clone();
        updated.display_name = update
            .display_name
            .or_else(|| Some(profile.display_name.clone()))
            .filter(|name| !name.is_empty());
        if let Some(token) = update.token {
            updated.token = token;
        }

        let mut guard = self.inner.active.lock().await;
        if let Some(active) = guard
            .as_mut()
            .filter(|active| active.identity.subject_id == identity.subject_id)
        {
            active.identity = updated.clone();
            if let Some(refresh_token) = update.refresh_token {
                active.refresh_token = refresh_token;
            }
            self.inner.persist(active);
        }
        Ok(updated)
    }

    async fn authenticate(
        &self,
        email: &Email,
        password: &str,
    ) -> Result<Identity, CredentialError> {
        let session = self.inner.client.sign_in_with_password(email, password).await?;
        let identity = self.inner.activate(session).await;
        self.inner.emit(IdentityEvent::SignedIn(identity.clone()));
        Ok(identity)
    }

    async fn authenticate_via_provider(&self) -> Result<Identity, CredentialError> {
        let consent = self.inner.consent.as_ref().ok_or_else(|| {
            CredentialError::Other("provider sign-in needs oauth.client_id".to_string())
        })?;
        let access_token = consent.login().await?;
        let session = self
            .inner
            .client
            .sign_in_with_idp(&self.inner.provider_id, &access_token, &self.inner.redirect_uri)
            .await?;
        let identity = self.inner.activate(session).await;
        self.inner.emit(IdentityEvent::SignedIn(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), CredentialError> {
        self.inner.stop_refresher().await;
        let (previous, forgotten) = {
            let mut guard = self.inner.active.lock().await;
            (guard.take(), self.inner.forget())
        };
        if let Some(previous) = previous {
            info!(email = %previous.identity.email, "Identity signed out");
        }
        self.inner.emit(IdentityEvent::SignedOut);
        forgotten
    }

    async fn get_token(&self, identity: &Identity) -> Result<IdentityToken, CredentialError> {
        let current = self
            .inner
            .active
            .lock()
            .await
            .as_ref()
            .filter(|active| active.identity.subject_id == identity.subject_id)
            .map(|active| active.identity.token.clone());

        match current {
            Some(token) if !token.expires_within(self.inner.refresh_margin) => Ok(token),
            Some(_) => Ok(self.inner.refresh_now().await?.token),
            None if !identity.token.is_expired() => Ok(identity.token.clone()),
            None => Err(CredentialError::InvalidToken(
                "token expired and identity is no longer active".to_string(),
            )),
        }
    }

    async fn restore(&self) -> Result<Option<Identity>, CredentialError> {
        let store = match &self.inner.store {
            Some(store) => store,
            None => return Ok(None),
        };
        let persisted = match store.load() {
            Ok(Some(persisted)) => persisted,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Could not read persisted identity");
                return Ok(None);
            }
        };

        let refreshed = match self.inner.client.refresh(&persisted.refresh_token).await {
            Ok(refreshed) => refreshed,
            Err(CredentialError::InvalidToken(reason)) => {
                info!(reason = %reason, "Persisted identity is no longer valid");
                self.inner.forget()?;
                return Err(CredentialError::InvalidToken(reason));
            }
            Err(e) => return Err(e),
        };

        let identity = self
            .inner
            .activate(IdentitySession {
                identity: Identity {
                    subject_id: refreshed.subject_id,
                    email: persisted.email,
                    display_name: persisted.display_name,
                    token: refreshed.token,
                },
                refresh_token: refreshed.refresh_token,
                photo_url: None,
            })
            .await;
        self.inner.emit(IdentityEvent::Restored(identity.clone()));
        Ok(Some(identity))
    }

    fn subscribe(&self) -> broadcast::Receiver<IdentityEvent> {
        self.inner.events.subscribe()
    }
}
