//! Session bridge use case
//!
//! Maps identity events and explicit sign-in calls onto backend session
//! exchanges, and publishes the single authoritative [`Session`].
//!
//! ## Sync protocol
//!
//! Every sync attempt (explicit sign-in, sign-up, restore, or an identity
//! event from the credential provider) is numbered from a monotonically
//! increasing counter. An attempt:
//!
//! 1. marks the session `Authenticating` (only if no later attempt has been
//!    applied yet),
//! 2. obtains a fresh identity token,
//! 3. exchanges it via `session-login`; the returned profile is canonical,
//! 4. applies `Authenticated(user)` or a failure state, but only if its
//!    number is greater than the last applied one.
//!
//! Sign-out consumes a number too, so a sync that resolves after a
//! sign-out is discarded. All state changes go through
//! `watch::Sender::send_if_modified`, so subscribers never see a
//! half-updated session and identical consecutive states are not
//! re-published.
//!
//! Attempts run in spawned tasks: a caller that stops awaiting does not
//! cancel the exchange, and its result is still subject to the ordering
//! rule above.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::{Email, NewProfile, Session, UserProfile};
use crate::error::{ClientError, IdentityCreationReason};
use crate::ports::{
    CredentialError, GatewayError, ICredentialProvider, ISessionGateway, Identity, IdentityEvent,
};

/// Minimum password length accepted at sign-up
pub const MIN_PASSWORD_LEN: usize = 6;

/// Checks a sign-up password against the client-side policy
///
/// # Errors
///
/// Returns every violated rule joined into one message.
pub fn check_password_policy(password: &str) -> Result<(), IdentityCreationReason> {
    let mut problems = Vec::new();
    if password.chars().count() < MIN_PASSWORD_LEN {
        problems.push(format!("must be at least {MIN_PASSWORD_LEN} characters"));
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        problems.push("must contain an uppercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        problems.push("must contain a lowercase letter".to_string());
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(IdentityCreationReason::WeakCredential(problems.join(", ")))
    }
}

/// What a sign-out managed to do
///
/// The session is always `Unauthenticated` afterwards; the errors only say
/// which remote call failed.
#[derive(Debug, Default)]
pub struct SignOutReport {
    /// Backend logout failure, if any
    pub backend_error: Option<GatewayError>,
    /// Identity sign-out failure, if any
    pub identity_error: Option<CredentialError>,
}

impl SignOutReport {
    /// Returns true if both remote calls succeeded
    pub fn is_clean(&self) -> bool {
        self.backend_error.is_none() && self.identity_error.is_none()
    }
}

/// Why a sync attempt was started; used in log fields
#[derive(Debug, Clone, Copy)]
enum SyncTrigger {
    SignIn,
    SignUp,
    Provider,
    Restore,
    Event(&'static str),
}

impl SyncTrigger {
    fn as_str(&self) -> &'static str {
        match self {
            SyncTrigger::SignIn => "sign_in",
            SyncTrigger::SignUp => "sign_up",
            SyncTrigger::Provider => "provider",
            SyncTrigger::Restore => "restore",
            SyncTrigger::Event(kind) => *kind,
        }
    }
}

struct BridgeInner {
    credentials: Arc<dyn ICredentialProvider>,
    gateway: Arc<dyn ISessionGateway>,
    state: watch::Sender<Session>,
    attempts: AtomicU64,
    last_applied: AtomicU64,
}

/// Use case owning the process-wide [`Session`]
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct SessionBridge {
    inner: Arc<BridgeInner>,
}

impl SessionBridge {
    /// Creates a bridge in the `Unauthenticated` state
    ///
    /// # Arguments
    ///
    /// * `credentials` - External identity service
    /// * `gateway` - Backend session endpoints
    pub fn new(
        credentials: Arc<dyn ICredentialProvider>,
        gateway: Arc<dyn ISessionGateway>,
    ) -> Self {
        let (state, _) = watch::channel(Session::unauthenticated());
        Self {
            inner: Arc::new(BridgeInner {
                credentials,
                gateway,
                state,
                attempts: AtomicU64::new(0),
                last_applied: AtomicU64::new(0),
            }),
        }
    }

    // ========================================================================
    // Explicit operations
    // ========================================================================

    /// Creates an identity, pushes the profile to it, then syncs
    ///
    /// The password policy and email syntax are checked before any network
    /// call. The display name is forwarded to the backend session exchange.
    ///
    /// # Errors
    ///
    /// `IdentityCreation` with the identity service's reason, or
    /// `BackendSync` if the session could not be minted.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        profile: NewProfile,
    ) -> Result<UserProfile, ClientError> {
        let email = Email::new(email)
            .map_err(|e| IdentityCreationReason::InvalidEmail(e.to_string()))?;
        check_password_policy(password)?;

        let identity = self
            .inner
            .credentials
            .create_identity(&email, password)
            .await
            .map_err(identity_creation_error)?;
        info!(email = %email, subject = %identity.subject_id, "Identity created");

        // A profile update failure leaves a usable identity behind
        let identity = match self
            .inner
            .credentials
            .update_profile(&identity, &profile)
            .await
        {
            Ok(updated) => updated,
            Err(e) => {
                warn!(error = %e, "Failed to push profile to identity, continuing");
                identity
            }
        };

        self.sync(identity, Some(profile.display_name), SyncTrigger::SignUp)
            .await
    }

    /// Authenticates with email and password, then syncs
    ///
    /// An authentication failure leaves the current session untouched.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<UserProfile, ClientError> {
        let email = Email::new(email).map_err(|e| ClientError::Authentication(e.to_string()))?;

        let identity = self
            .inner
            .credentials
            .authenticate(&email, password)
            .await
            .map_err(authentication_error)?;

        self.sync(identity, None, SyncTrigger::SignIn).await
    }

    /// Authenticates through the provider consent flow, then syncs
    ///
    /// # Errors
    ///
    /// `UserCancelled` if the user declined; the existing session is kept.
    pub async fn sign_in_with_external_provider(&self) -> Result<UserProfile, ClientError> {
        let identity = self
            .inner
            .credentials
            .authenticate_via_provider()
            .await
            .map_err(authentication_error)?;

        self.sync(identity, None, SyncTrigger::Provider).await
    }

    /// Restores a persisted identity and syncs it
    ///
    /// Returns `Ok(None)` if nothing was persisted.
    pub async fn restore(&self) -> Result<Option<UserProfile>, ClientError> {
        let identity = match self.inner.credentials.restore().await {
            Ok(Some(identity)) => identity,
            Ok(None) => {
                debug!("No persisted identity to restore");
                return Ok(None);
            }
            Err(CredentialError::InvalidToken(reason)) => {
                info!(reason = %reason, "Persisted identity is no longer valid");
                return Ok(None);
            }
            Err(e) => return Err(ClientError::Authentication(e.to_string())),
        };

        self.sync(identity, None, SyncTrigger::Restore)
            .await
            .map(Some)
    }

    /// Ends the identity and backend sessions
    ///
    /// The session becomes `Unauthenticated` before any remote call, and
    /// stays so whatever the calls return. Both calls are always attempted.
    pub async fn sign_out(&self) -> SignOutReport {
        let attempt = self.inner.next_attempt();
        self.inner.apply(attempt, Session::unauthenticated());
        info!(attempt, "Signed out locally");

        let mut report = SignOutReport::default();

        if let Err(e) = self.inner.gateway.logout().await {
            warn!(error = %e, "Backend logout failed");
            report.backend_error = Some(e);
        }
        if let Err(e) = self.inner.credentials.sign_out().await {
            warn!(error = %e, "Identity sign-out failed");
            report.identity_error = Some(e);
        }

        report
    }

    // ========================================================================
    // Observation
    // ========================================================================

    /// Snapshot of the current session
    pub fn current_session(&self) -> Session {
        self.inner.state.borrow().clone()
    }

    /// Watch receiver over the session
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.inner.state.subscribe()
    }

    /// Calls `listener` after every session change
    ///
    /// The listener is not called for the state current at subscription
    /// time, and never twice in a row with the same session. Dropping the
    /// returned handle unsubscribes.
    pub fn on_session_change<F>(&self, listener: F) -> SessionSubscription
    where
        F: Fn(&Session) + Send + Sync + 'static,
    {
        let mut rx = self.inner.state.subscribe();
        let task = tokio::spawn(async move {
            let mut last = rx.borrow_and_update().clone();
            while rx.changed().await.is_ok() {
                let current = rx.borrow_and_update().clone();
                if current != last {
                    listener(&current);
                    last = current;
                }
            }
        });
        SessionSubscription { task }
    }

    /// Waits until no sync attempt is marking the session `Authenticating`
    pub async fn settled(&self) -> Session {
        let mut rx = self.inner.state.subscribe();
        let settled = match rx.wait_for(|session| !session.status().is_pending()).await {
            Ok(session) => session.clone(),
            Err(_) => self.current_session(),
        };
        settled
    }

    // ========================================================================
    // Identity event pump
    // ========================================================================

    /// Starts reacting to identity events from the credential provider
    ///
    /// Every event carrying an identity triggers a sync; `SignedOut` resets
    /// the session. The pump stops when the handle is shut down or dropped.
    pub fn start(&self) -> BridgeHandle {
        let cancel = CancellationToken::new();
        let mut events = self.inner.credentials.subscribe();
        let bridge = self.clone();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            info!("Session bridge started");
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    event = events.recv() => {
                        match event {
                            Ok(event) => bridge.handle_event(event),
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                warn!(skipped, "Identity events lagged");
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }
            }
            info!("Session bridge stopped");
        });

        BridgeHandle {
            cancel,
            task: Some(task),
        }
    }

    fn handle_event(&self, event: IdentityEvent) {
        let kind = event.kind();
        debug!(event = kind, "Identity event received");

        match event {
            IdentityEvent::SignedIn(identity)
            | IdentityEvent::TokenRefreshed(identity)
            | IdentityEvent::Restored(identity) => {
                let bridge = self.clone();
                // Nobody awaits event-driven syncs; failures are already
                // reflected in the session state and logged
                tokio::spawn(async move {
                    let name = identity.display_name.clone();
                    if let Err(e) = bridge.sync(identity, name, SyncTrigger::Event(kind)).await {
                        warn!(event = kind, error = %e, "Event-driven sync failed");
                    }
                });
            }
            IdentityEvent::SignedOut => {
                let attempt = self.inner.next_attempt();
                self.inner.apply(attempt, Session::unauthenticated());
            }
        }
    }

    // ========================================================================
    // Sync
    // ========================================================================

    async fn sync(
        &self,
        identity: Identity,
        name: Option<String>,
        trigger: SyncTrigger,
    ) -> Result<UserProfile, ClientError> {
        let attempt = self.inner.next_attempt();
        self.inner.mark_authenticating(attempt);
        debug!(attempt, trigger = trigger.as_str(), subject = %identity.subject_id, "Sync started");

        let subject = identity.subject_id.clone();
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move { inner.run_sync(attempt, identity, name).await });

        let outcome = task
            .await
            .map_err(|e| ClientError::BackendSync(format!("sync task failed: {e}")))?;

        match outcome {
            SyncOutcome::Applied(result) => result,
            SyncOutcome::Superseded(result) => {
                debug!(attempt, "Sync result discarded, a later attempt was applied");
                // Only a winning attempt for the same account counts as success
                let current = self.current_session();
                match (current.user(), result) {
                    (Some(user), _) if user.subject_id == subject => Ok(user.clone()),
                    (_, Err(e)) => Err(e),
                    (_, Ok(_)) => Err(ClientError::BackendSync(
                        "superseded by a later session change".to_string(),
                    )),
                }
            }
        }
    }
}

enum SyncOutcome {
    Applied(Result<UserProfile, ClientError>),
    Superseded(Result<UserProfile, ClientError>),
}

impl BridgeInner {
    fn next_attempt(&self) -> u64 {
        self.attempts.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Marks the session `Authenticating` unless a later attempt already
    /// applied its result
    fn mark_authenticating(&self, attempt: u64) {
        self.state.send_if_modified(|current| {
            if attempt <= self.last_applied.load(Ordering::SeqCst) {
                return false;
            }
            if current.status().is_pending() {
                return false;
            }
            *current = Session::authenticating();
            true
        });
    }

    /// Applies `next` if `attempt` is newer than the last applied attempt
    ///
    /// Returns false if the attempt was superseded.
    fn apply(&self, attempt: u64, next: Session) -> bool {
        let mut applied = false;
        self.state.send_if_modified(|current| {
            // The watch lock serialises this closure with every other send
            if attempt <= self.last_applied.load(Ordering::SeqCst) {
                return false;
            }
            self.last_applied.store(attempt, Ordering::SeqCst);
            applied = true;
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        applied
    }

    async fn run_sync(&self, attempt: u64, identity: Identity, name: Option<String>) -> SyncOutcome {
        let (next, result) = match self.exchange(&identity, name.as_deref()).await {
            Ok(user) => {
                if user.email != identity.email {
                    warn!(
                        identity_email = %identity.email,
                        backend_email = %user.email,
                        "Backend profile email differs from identity; using backend profile"
                    );
                }
                (Session::authenticated(user.clone()), Ok(user))
            }
            Err(SyncFailure::Fatal(reason)) => {
                warn!(attempt, reason = %reason, "Identity token rejected, session reset");
                (Session::unauthenticated(), Err(ClientError::SessionExpired))
            }
            Err(SyncFailure::Failed(reason)) => {
                warn!(attempt, reason = %reason, "Backend sync failed");
                (Session::sync_failed(), Err(ClientError::BackendSync(reason)))
            }
        };

        if self.apply(attempt, next) {
            if let Ok(user) = &result {
                info!(attempt, email = %user.email, role = %user.role, "Session established");
            }
            SyncOutcome::Applied(result)
        } else {
            SyncOutcome::Superseded(result)
        }
    }

    async fn exchange(
        &self,
        identity: &Identity,
        name: Option<&str>,
    ) -> Result<UserProfile, SyncFailure> {
        let token = self
            .credentials
            .get_token(identity)
            .await
            .map_err(|e| match e {
                CredentialError::InvalidToken(reason) => SyncFailure::Fatal(reason),
                other => SyncFailure::Failed(other.to_string()),
            })?;

        self.gateway
            .session_login(&token, name)
            .await
            .map_err(|e| match e {
                GatewayError::Unauthorized(reason) => SyncFailure::Fatal(reason),
                other => SyncFailure::Failed(other.to_string()),
            })
    }
}

enum SyncFailure {
    /// The token itself is bad; the identity must sign in again
    Fatal(String),
    /// Anything else; the caller may retry
    Failed(String),
}

fn identity_creation_error(err: CredentialError) -> ClientError {
    let reason = match err {
        CredentialError::EmailInUse => IdentityCreationReason::EmailInUse,
        CredentialError::WeakCredential(r) => IdentityCreationReason::WeakCredential(r),
        CredentialError::InvalidEmail(r) => IdentityCreationReason::InvalidEmail(r),
        other => IdentityCreationReason::Other(other.to_string()),
    };
    ClientError::IdentityCreation(reason)
}

fn authentication_error(err: CredentialError) -> ClientError {
    match err {
        CredentialError::UserCancelled => ClientError::UserCancelled,
        other => ClientError::Authentication(other.to_string()),
    }
}

// ============================================================================
// Handles
// ============================================================================

/// Handle to the running identity event pump
pub struct BridgeHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl BridgeHandle {
    /// Stops the pump and waits for it to finish
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Session bridge task ended abnormally");
            }
        }
    }
}

impl Drop for BridgeHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Listener registration returned by [`SessionBridge::on_session_change`]
pub struct SessionSubscription {
    task: JoinHandle<()>,
}

impl Drop for SessionSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}
