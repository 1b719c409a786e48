//! Item recovery use case
//!
//! Submits a claim against an item and keeps the item cache consistent
//! with the outcome. Preconditions are checked against the cached copy
//! before the recovery endpoint is called; the backend stays the final
//! arbiter and its rejections are classified into typed errors.
//!
//! On success the item and every list containing it are invalidated and the
//! single item is refetched. On failure the cache is not touched, so a
//! retry sees exactly the state the failed call saw.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::{
    ClaimDetails, ClaimEligibility, Item, ItemId, ProfileStats, RecoveryRecord, RecoveryRequest,
};
use crate::error::{ClientError, ValidationRule};
use crate::ports::{GatewayError, IItemCache, ISessionGateway, ListQuery};
use crate::usecases::session_bridge::SessionBridge;

/// Result of an accepted claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveryOutcome {
    /// Record created by the backend
    pub record: RecoveryRecord,
    /// Refetched item, or `None` if the refetch failed and the cached copy
    /// was left stale
    pub item: Option<Item>,
}

/// Use case for claims and claim-related queries
pub struct RecoveryWorkflow {
    session: SessionBridge,
    gateway: Arc<dyn ISessionGateway>,
    cache: Arc<dyn IItemCache>,
}

impl RecoveryWorkflow {
    /// Creates a new RecoveryWorkflow with the required dependencies
    ///
    /// # Arguments
    ///
    /// * `session` - Source of the current session user
    /// * `gateway` - Backend recovery endpoints
    /// * `cache` - Item cache to validate against and invalidate
    pub fn new(
        session: SessionBridge,
        gateway: Arc<dyn ISessionGateway>,
        cache: Arc<dyn IItemCache>,
    ) -> Self {
        Self {
            session,
            gateway,
            cache,
        }
    }

    /// Submits a claim for `item_id`
    ///
    /// This method:
    /// 1. Requires an authenticated session
    /// 2. Reads the item from the cache (fetching it if absent or stale)
    /// 3. Builds a `RecoveryRequest`, which rejects recovered items, the
    ///    poster's own items and blank locations
    /// 4. Submits the request and, on success, invalidates and refetches
    ///
    /// Steps 4 onwards run in a spawned task, so dropping the returned
    /// future does not abandon a submitted claim half way.
    ///
    /// # Errors
    ///
    /// - `Validation` for a failed precondition; nothing was submitted
    /// - `OwnershipConflict` or `AlreadyRecovered` when the backend refuses
    /// - `Transient` for network or server faults
    /// - `SessionExpired`, `ItemNotFound` or `Rejected` otherwise
    pub async fn submit_recovery(
        &self,
        item_id: &ItemId,
        details: ClaimDetails,
    ) -> Result<RecoveryOutcome, ClientError> {
        let requester = self
            .session
            .current_session()
            .user()
            .map(|user| user.subject_id.clone())
            .ok_or(ClientError::Validation(ValidationRule::NotAuthenticated))?;

        let item = self.observed_item(item_id).await?;

        // The session may have changed while the item was being read
        let session = self.session.current_session();
        let user = session
            .user()
            .filter(|user| user.subject_id == requester)
            .ok_or(ClientError::Validation(ValidationRule::NotAuthenticated))?;
        let request = RecoveryRequest::new(&item, user, details).map_err(|rule| {
            debug!(item = %item_id, rule = ?rule, "Claim refused before submission");
            ClientError::Validation(rule)
        })?;

        let gateway = Arc::clone(&self.gateway);
        let cache = Arc::clone(&self.cache);
        let task = tokio::spawn(async move { submit_and_reconcile(gateway, cache, request).await });

        task.await
            .map_err(|e| ClientError::Transient(format!("recovery task failed: {e}")))?
    }

    /// Eligibility of the current session to claim `item`
    pub fn claim_eligibility(&self, item: &Item) -> ClaimEligibility {
        ClaimEligibility::evaluate(item, &self.session.current_session())
    }

    /// Lists the recovery records visible to the session user
    pub async fn recoveries(&self) -> Result<Vec<RecoveryRecord>, ClientError> {
        if !self.session.current_session().is_authenticated() {
            return Err(ClientError::Validation(ValidationRule::NotAuthenticated));
        }
        self.gateway
            .list_recoveries()
            .await
            .map_err(classify_read_error)
    }

    /// Counters for the session user's profile page
    pub async fn profile_stats(&self) -> Result<ProfileStats, ClientError> {
        let session = self.session.current_session();
        let user = session
            .user()
            .ok_or(ClientError::Validation(ValidationRule::NotAuthenticated))?;

        let items = self
            .cache
            .list_items(ListQuery::All)
            .await
            .map_err(classify_read_error)?;
        let recoveries = self
            .gateway
            .list_recoveries()
            .await
            .map_err(classify_read_error)?;

        Ok(ProfileStats::compute(&user.email, &items, &recoveries))
    }

    /// The item as the client currently observes it
    ///
    /// A fresh cached copy is used as-is, and so is any `Recovered` copy
    /// since that status is terminal. An absent or invalidated copy is read
    /// through the cache first.
    async fn observed_item(&self, item_id: &ItemId) -> Result<Item, ClientError> {
        match self.cache.peek(item_id) {
            Some(copy) if !copy.stale || copy.item.is_recovered() => Ok(copy.item),
            _ => self.cache.get_item(item_id).await.map_err(|e| match e {
                GatewayError::NotFound(_) => ClientError::ItemNotFound(item_id.clone()),
                other => classify_read_error(other),
            }),
        }
    }
}

async fn submit_and_reconcile(
    gateway: Arc<dyn ISessionGateway>,
    cache: Arc<dyn IItemCache>,
    request: RecoveryRequest,
) -> Result<RecoveryOutcome, ClientError> {
    let item_id = request.item_id().clone();

    let record = match gateway.recover_item(&request).await {
        Ok(record) => record,
        Err(e) => {
            let err = classify_recovery_error(e, &item_id);
            info!(item = %item_id, error = %err, "Recovery rejected");
            return Err(err);
        }
    };
    info!(item = %item_id, record = %record.id, "Recovery accepted");

    cache.invalidate_item(&item_id);
    let item = match cache.refresh_item(&item_id).await {
        Ok(item) => {
            if !item.is_recovered() {
                warn!(item = %item_id, "Refetched item is not yet marked recovered");
            }
            Some(item)
        }
        Err(e) => {
            warn!(item = %item_id, error = %e, "Refetch after recovery failed, entry left stale");
            None
        }
    };

    Ok(RecoveryOutcome { record, item })
}

const OWNERSHIP_PHRASES: &[&str] = &[
    "your own item",
    "own item",
    "owner of this item",
    "item you posted",
];

const EXISTING_RECOVERY_PHRASES: &[&str] = &[
    "already recovered",
    "already been recovered",
    "already claimed",
];

fn reason_names_ownership(reason: &str) -> bool {
    let reason = reason.to_lowercase();
    OWNERSHIP_PHRASES.iter().any(|phrase| reason.contains(phrase))
}

fn reason_names_existing_recovery(reason: &str) -> bool {
    let reason = reason.to_lowercase();
    EXISTING_RECOVERY_PHRASES.iter().any(|phrase| reason.contains(phrase))
}

/// Classifies a recovery endpoint failure
pub fn classify_recovery_error(err: GatewayError, item_id: &ItemId) -> ClientError {
    match err {
        GatewayError::Forbidden(_) => ClientError::OwnershipConflict,
        GatewayError::Conflict(_) => ClientError::AlreadyRecovered,
        GatewayError::Unauthorized(_) => ClientError::SessionExpired,
        GatewayError::NotFound(_) => ClientError::ItemNotFound(item_id.clone()),
        GatewayError::Rejected { reason, .. } => {
            if reason_names_ownership(&reason) {
                ClientError::OwnershipConflict
            } else if reason_names_existing_recovery(&reason) {
                ClientError::AlreadyRecovered
            } else {
                ClientError::Rejected(reason)
            }
        }
        transient @ (GatewayError::Network(_)
        | GatewayError::Server(_)
        | GatewayError::TooManyRequests { .. }
        | GatewayError::InvalidResponse(_)) => ClientError::Transient(transient.to_string()),
    }
}

/// Classifies a failed read (item or recovery listing)
pub fn classify_read_error(err: GatewayError) -> ClientError {
    match err {
        GatewayError::Unauthorized(_) => ClientError::SessionExpired,
        GatewayError::Forbidden(reason)
        | GatewayError::Conflict(reason)
        | GatewayError::NotFound(reason) => ClientError::Rejected(reason),
        GatewayError::Rejected { reason, .. } => ClientError::Rejected(reason),
        other => ClientError::Transient(other.to_string()),
    }
}
