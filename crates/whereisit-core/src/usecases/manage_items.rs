//! Item posting use case
//!
//! Posts, edits and deletes the session user's items and lists them. Every
//! accepted change is reflected in the item cache: a post stales every
//! list, an edit stales the item and every list, and a deletion drops the
//! item. Rejected changes leave the cache alone.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::{Item, ItemDraft, ItemId, UserProfile};
use crate::error::{ClientError, ValidationRule};
use crate::ports::{GatewayError, IItemCache, ISessionGateway};
use crate::usecases::recover_item::classify_read_error;
use crate::usecases::session_bridge::SessionBridge;

/// Result of an accepted post or edit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemChange {
    /// Id of the posted or edited item
    pub id: ItemId,
    /// The item as refetched, or `None` if the refetch failed
    pub item: Option<Item>,
}

/// Use case for the session user's own items
pub struct ItemManager {
    session: SessionBridge,
    gateway: Arc<dyn ISessionGateway>,
    cache: Arc<dyn IItemCache>,
}

impl ItemManager {
    /// Creates a new ItemManager
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

    /// Posts a lost or found item
    ///
    /// # Errors
    ///
    /// - `Validation` if signed out or a draft field is blank
    /// - `SessionExpired`, `Rejected` or `Transient` from the backend
    pub async fn post_item(&self, draft: ItemDraft) -> Result<ItemChange, ClientError> {
        self.require_user()?;
        let draft = draft.normalized().map_err(ClientError::Validation)?;

        let gateway = Arc::clone(&self.gateway);
        let cache = Arc::clone(&self.cache);
        let task = tokio::spawn(async move {
            let id = gateway
                .create_item(&draft)
                .await
                .map_err(|e| classify_write_error(e, None))?;
            info!(item = %id, post_type = %draft.post_type, "Item posted");
            cache.invalidate_lists();
            Ok(ItemChange {
                item: refetch(cache.as_ref(), &id).await,
                id,
            })
        });

        task.await
            .map_err(|e| ClientError::Transient(format!("post task failed: {e}")))?
    }

    /// Replaces the written fields of an item the session user posted
    ///
    /// Admins may edit any item.
    pub async fn update_item(
        &self,
        id: &ItemId,
        draft: ItemDraft,
    ) -> Result<ItemChange, ClientError> {
        self.editable(id).await?;
        let draft = draft.normalized().map_err(ClientError::Validation)?;

        let gateway = Arc::clone(&self.gateway);
        let cache = Arc::clone(&self.cache);
        let id = id.clone();
        let task = tokio::spawn(async move {
            gateway
                .update_item(&id, &draft)
                .await
                .map_err(|e| classify_write_error(e, Some(&id)))?;
            info!(item = %id, "Item updated");
            // The edit may move the item within date-sorted lists
            cache.invalidate_item(&id);
            cache.invalidate_lists();
            Ok(ItemChange {
                item: refetch(cache.as_ref(), &id).await,
                id,
            })
        });

        task.await
            .map_err(|e| ClientError::Transient(format!("update task failed: {e}")))?
    }

    /// Deletes an item the session user posted
    ///
    /// Admins may delete any item. An item the backend no longer knows is
    /// dropped from the cache too.
    pub async fn delete_item(&self, id: &ItemId) -> Result<(), ClientError> {
        self.editable(id).await?;

        let gateway = Arc::clone(&self.gateway);
        let cache = Arc::clone(&self.cache);
        let id = id.clone();
        let task = tokio::spawn(async move {
            match gateway.delete_item(&id).await {
                Ok(()) => {
                    info!(item = %id, "Item deleted");
                    cache.remove_item(&id);
                    Ok(())
                }
                Err(GatewayError::NotFound(reason)) => {
                    debug!(item = %id, reason = %reason, "Item already gone");
                    cache.remove_item(&id);
                    Err(ClientError::ItemNotFound(id))
                }
                Err(e) => Err(classify_write_error(e, Some(&id))),
            }
        });

        task.await
            .map_err(|e| ClientError::Transient(format!("delete task failed: {e}")))?
    }

    /// Lists the items the session user posted, newest first
    pub async fn my_items(&self) -> Result<Vec<Item>, ClientError> {
        self.require_user()?;
        let mut items = self
            .gateway
            .list_my_items()
            .await
            .map_err(classify_read_error)?;
        items.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(items)
    }

    /// Starts a draft from the current copy of an item the session user
    /// may edit
    pub async fn draft_for(&self, id: &ItemId) -> Result<ItemDraft, ClientError> {
        let item = self.editable(id).await?;
        Ok(ItemDraft::from_item(&item, Utc::now()))
    }

    fn require_user(&self) -> Result<UserProfile, ClientError> {
        self.session
            .current_session()
            .user()
            .cloned()
            .ok_or(ClientError::Validation(ValidationRule::NotAuthenticated))
    }

    /// Reads the item and checks the session user may change it
    async fn editable(&self, id: &ItemId) -> Result<Item, ClientError> {
        let user = self.require_user()?;
        let item = self.cache.get_item(id).await.map_err(|e| match e {
            GatewayError::NotFound(_) => ClientError::ItemNotFound(id.clone()),
            other => classify_read_error(other),
        })?;

        if !item.is_owned_by(&user.email) && !user.is_admin() {
            debug!(item = %id, "Change refused, item belongs to someone else");
            return Err(ClientError::Validation(ValidationRule::NotItemOwner));
        }
        Ok(item)
    }
}

/// Refetches a changed item; a failure leaves the entry stale
async fn refetch(cache: &dyn IItemCache, id: &ItemId) -> Option<Item> {
    match cache.refresh_item(id).await {
        Ok(item) => Some(item),
        Err(e) => {
            warn!(item = %id, error = %e, "Refetch after change failed");
            cache.invalidate_item(id);
            None
        }
    }
}

/// Classifies a failed post, edit or deletion
pub fn classify_write_error(err: GatewayError, id: Option<&ItemId>) -> ClientError {
    match (err, id) {
        (GatewayError::Unauthorized(_), _) => ClientError::SessionExpired,
        (GatewayError::NotFound(_), Some(id)) => ClientError::ItemNotFound(id.clone()),
        (
            GatewayError::Forbidden(reason)
            | GatewayError::Conflict(reason)
            | GatewayError::NotFound(reason)
            | GatewayError::Rejected { reason, .. },
            _,
        ) => ClientError::Rejected(reason),
        (other, _) => ClientError::Transient(other.to_string()),
    }
}
