//! Item cache port (driven/secondary port)
//!
//! The item cache holds the last fetched copy of each item and of each list
//! query. It is the single invalidation point the recovery workflow uses
//! after a successful claim.
//!
//! ## Semantics
//!
//! - A miss fetches through the gateway; a hit returns the cached copy
//!   without I/O.
//! - There is no TTL. A copy becomes stale only through
//!   [`IItemCache::invalidate_item`], and is replaced only by a fetch.
//!   [`IItemCache::invalidate_lists`] and [`IItemCache::remove_item`]
//!   follow item posts, edits and deletions.
//! - Every cached copy remembers the query that produced it
//!   ([`QuerySource`]).

use serde::Serialize;
use tokio::sync::watch;

use crate::domain::{Item, ItemId};
use crate::ports::session_gateway::GatewayError;

/// A list query the cache can hold results for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListQuery {
    /// Every item, newest first
    All,
    /// The `n` newest items
    Latest(usize),
}

impl ListQuery {
    /// Applies the query limit to an already sorted list
    pub fn limit(&self) -> Option<usize> {
        match self {
            ListQuery::All => None,
            ListQuery::Latest(n) => Some(*n),
        }
    }
}

impl std::fmt::Display for ListQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListQuery::All => write!(f, "all"),
            ListQuery::Latest(n) => write!(f, "latest({n})"),
        }
    }
}

/// Query that produced a cached copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuerySource {
    /// `GET /items/{id}`
    Single,
    /// Membership of a list query result
    List(ListQuery),
}

/// A cached copy as seen by readers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedCopy {
    /// The item as last fetched
    pub item: Item,
    /// Query that produced it
    pub source: QuerySource,
    /// Whether the copy has been invalidated since it was fetched
    pub stale: bool,
}

/// Port trait for the per-item cache
#[async_trait::async_trait]
pub trait IItemCache: Send + Sync {
    /// Returns the cached item, fetching on a miss
    ///
    /// A stale entry is refetched rather than served.
    async fn get_item(&self, id: &ItemId) -> Result<Item, GatewayError>;

    /// Fetches the item and replaces the cached copy
    async fn refresh_item(&self, id: &ItemId) -> Result<Item, GatewayError>;

    /// Returns the cached list, fetching on a miss or when stale
    async fn list_items(&self, query: ListQuery) -> Result<Vec<Item>, GatewayError>;

    /// Fetches the list and replaces the cached result and its items
    async fn refresh_list(&self, query: ListQuery) -> Result<Vec<Item>, GatewayError>;

    /// Returns the cached copy without any I/O
    fn peek(&self, id: &ItemId) -> Option<CachedCopy>;

    /// Marks the item, and every list containing it, as stale
    fn invalidate_item(&self, id: &ItemId);

    /// Marks every cached list result as stale, leaving items alone
    fn invalidate_lists(&self);

    /// Drops one item and marks every list containing it as stale
    ///
    /// Watchers of the item observe `None`.
    fn remove_item(&self, id: &ItemId);

    /// Drops everything and discards fetches already in flight
    fn clear(&self);

    /// Observes the cached copy of one item
    fn watch_item(&self, id: &ItemId) -> watch::Receiver<Option<Item>>;
}
