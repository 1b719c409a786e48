//! WhereIsIt Cache - In-memory item state
//!
//! Process-wide cache for:
//! - The last fetched copy of each item, keyed by id
//! - List query results (all items, latest N)
//! - Per-item watchers for observers
//!
//! ## Architecture
//!
//! This crate implements the `IItemCache` port from `whereisit-core` on top
//! of `DashMap`. It is a driven (secondary) adapter in the hexagonal
//! architecture: misses and refreshes go through `ISessionGateway`.
//!
//! ## Key Components
//!
//! - [`ItemCache`] - Full `IItemCache` implementation
//! - [`CacheError`] - Reasons a fetched copy was not stored
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use whereisit_cache::ItemCache;
//! use whereisit_core::ports::{IItemCache, ISessionGateway, ListQuery};
//!
//! # async fn example(gateway: Arc<dyn ISessionGateway>) -> anyhow::Result<()> {
//! let cache = ItemCache::new(gateway);
//! let latest = cache.list_items(ListQuery::Latest(6)).await?;
//! # Ok(())
//! # }
//! ```

pub mod item_cache;

pub use item_cache::ItemCache;

use whereisit_core::domain::ItemId;

/// Reasons a fetched copy was kept out of the cache
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// The cache was cleared while the fetch was in flight
    #[error("Fetch superseded: started in generation {started}, cache now at {current}")]
    Superseded {
        /// Generation the fetch started in
        started: u64,
        /// Generation at the time the result arrived
        current: u64,
    },

    /// The fetched copy would move a recovered item back to active
    #[error("Status reversal for item {id}: {from} -> {to}")]
    StatusReversal {
        /// Item whose status went backwards
        id: ItemId,
        /// Cached status
        from: String,
        /// Status in the fetched copy
        to: String,
    },
}
