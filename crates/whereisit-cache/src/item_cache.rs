//! DashMap-backed implementation of `IItemCache`
//!
//! Entries and list results live in separate maps. Every mutation is a
//! single insert made while the entry's shard lock is held, and the
//! generation counter is checked under that same lock, so a fetch that was
//! in flight when [`ItemCache::clear`] ran can never repopulate the cache.
//!
//! Lock order is always `entries` before `watchers`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::watch;
use tracing::{debug, warn};

use whereisit_core::domain::{DomainError, Item, ItemId};
use whereisit_core::ports::{
    CachedCopy, GatewayError, IItemCache, ISessionGateway, ListQuery, QuerySource,
};

use crate::CacheError;

#[derive(Debug, Clone)]
struct CachedItem {
    item: Item,
    source: QuerySource,
    stale: bool,
}

#[derive(Debug, Clone)]
struct CachedList {
    ids: Vec<ItemId>,
    stale: bool,
}

/// Per-item and per-query cache in front of the backend gateway
pub struct ItemCache {
    gateway: Arc<dyn ISessionGateway>,
    entries: DashMap<ItemId, CachedItem>,
    lists: DashMap<ListQuery, CachedList>,
    watchers: DashMap<ItemId, watch::Sender<Option<Item>>>,
    generation: AtomicU64,
}

impl ItemCache {
    /// Creates an empty cache that fetches through `gateway`
    pub fn new(gateway: Arc<dyn ISessionGateway>) -> Self {
        Self {
            gateway,
            entries: DashMap::new(),
            lists: DashMap::new(),
            watchers: DashMap::new(),
            generation: AtomicU64::new(0),
        }
    }

    /// Number of cached items
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no item is cached
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn check_generation(&self, started: u64) -> Result<(), CacheError> {
        let current = self.generation();
        if current != started {
            return Err(CacheError::Superseded { started, current });
        }
        Ok(())
    }

    /// Replaces the cached copy of `fresh`, unless the cache was cleared
    /// since `started` or the copy would reverse a recovery
    fn store(&self, fresh: Item, source: QuerySource, started: u64) -> Result<Item, CacheError> {
        let id = fresh.id.clone();
        let slot = self.entries.entry(id.clone());
        self.check_generation(started)?;

        match slot {
            Entry::Occupied(mut occupied) => {
                let cached = occupied.get_mut();
                if let Err(DomainError::InvalidState { from, to }) =
                    cached.item.check_replacement(&fresh)
                {
                    cached.stale = true;
                    return Err(CacheError::StatusReversal { id, from, to });
                }
                *cached = CachedItem {
                    item: fresh.clone(),
                    source,
                    stale: false,
                };
                self.notify(&id, Some(fresh.clone()));
            }
            Entry::Vacant(vacant) => {
                let _inserted = vacant.insert(CachedItem {
                    item: fresh.clone(),
                    source,
                    stale: false,
                });
                self.notify(&id, Some(fresh.clone()));
            }
        }
        Ok(fresh)
    }

    fn store_list(&self, query: ListQuery, ids: Vec<ItemId>, started: u64) -> Result<(), CacheError> {
        let slot = self.lists.entry(query);
        self.check_generation(started)?;
        slot.insert(CachedList { ids, stale: false });
        Ok(())
    }

    /// Publishes `value` to the item's watchers, dropping the channel once
    /// every receiver is gone
    ///
    /// Callers hold the item's `entries` slot, which keeps a concurrent
    /// [`IItemCache::watch_item`] from subscribing between the count check
    /// and the removal.
    fn notify(&self, id: &ItemId, value: Option<Item>) {
        let unobserved = match self.watchers.get(id) {
            Some(sender) if sender.receiver_count() > 0 => {
                sender.send_if_modified(|current| {
                    if *current == value {
                        return false;
                    }
                    *current = value;
                    true
                });
                false
            }
            Some(_) => true,
            None => false,
        };
        if unobserved {
            self.watchers
                .remove_if(id, |_, sender| sender.receiver_count() == 0);
            debug!(item = %id, "Dropped unobserved item watcher");
        }
    }

    /// Number of items with a live watch channel
    pub fn watcher_count(&self) -> usize {
        self.watchers.len()
    }

    /// Resolves a store result to the item callers should see
    fn resolve(&self, fresh: Item, stored: Result<Item, CacheError>) -> Item {
        match stored {
            Ok(item) => item,
            Err(CacheError::Superseded { started, current }) => {
                debug!(item = %fresh.id, started, current, "Dropping fetch from before cache clear");
                fresh
            }
            Err(err @ CacheError::StatusReversal { .. }) => {
                warn!(item = %fresh.id, error = %err, "Backend reports a reversed recovery, keeping cached copy");
                self.entries
                    .get(&fresh.id)
                    .map(|cached| cached.item.clone())
                    .unwrap_or(fresh)
            }
        }
    }

    /// The cached list result, if it and every member are current
    fn cached_list(&self, query: ListQuery) -> Option<Vec<Item>> {
        let ids = {
            let list = self.lists.get(&query)?;
            if list.stale {
                return None;
            }
            list.ids.clone()
        };

        ids.iter()
            .map(|id| {
                self.entries
                    .get(id)
                    .filter(|cached| !cached.stale)
                    .map(|cached| cached.item.clone())
            })
            .collect()
    }
}

/// Newest first by item date; undated items last, in backend order
fn sort_newest_first(items: &mut [Item]) {
    items.sort_by(|a, b| b.date.cmp(&a.date));
}

#[async_trait::async_trait]
impl IItemCache for ItemCache {
    async fn get_item(&self, id: &ItemId) -> Result<Item, GatewayError> {
        if let Some(cached) = self.entries.get(id) {
            if !cached.stale {
                return Ok(cached.item.clone());
            }
        }
        self.refresh_item(id).await
    }

    async fn refresh_item(&self, id: &ItemId) -> Result<Item, GatewayError> {
        let started = self.generation();
        let fresh = self.gateway.get_item(id).await?;
        debug!(item = %id, status = %fresh.status, "Fetched item");

        let stored = self.store(fresh.clone(), QuerySource::Single, started);
        Ok(self.resolve(fresh, stored))
    }

    async fn list_items(&self, query: ListQuery) -> Result<Vec<Item>, GatewayError> {
        if let Some(items) = self.cached_list(query) {
            return Ok(items);
        }
        self.refresh_list(query).await
    }

    async fn refresh_list(&self, query: ListQuery) -> Result<Vec<Item>, GatewayError> {
        let started = self.generation();
        let mut fetched = self.gateway.list_items().await?;
        sort_newest_first(&mut fetched);
        if let Some(limit) = query.limit() {
            fetched.truncate(limit);
        }
        debug!(query = %query, count = fetched.len(), "Fetched item list");

        let items: Vec<Item> = fetched
            .into_iter()
            .map(|fresh| {
                let stored = self.store(fresh.clone(), QuerySource::List(query), started);
                self.resolve(fresh, stored)
            })
            .collect();

        let ids = items.iter().map(|item| item.id.clone()).collect();
        if let Err(err) = self.store_list(query, ids, started) {
            debug!(query = %query, error = %err, "Dropping list fetch from before cache clear");
        }
        Ok(items)
    }

    fn peek(&self, id: &ItemId) -> Option<CachedCopy> {
        self.entries.get(id).map(|cached| CachedCopy {
            item: cached.item.clone(),
            source: cached.source,
            stale: cached.stale,
        })
    }

    fn invalidate_item(&self, id: &ItemId) {
        if let Some(mut cached) = self.entries.get_mut(id) {
            cached.stale = true;
        }
        for mut list in self.lists.iter_mut() {
            if list.ids.contains(id) {
                list.stale = true;
            }
        }
        debug!(item = %id, "Invalidated item");
    }

    fn invalidate_lists(&self) {
        for mut list in self.lists.iter_mut() {
            list.stale = true;
        }
        debug!("Invalidated item lists");
    }

    fn remove_item(&self, id: &ItemId) {
        if let Entry::Occupied(occupied) = self.entries.entry(id.clone()) {
            self.notify(id, None);
            occupied.remove();
        }
        for mut list in self.lists.iter_mut() {
            if list.ids.contains(id) {
                list.stale = true;
            }
        }
        debug!(item = %id, "Removed item");
    }

    fn clear(&self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.entries.clear();
        self.lists.clear();
        self.watchers.retain(|_, sender| {
            sender.send_if_modified(|current| current.take().is_some());
            sender.receiver_count() > 0
        });
        debug!(generation, "Cleared item cache");
    }

    fn watch_item(&self, id: &ItemId) -> watch::Receiver<Option<Item>> {
        // Holding the entry slot keeps a concurrent store from slipping in
        // between the snapshot and the watcher registration.
        let slot = self.entries.entry(id.clone());
        let snapshot = match &slot {
            Entry::Occupied(occupied) => Some(occupied.get().item.clone()),
            Entry::Vacant(_) => None,
        };
        let receiver = self
            .watchers
            .entry(id.clone())
            .or_insert_with(|| watch::channel(snapshot).0)
            .subscribe();
        drop(slot);
        receiver
    }
}
