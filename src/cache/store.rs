//! In-memory cache store.
//!
//! Byte-bounded LRU with per-entry expiry and a tag index for bulk
//! invalidation. Nothing is persisted: a restart starts from a cold cache.

use std::{
    collections::{HashMap, HashSet},
    sync::RwLock,
    time::Instant,
};

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use metrics::counter;

use crate::application::ports::{CacheStore, CacheStoreError};

use super::config::CacheConfig;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

pub const METRIC_CACHE_EVICT: &str = "magicbox_cache_evict_total";
pub const METRIC_CACHE_EXPIRED: &str = "magicbox_cache_expired_total";
pub const METRIC_CACHE_INVALIDATED: &str = "magicbox_cache_invalidated_total";

struct Slot {
    value: Bytes,
    tag: String,
    /// `None` when the configured TTL overflows `Instant`.
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

fn cost(key: &str, value: &Bytes) -> usize {
    key.len() + value.len()
}

struct Inner {
    entries: LruCache<String, Slot>,
    tags: HashMap<String, HashSet<String>>,
    used_bytes: usize,
}

impl Inner {
    fn remove(&mut self, key: &str) -> Option<Slot> {
        let slot = self.entries.pop(key)?;
        self.forget(key, &slot);
        Some(slot)
    }

    /// Undo the bookkeeping for a slot already taken out of `entries`.
    fn forget(&mut self, key: &str, slot: &Slot) {
        self.used_bytes -= cost(key, &slot.value);
        if let Some(keys) = self.tags.get_mut(&slot.tag) {
            keys.remove(key);
            if keys.is_empty() {
                self.tags.remove(&slot.tag);
            }
        }
    }
}

pub struct MemoryCacheStore {
    inner: RwLock<Inner>,
    config: CacheConfig,
}

impl MemoryCacheStore {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: LruCache::unbounded(),
                tags: HashMap::new(),
                used_bytes: 0,
            }),
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        rw_read(&self.inner, SOURCE, "len").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn used_bytes(&self) -> usize {
        rw_read(&self.inner, SOURCE, "used_bytes").used_bytes
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = rw_write(&self.inner, SOURCE, "purge_expired");

        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, slot)| slot.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            inner.remove(key);
        }

        if !expired.is_empty() {
            counter!(METRIC_CACHE_EXPIRED).increment(expired.len() as u64);
        }
        expired.len()
    }

    fn get_entry(&self, key: &str) -> Option<Bytes> {
        let now = Instant::now();
        let mut inner = rw_write(&self.inner, SOURCE, "get");

        match inner.entries.get(key) {
            Some(slot) if !slot.is_expired(now) => return Some(slot.value.clone()),
            Some(_) => {}
            None => return None,
        }

        inner.remove(key);
        counter!(METRIC_CACHE_EXPIRED).increment(1);
        None
    }

    fn set_entry(&self, key: &str, value: Bytes, tag: &str) -> Result<(), CacheStoreError> {
        let size = cost(key, &value);
        if size > self.config.capacity_bytes {
            return Err(CacheStoreError::EntryTooLarge {
                size,
                capacity: self.config.capacity_bytes,
            });
        }

        let expires_at = Instant::now().checked_add(self.config.ttl);
        let mut inner = rw_write(&self.inner, SOURCE, "set");

        inner.remove(key);
        while inner.used_bytes + size > self.config.capacity_bytes {
            let Some((evicted_key, evicted)) = inner.entries.pop_lru() else {
                break;
            };
            inner.forget(&evicted_key, &evicted);
            counter!(METRIC_CACHE_EVICT).increment(1);
        }

        inner.used_bytes += size;
        inner
            .tags
            .entry(tag.to_string())
            .or_default()
            .insert(key.to_string());
        inner.entries.put(
            key.to_string(),
            Slot {
                value,
                tag: tag.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    fn invalidate_entries(&self, tag: &str) -> usize {
        let mut inner = rw_write(&self.inner, SOURCE, "invalidate_tag");
        let Some(keys) = inner.tags.remove(tag) else {
            return 0;
        };

        let removed = keys
            .iter()
            .filter(|key| inner.remove(key).is_some())
            .count();
        counter!(METRIC_CACHE_INVALIDATED).increment(removed as u64);
        removed
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheStoreError> {
        Ok(self.get_entry(key))
    }

    async fn set(&self, key: &str, value: Bytes, tag: &str) -> Result<(), CacheStoreError> {
        self.set_entry(key, value, tag)
    }

    async fn invalidate_tag(&self, tag: &str) -> Result<usize, CacheStoreError> {
        Ok(self.invalidate_entries(tag))
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::time::Duration;

    use super::*;

    fn store_with_capacity(capacity_bytes: usize) -> MemoryCacheStore {
        MemoryCacheStore::new(CacheConfig {
            capacity_bytes,
            ..Default::default()
        })
    }

    fn bytes(value: &'static str) -> Bytes {
        Bytes::from_static(value.as_bytes())
    }

    #[tokio::test]
    async fn set_then_get_roundtrip() {
        let store = MemoryCacheStore::new(CacheConfig::default());
        assert!(store.get("/t/a").await.expect("get").is_none());

        store.set("/t/a", bytes("value"), "t").await.expect("set");
        assert_eq!(store.get("/t/a").await.expect("get"), Some(bytes("value")));
        assert_eq!(store.used_bytes(), "/t/a".len() + "value".len());
    }

    #[tokio::test]
    async fn overwrite_replaces_value_and_accounting() {
        let store = MemoryCacheStore::new(CacheConfig::default());
        store.set("/t/a", bytes("long value"), "t").await.expect("set");
        store.set("/t/a", bytes("v"), "t").await.expect("set");

        assert_eq!(store.len(), 1);
        assert_eq!(store.used_bytes(), "/t/a".len() + 1);
        assert_eq!(store.get("/t/a").await.expect("get"), Some(bytes("v")));
    }

    #[tokio::test]
    async fn evicts_least_recently_used_when_over_capacity() {
        // Each entry costs 4 (key) + 4 (value) bytes.
        let store = store_with_capacity(16);
        store.set("/t/a", bytes("aaaa"), "t").await.expect("set");
        store.set("/t/b", bytes("bbbb"), "t").await.expect("set");

        // Touch `a` so `b` becomes the eviction candidate.
        assert!(store.get("/t/a").await.expect("get").is_some());
        store.set("/t/c", bytes("cccc"), "t").await.expect("set");

        assert!(store.get("/t/a").await.expect("get").is_some());
        assert!(store.get("/t/b").await.expect("get").is_none());
        assert!(store.get("/t/c").await.expect("get").is_some());
        assert!(store.used_bytes() <= 16);
    }

    #[tokio::test]
    async fn rejects_entries_larger_than_capacity() {
        let store = store_with_capacity(8);
        let err = store
            .set("/t/big", bytes("0123456789"), "t")
            .await
            .expect_err("too large");
        assert!(matches!(err, CacheStoreError::EntryTooLarge { capacity: 8, .. }));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn expired_entries_read_as_misses() {
        let store = MemoryCacheStore::new(CacheConfig {
            ttl: Duration::ZERO,
            ..Default::default()
        });
        store.set("/t/a", bytes("value"), "t").await.expect("set");

        assert!(store.get("/t/a").await.expect("get").is_none());
        assert!(store.is_empty());
        assert_eq!(store.used_bytes(), 0);
    }

    #[tokio::test]
    async fn purge_drops_only_expired_entries() {
        let store = MemoryCacheStore::new(CacheConfig {
            ttl: Duration::ZERO,
            ..Default::default()
        });
        store.set("/t/a", bytes("a"), "t").await.expect("set");
        store.set("/t/b", bytes("b"), "t").await.expect("set");
        assert_eq!(store.purge_expired(), 2);
        assert_eq!(store.purge_expired(), 0);

        let fresh = MemoryCacheStore::new(CacheConfig::default());
        fresh.set("/t/a", bytes("a"), "t").await.expect("set");
        assert_eq!(fresh.purge_expired(), 0);
        assert_eq!(fresh.len(), 1);
    }

    #[tokio::test]
    async fn invalidate_tag_is_scoped_and_idempotent() {
        let store = MemoryCacheStore::new(CacheConfig::default());
        store.set("/tenantA/x", bytes("a"), "tenantA").await.expect("set");
        store.set("/tenantA/y", bytes("a"), "tenantA").await.expect("set");
        store.set("/tenantB/x", bytes("b"), "tenantB").await.expect("set");

        assert_eq!(store.invalidate_tag("tenantA").await.expect("invalidate"), 2);
        assert_eq!(store.invalidate_tag("tenantA").await.expect("invalidate"), 0);
        assert_eq!(store.invalidate_tag("nobody").await.expect("invalidate"), 0);

        assert!(store.get("/tenantA/x").await.expect("get").is_none());
        assert!(store.get("/tenantB/x").await.expect("get").is_some());
    }

    #[tokio::test]
    async fn evicted_keys_leave_the_tag_index() {
        let store = store_with_capacity(16);
        store.set("/t/a", bytes("aaaa"), "t").await.expect("set");
        store.set("/u/b", bytes("bbbb"), "u").await.expect("set");
        store.set("/u/c", bytes("cccc"), "u").await.expect("set");

        // `/t/a` was evicted, so its tag has nothing left to drop.
        assert_eq!(store.invalidate_tag("t").await.expect("invalidate"), 0);
        assert_eq!(store.invalidate_tag("u").await.expect("invalidate"), 2);
        assert_eq!(store.used_bytes(), 0);
    }

    #[tokio::test]
    async fn store_recovers_from_poisoned_lock() {
        let store = MemoryCacheStore::new(CacheConfig::default());

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = store
                .inner
                .write()
                .expect("inner lock should be acquired");
            panic!("poison cache lock");
        }));

        store.set("/t/a", bytes("a"), "t").await.expect("set");
        assert!(store.get("/t/a").await.expect("get").is_some());
    }
}
