//! In-process TTL cache backed by DashMap for lock-free concurrent access.
//! Holds read-mostly snapshots (the active loyalty program) so hot paths
//! skip the authoritative store.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

/// Lock-free local cache with a fixed time-to-live per entry.
pub struct LocalCache<V> {
    store: Arc<DashMap<String, CacheEntry<V>>>,
    ttl: Duration,
    max_entries: usize,
}

impl<V: Clone> LocalCache<V> {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            store: Arc::new(DashMap::with_capacity(max_entries.min(1024))),
            ttl,
            max_entries,
        }
    }

    /// Get a value, returns None if expired or missing.
    pub fn get(&self, key: &str) -> Option<V> {
        let entry = self.store.get(key)?;
        if entry.inserted_at.elapsed() > self.ttl {
            drop(entry);
            self.store.remove(key);
            metrics::counter!("cache.local.expired").increment(1);
            return None;
        }
        metrics::counter!("cache.local.hit").increment(1);
        Some(entry.value.clone())
    }

    /// Insert or update a value.
    pub fn put(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        // Over capacity: skip new keys, background eviction makes room
        if self.store.len() >= self.max_entries && !self.store.contains_key(&key) {
            return;
        }
        self.store.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Return the cached value or load, cache and return a fresh one.
    pub fn get_or_try_load<E>(
        &self,
        key: &str,
        load: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        metrics::counter!("cache.local.miss").increment(1);
        let value = load()?;
        self.put(key, value.clone());
        Ok(value)
    }

    pub fn invalidate(&self, key: &str) {
        self.store.remove(key);
    }

    /// Remove expired entries. Call this periodically from a background task.
    pub fn evict_expired(&self) -> usize {
        let before = self.store.len();
        self.store
            .retain(|_, entry| entry.inserted_at.elapsed() <= self.ttl);
        let evicted = before.saturating_sub(self.store.len());
        if evicted > 0 {
            debug!(evicted, remaining = self.store.len(), "Local cache eviction");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get() {
        let cache = LocalCache::new(Duration::from_secs(60), 10);
        cache.put("program", 42u32);
        assert_eq!(cache.get("program"), Some(42));
        assert_eq!(cache.get("other"), None);
    }

    #[test]
    fn test_expired_entries_are_dropped() {
        let cache = LocalCache::new(Duration::ZERO, 10);
        cache.put("program", 1u32);
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(cache.get("program"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_get_or_try_load_only_loads_on_miss() {
        let cache = LocalCache::new(Duration::from_secs(60), 10);
        let mut loads = 0;
        let first: Result<u32, ()> = cache.get_or_try_load("k", || {
            loads += 1;
            Ok(7)
        });
        assert_eq!(first.unwrap(), 7);
        let second: Result<u32, ()> = cache.get_or_try_load("k", || {
            loads += 1;
            Ok(8)
        });
        assert_eq!(second.unwrap(), 7);
        assert_eq!(loads, 1);

        cache.invalidate("k");
        let err: Result<u32, &str> = cache.get_or_try_load("k", || Err("store down"));
        assert!(err.is_err());
    }

    #[test]
    fn test_capacity_skips_new_keys() {
        let cache = LocalCache::new(Duration::from_secs(60), 1);
        cache.put("a", 1u32);
        cache.put("b", 2u32);
        assert_eq!(cache.len(), 1);
        cache.put("a", 3u32);
        assert_eq!(cache.get("a"), Some(3));
    }

    #[test]
    fn test_evict_expired() {
        let cache = LocalCache::new(Duration::ZERO, 10);
        cache.put("a", 1u32);
        cache.put("b", 2u32);
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(cache.evict_expired(), 2);
    }
}
