//! Caching layer for per-block ledger state
//!
//! Sealed blocks never change, so the balance deltas derived from one can be
//! kept for as long as memory allows. The mempool is never cached.
use crate::blockchain::LedgerState;
use lru::LruCache;
use parking_lot::RwLock;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Generic, thread-safe LRU cache. A capacity of zero disables caching.
pub struct ThreadSafeCache<K, V> {
    cache: Option<Arc<RwLock<LruCache<K, V>>>>,
}

impl<K, V> ThreadSafeCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn new_lru(capacity: usize) -> Self {
        Self {
            cache: NonZeroUsize::new(capacity).map(|cap| Arc::new(RwLock::new(LruCache::new(cap)))),
        }
    }

    /// Get a value from cache. Uses read lock and does not promote the entry.
    pub fn get(&self, key: &K) -> Option<V> {
        self.cache.as_ref()?.read().peek(key).cloned()
    }

    pub fn put(&self, key: K, value: V) {
        if let Some(cache) = &self.cache {
            cache.write().put(key, value);
        }
    }

    /// Returns the cached value or computes, stores and returns a fresh one.
    /// Errors are passed through and nothing is cached for them.
    pub fn get_or_try_insert<E>(&self, key: K, compute: impl FnOnce() -> Result<V, E>) -> Result<V, E> {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let value = compute()?;
        self.put(key, value.clone());
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.cache.as_ref().map_or(0, |cache| cache.read().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> Clone for ThreadSafeCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
        }
    }
}

/// Balance deltas of sealed blocks, keyed by block number.
pub type BlockStateCache = ThreadSafeCache<u64, Arc<LedgerState>>;

impl BlockStateCache {
    pub const DEFAULT_CAPACITY: usize = 256;

    pub fn new(capacity: usize) -> Self {
        Self::new_lru(capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lru_eviction() {
        let cache: ThreadSafeCache<u64, u64> = ThreadSafeCache::new_lru(2);
        cache.put(1, 10);
        cache.put(2, 20);
        cache.put(3, 30);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&3), Some(30));
    }

    #[test]
    fn test_disabled_cache_stores_nothing() {
        let cache: ThreadSafeCache<u64, u64> = ThreadSafeCache::new_lru(0);
        cache.put(1, 10);
        assert!(cache.is_empty());
        assert_eq!(cache.get_or_try_insert::<()>(1, || Ok(11)), Ok(11));
    }

    #[test]
    fn test_get_or_try_insert() {
        let cache: ThreadSafeCache<u64, u64> = ThreadSafeCache::new_lru(4);
        assert_eq!(cache.get_or_try_insert::<()>(7, || Ok(70)), Ok(70));
        assert_eq!(cache.get_or_try_insert::<()>(7, || Ok(99)), Ok(70));
        assert_eq!(cache.get_or_try_insert(8, || Err("boom")), Err("boom"));
        assert_eq!(cache.get(&8), None);
    }

    #[test]
    fn test_block_state_cache_shares_entries() {
        let cache = BlockStateCache::new(BlockStateCache::DEFAULT_CAPACITY);
        let view = cache.clone();
        cache.put(1, Arc::new(LedgerState::new()));
        assert!(view.get(&1).is_some());
        assert_eq!(view.len(), 1);
    }
}
