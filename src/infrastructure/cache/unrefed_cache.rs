//! Cache whose unreferenced entries are scavenged to feed a pool.
//!
//! Only unreferenced entries count toward the target size. Nothing is evicted
//! proactively: an entry leaves the cache only when [`UnrefedPool::poll`]
//! needs a value and the unreferenced entries exceed the target.

use std::collections::VecDeque;
use std::fmt::Debug;
use std::hash::Hash;
use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::domain::errors::PoolError;
use crate::domain::ports::{CacheStats, Poolable, PooledCache, Sizer};

/// Unsynchronized pool and cache maps. Callers provide the locking.
pub struct UnrefedPool<K: Hash + Eq, V> {
    /// Poolable entries, oldest insertion last. Reads never promote.
    cache: LruCache<K, V>,
    /// Entries that cannot be pooled, in true LRU order.
    non_pooled: LruCache<K, V>,
    /// Values explicitly returned for direct reuse.
    pool: VecDeque<V>,
    target_size: usize,
    sizer: Sizer<V>,
    hits: u64,
    misses: u64,
}

impl<K, V> UnrefedPool<K, V>
where
    K: Hash + Eq + Clone + Debug,
    V: Poolable,
{
    /// Creates an empty pool.
    ///
    /// `target_size` bounds the summed size of unreferenced poolable entries
    /// before [`Self::poll`] starts scavenging them, `non_pooled_capacity`
    /// bounds the side cache, and `sizer` measures a value.
    #[must_use]
    pub fn new(target_size: usize, non_pooled_capacity: usize, sizer: Sizer<V>) -> Self {
        let cap = NonZeroUsize::new(non_pooled_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::unbounded(),
            non_pooled: LruCache::new(cap),
            pool: VecDeque::new(),
            target_size,
            sizer,
            hits: 0,
            misses: 0,
        }
    }

    /// Looks up the poolable cache, then the side cache.
    pub fn get(&mut self, key: &K, increment_ref: bool) -> Option<V> {
        let found = match self.cache.peek(key) {
            Some(value) => Some(value.clone()),
            None => self.non_pooled.get(key).cloned(),
        };

        if let Some(value) = &found {
            self.hits += 1;
            if increment_ref {
                value.acquire();
            }
            trace!(key = ?key, "Pool cache hit");
        } else {
            self.misses += 1;
            trace!(key = ?key, "Pool cache miss");
        }
        found
    }

    /// Stores `value`, routing it by reusability. Replacing a poolable entry
    /// with another poolable value keeps its insertion position. The null
    /// sentinel is rejected.
    pub fn put(&mut self, key: K, value: V) -> Option<V> {
        if value.is_null() {
            warn!(key = ?key, "Refusing to cache the null buffer");
            return None;
        }

        let previous_side = self.non_pooled.pop(&key);

        if value.is_reusable() {
            if let Some(slot) = self.cache.peek_mut(&key) {
                debug!(key = ?key, "Replacing poolable entry in place");
                return Some(std::mem::replace(slot, value));
            }
            debug!(key = ?key, "Caching poolable entry");
            self.cache.put(key, value);
            return previous_side;
        }

        let previous_pooled = self.cache.pop(&key);
        debug!(key = ?key, "Caching non-poolable entry");
        if let Some((evicted, _)) = self.non_pooled.push(key, value) {
            trace!(key = ?evicted, "Side cache evicted entry");
        }
        previous_pooled.or(previous_side)
    }

    /// Returns an unreferenced, reusable value to the pool queue.
    ///
    /// # Errors
    /// Returns [`PoolError`] if the value is referenced or not reusable.
    pub fn offer(&mut self, value: V) -> Result<(), PoolError> {
        let ref_count = value.ref_count();
        if ref_count != 0 {
            return Err(PoolError::OfferReferenced { ref_count });
        }
        if !value.is_reusable() {
            return Err(PoolError::OfferNotReusable);
        }
        self.pool.push_back(value);
        trace!(pooled = self.pool.len(), "Value offered to pool");
        Ok(())
    }

    /// Takes a value for reuse.
    ///
    /// Drains the pool queue first. Otherwise walks the cache oldest-first
    /// over unreferenced, reusable entries, summing their sizes; once the sum
    /// exceeds the target, the eldest of them is evicted and returned.
    pub fn poll(&mut self) -> Option<V> {
        if let Some(value) = self.pool.pop_front() {
            return Some(value);
        }

        let mut unref_size = 0usize;
        let mut eldest: Option<K> = None;
        for (key, value) in self.cache.iter().rev() {
            if value.ref_count() > 0 || !value.is_reusable() {
                continue;
            }
            if eldest.is_none() {
                eldest = Some(key.clone());
            }
            unref_size += (self.sizer)(value);
            if unref_size > self.target_size {
                break;
            }
        }

        if unref_size <= self.target_size {
            return None;
        }

        let key = eldest?;
        let value = self.cache.pop(&key)?;
        debug!(key = ?key, unref_size, "Scavenged cache entry for reuse");
        Some(value)
    }

    /// Removes `key` from both caches.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let pooled = self.cache.pop(key);
        let side = self.non_pooled.pop(key);
        pooled.or(side)
    }

    /// Returns true if `key` is cached.
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.cache.contains(key) || self.non_pooled.contains(key)
    }

    /// Drops every cached and pooled value. Values still referenced elsewhere
    /// stay alive through their other owners.
    pub fn clear(&mut self) {
        self.cache.clear();
        self.non_pooled.clear();
        self.pool.clear();
    }

    /// Number of cached entries across both caches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len() + self.non_pooled.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Summed size of unreferenced poolable entries.
    #[must_use]
    pub fn unreferenced_bytes(&self) -> usize {
        self.cache
            .iter()
            .filter(|(_, value)| value.ref_count() == 0)
            .map(|(_, value)| (self.sizer)(value))
            .sum()
    }

    /// Returns cache statistics.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CacheStats {
        let total = self.hits + self.misses;
        let hit_rate = if total > 0 {
            (self.hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            hit_rate,
            cached: self.cache.len(),
            non_pooled: self.non_pooled.len(),
            pooled: self.pool.len(),
            negative: 0,
            unreferenced_bytes: self.unreferenced_bytes(),
        }
    }
}

/// Thread-safe [`UnrefedPool`] behind a single mutex.
pub struct UnrefedPooledCache<K: Hash + Eq, V> {
    inner: Mutex<UnrefedPool<K, V>>,
}

impl<K, V> UnrefedPooledCache<K, V>
where
    K: Hash + Eq + Clone + Debug,
    V: Poolable,
{
    /// Creates an empty cache. See [`UnrefedPool::new`].
    #[must_use]
    pub fn new(target_size: usize, non_pooled_capacity: usize, sizer: Sizer<V>) -> Self {
        Self {
            inner: Mutex::new(UnrefedPool::new(target_size, non_pooled_capacity, sizer)),
        }
    }
}

impl<K, V> PooledCache<K, V> for UnrefedPooledCache<K, V>
where
    K: Hash + Eq + Clone + Debug + Send,
    V: Poolable,
{
    fn get(&self, key: &K, increment_ref: bool) -> Option<V> {
        self.inner.lock().get(key, increment_ref)
    }

    fn put(&self, key: K, value: V) -> Option<V> {
        self.inner.lock().put(key, value)
    }

    fn offer(&self, value: V) -> Result<(), PoolError> {
        self.inner.lock().offer(value)
    }

    fn poll(&self) -> Option<V> {
        self.inner.lock().poll()
    }

    fn remove(&self, key: &K) -> Option<V> {
        self.inner.lock().remove(key)
    }

    fn clear(&self) {
        self.inner.lock().clear();
        debug!("Cleared pooled cache");
    }

    fn len(&self) -> usize {
        self.inner.lock().len()
    }

    fn stats(&self) -> CacheStats {
        self.inner.lock().stats()
    }
}
