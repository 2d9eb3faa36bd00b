//! Port definition for pooled caching of reusable values.

use crate::domain::errors::PoolError;

/// Byte size of a cached value, used against the cache's target size.
pub type Sizer<V> = Box<dyn Fn(&V) -> usize + Send + Sync>;

/// A reference-counted handle that a pool can recycle.
pub trait Poolable: Clone + Send + Sync {
    /// Takes a reference and returns the new count.
    fn acquire(&self) -> usize;

    /// Current number of outstanding references.
    fn ref_count(&self) -> usize;

    /// Returns true if the underlying allocation may be handed to another user.
    fn is_reusable(&self) -> bool;

    /// Returns true for the empty-result sentinel.
    fn is_null(&self) -> bool {
        false
    }
}

/// Cache counters and occupancy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Hit rate as a percentage.
    pub hit_rate: f64,
    /// Entries in the poolable cache.
    pub cached: usize,
    /// Entries in the non-poolable side cache.
    pub non_pooled: usize,
    /// Values waiting in the pool queue.
    pub pooled: usize,
    /// Keys in the negative cache.
    pub negative: usize,
    /// Bytes held by unreferenced poolable entries.
    pub unreferenced_bytes: usize,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cache: {} cached, {} non-pooled, {} pooled, {} negative, {} unreferenced bytes, {:.1}% hit rate ({} hits, {} misses)",
            self.cached,
            self.non_pooled,
            self.pooled,
            self.negative,
            self.unreferenced_bytes,
            self.hit_rate,
            self.hits,
            self.misses
        )
    }
}

/// A cache whose unreferenced entries double as a pool of reusable values.
/// Implementations must be thread-safe.
pub trait PooledCache<K, V>: Send + Sync {
    /// Looks up `key`, taking a reference on a hit when `increment_ref` is set.
    fn get(&self, key: &K, increment_ref: bool) -> Option<V>;

    /// Stores `value` under `key` and returns the value it replaced.
    fn put(&self, key: K, value: V) -> Option<V>;

    /// Returns an unreferenced, reusable value to the pool.
    ///
    /// # Errors
    /// Returns [`PoolError`] if the value is referenced or not reusable.
    fn offer(&self, value: V) -> Result<(), PoolError>;

    /// Takes a value for reuse, scavenging the cache if it is full enough.
    fn poll(&self) -> Option<V>;

    /// Removes `key` from every internal map.
    fn remove(&self, key: &K) -> Option<V>;

    /// Drops all cached and pooled values.
    fn clear(&self);

    /// Number of cached entries.
    fn len(&self) -> usize;

    /// Returns true if nothing is cached.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns cache statistics.
    fn stats(&self) -> CacheStats;
}
