//! Pixel buffer cache with blocking pool acquisition and negative results.

use std::fmt::Debug;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::unrefed_cache::UnrefedPool;
use crate::domain::entities::PoolableBuffer;
use crate::domain::errors::PoolError;
use crate::domain::ports::{CacheStats, Poolable, PooledCache};

/// Default summed size of unreferenced buffers kept before scavenging (16 MB).
pub const DEFAULT_TARGET_SIZE: usize = 16 * 1024 * 1024;

/// Default capacity of the non-poolable side cache.
pub const DEFAULT_NON_POOLED_CAPACITY: usize = 32;

/// Default capacity of the negative cache.
pub const DEFAULT_NEGATIVE_CAPACITY: usize = 64;

/// Sizing of a [`BlockingImageCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Summed size of unreferenced buffers kept before scavenging.
    pub target_size: usize,
    /// Capacity of the non-poolable side cache.
    pub non_pooled_capacity: usize,
    /// Capacity of the negative cache.
    pub negative_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            target_size: DEFAULT_TARGET_SIZE,
            non_pooled_capacity: DEFAULT_NON_POOLED_CAPACITY,
            negative_capacity: DEFAULT_NEGATIVE_CAPACITY,
        }
    }
}

type Buffer = Arc<PoolableBuffer>;

struct State<K: Hash + Eq> {
    pool: UnrefedPool<K, Buffer>,
    negative: LruCache<K, ()>,
    blocking: bool,
}

/// Buffer cache that can make [`poll`](Self::poll) wait for a buffer to be
/// offered, and remembers keys whose decode produced nothing.
///
/// Blocking lets a decode worker that is about to allocate wait for a buffer
/// the consumer is about to give back, such as during fast scrolling.
pub struct BlockingImageCache<K: Hash + Eq> {
    state: Mutex<State<K>>,
    available: Condvar,
}

impl<K> BlockingImageCache<K>
where
    K: Hash + Eq + Clone + Debug,
{
    /// Creates an empty, non-blocking cache.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        let negative_cap = NonZeroUsize::new(config.negative_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Mutex::new(State {
                pool: UnrefedPool::new(
                    config.target_size,
                    config.non_pooled_capacity,
                    Box::new(|buffer: &Buffer| buffer.size_bytes()),
                ),
                negative: LruCache::new(negative_cap),
                blocking: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Switches blocking mode. Turning it off wakes every waiting poller.
    pub fn set_blocking(&self, blocking: bool) {
        let mut state = self.state.lock();
        state.blocking = blocking;
        debug!(blocking, "Pool blocking mode changed");
        if !blocking {
            self.available.notify_all();
        }
    }

    /// Returns true if polling waits for buffers.
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        self.state.lock().blocking
    }

    /// Looks up `key`. A negative entry yields the null buffer.
    pub fn get(&self, key: &K, increment_ref: bool) -> Option<Buffer> {
        let mut state = self.state.lock();
        if state.negative.get(key).is_some() {
            trace!(key = ?key, "Negative cache hit");
            return Some(PoolableBuffer::null());
        }
        state.pool.get(key, increment_ref)
    }

    /// Stores a decode result. `None` or the null buffer records that `key`
    /// decodes to nothing.
    pub fn put_result(&self, key: K, result: Option<Buffer>) -> Option<Buffer> {
        let mut state = self.state.lock();
        match result.filter(|buffer| !buffer.is_null()) {
            Some(buffer) => {
                state.negative.pop(&key);
                state.pool.put(key, buffer)
            }
            None => {
                let previous = state.pool.remove(&key);
                debug!(key = ?key, "Recording negative decode result");
                state.negative.put(key, ());
                previous
            }
        }
    }

    /// Returns a buffer to the pool and wakes one waiting poller.
    ///
    /// # Errors
    /// Returns [`PoolError`] if the buffer is referenced or not reusable.
    pub fn offer(&self, buffer: Buffer) -> Result<(), PoolError> {
        let mut state = self.state.lock();
        state.pool.offer(buffer)?;
        self.available.notify_one();
        Ok(())
    }

    /// Takes a buffer for reuse. In blocking mode waits until one is
    /// available or blocking is turned off.
    pub fn poll(&self) -> Option<Buffer> {
        let mut state = self.state.lock();
        loop {
            if let Some(buffer) = state.pool.poll() {
                return Some(buffer);
            }
            if !state.blocking {
                return None;
            }
            trace!("Waiting for a pooled buffer");
            self.available.wait(&mut state);
        }
    }

    /// Like [`Self::poll`] but gives up after `timeout`.
    pub fn poll_timeout(&self, timeout: Duration) -> Option<Buffer> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(buffer) = state.pool.poll() {
                return Some(buffer);
            }
            if !state.blocking {
                return None;
            }
            if self.available.wait_until(&mut state, deadline).timed_out() {
                return state.pool.poll();
            }
        }
    }

    /// Removes `key` from every map, including the negative cache.
    pub fn remove(&self, key: &K) -> Option<Buffer> {
        let mut state = self.state.lock();
        state.negative.pop(key);
        state.pool.remove(key)
    }

    /// Drops all cached, pooled, and negative entries.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.pool.clear();
        state.negative.clear();
        debug!("Cleared image cache");
    }

    /// Number of cached buffers, excluding negative entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().pool.len()
    }

    /// Returns true if no buffers are cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of keys recorded as decoding to nothing.
    #[must_use]
    pub fn negative_len(&self) -> usize {
        self.state.lock().negative.len()
    }

    /// Returns cache statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            negative: state.negative.len(),
            ..state.pool.stats()
        }
    }
}

impl<K> Default for BlockingImageCache<K>
where
    K: Hash + Eq + Clone + Debug,
{
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl<K> PooledCache<K, Buffer> for BlockingImageCache<K>
where
    K: Hash + Eq + Clone + Debug + Send,
{
    fn get(&self, key: &K, increment_ref: bool) -> Option<Buffer> {
        Self::get(self, key, increment_ref)
    }

    fn put(&self, key: K, value: Buffer) -> Option<Buffer> {
        self.put_result(key, Some(value))
    }

    fn offer(&self, value: Buffer) -> Result<(), PoolError> {
        Self::offer(self, value)
    }

    fn poll(&self) -> Option<Buffer> {
        Self::poll(self)
    }

    fn remove(&self, key: &K) -> Option<Buffer> {
        Self::remove(self, key)
    }

    fn clear(&self) {
        Self::clear(self);
    }

    fn len(&self) -> usize {
        Self::len(self)
    }

    fn stats(&self) -> CacheStats {
        Self::stats(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Dimensions;
    use std::thread;

    fn cache() -> BlockingImageCache<&'static str> {
        BlockingImageCache::new(CacheConfig {
            target_size: 1000,
            non_pooled_capacity: 4,
            negative_capacity: 2,
        })
    }

    fn buffer() -> Buffer {
        PoolableBuffer::allocate(Dimensions::new(10, 10))
    }

    #[test]
    fn test_negative_result_returns_null_buffer() {
        let cache = cache();
        cache.put_result("broken", None);

        let hit = cache.get(&"broken", true).unwrap();
        assert!(hit.is_null());
        assert_eq!(cache.negative_len(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_null_buffer_put_is_negative() {
        let cache = cache();
        PooledCache::put(&cache, "broken", PoolableBuffer::null());
        assert!(cache.get(&"broken", false).unwrap().is_null());
    }

    #[test]
    fn test_real_result_replaces_negative_entry() {
        let cache = cache();
        cache.put_result("k", None);
        let b = buffer();
        cache.put_result("k", Some(b.clone()));

        assert_eq!(cache.negative_len(), 0);
        assert!(Arc::ptr_eq(&cache.get(&"k", false).unwrap(), &b));

        cache.put_result("k", None);
        assert!(cache.is_empty());
        assert!(cache.get(&"k", false).unwrap().is_null());
    }

    #[test]
    fn test_negative_cache_is_bounded() {
        let cache = cache();
        cache.put_result("a", None);
        cache.put_result("b", None);
        cache.put_result("c", None);
        assert!(cache.get(&"a", false).is_none());
        assert_eq!(cache.negative_len(), 2);
    }

    #[test]
    fn test_non_blocking_poll_returns_none() {
        let cache = cache();
        assert!(!cache.is_blocking());
        assert!(cache.poll().is_none());
    }

    #[test]
    fn test_blocking_poll_receives_offered_buffer() {
        let cache = Arc::new(cache());
        cache.set_blocking(true);

        let waiter = {
            let cache = cache.clone();
            thread::spawn(move || cache.poll())
        };
        thread::sleep(Duration::from_millis(20));

        let b = buffer();
        cache.offer(b.clone()).unwrap();

        let received = waiter.join().unwrap().unwrap();
        assert!(Arc::ptr_eq(&received, &b));
    }

    #[test]
    fn test_disabling_blocking_wakes_all_waiters() {
        let cache = Arc::new(cache());
        cache.set_blocking(true);

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let cache = cache.clone();
                thread::spawn(move || cache.poll())
            })
            .collect();
        thread::sleep(Duration::from_millis(20));

        cache.set_blocking(false);

        for waiter in waiters {
            assert!(waiter.join().unwrap().is_none());
        }
    }

    #[test]
    fn test_poll_timeout_gives_up() {
        let cache = cache();
        cache.set_blocking(true);
        let started = Instant::now();
        assert!(cache.poll_timeout(Duration::from_millis(30)).is_none());
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_clear_drops_negative_entries() {
        let cache = cache();
        cache.put_result("a", None);
        cache.put_result("b", Some(buffer()));
        cache.clear();
        assert!(cache.get(&"a", false).is_none());
        assert!(cache.get(&"b", false).is_none());
        assert_eq!(cache.stats().negative, 0);
    }
}
