//! Pooled buffer caches.

mod blocking_cache;
mod unrefed_cache;

pub use blocking_cache::{
    BlockingImageCache, CacheConfig, DEFAULT_NEGATIVE_CAPACITY, DEFAULT_NON_POOLED_CAPACITY,
    DEFAULT_TARGET_SIZE,
};
pub use unrefed_cache::{UnrefedPool, UnrefedPooledCache};
