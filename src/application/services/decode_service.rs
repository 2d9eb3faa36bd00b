//! Decode pipeline: schedules decode tasks against a shared buffer cache.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, error, info};

use super::listeners::OrderedListener;
use super::ordered_aggregator::{ContiguousFifoAggregator, OnFirstExpected};
use crate::domain::entities::{DecodeOptions, PoolableBuffer};
use crate::domain::errors::AggregatorError;
use crate::domain::ports::{CacheStats, DecodeListener, ImageDecoderPort, RequestKey};
use crate::infrastructure::cache::{BlockingImageCache, CacheConfig};
use crate::infrastructure::decode::{DecodeHandle, DecodeTask, ImageCrateDecoder};

/// Configuration for the decode pipeline.
#[derive(Debug, Clone)]
pub struct DecodePipelineConfig {
    /// Buffer cache sizing.
    pub cache: CacheConfig,
    /// Maximum decodes running at once.
    pub max_concurrent_decodes: usize,
    /// Start with the buffer pool in blocking mode.
    pub blocking: bool,
    /// Longest a decode waits for a pooled buffer in blocking mode before
    /// allocating. `None` waits until a buffer is offered or blocking is
    /// turned off.
    pub poll_timeout: Option<Duration>,
}

/// Default bound on a blocking pool wait.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(250);

impl Default for DecodePipelineConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            max_concurrent_decodes: 4,
            blocking: false,
            poll_timeout: Some(DEFAULT_POLL_TIMEOUT),
        }
    }
}

/// Schedules decodes on the blocking thread pool, sharing one buffer cache
/// and one completion aggregator between them.
pub struct DecodePipeline<K: RequestKey> {
    cache: Arc<BlockingImageCache<K>>,
    decoder: Arc<dyn ImageDecoderPort>,
    aggregator: Arc<ContiguousFifoAggregator<K>>,
    semaphore: Arc<Semaphore>,
    config: DecodePipelineConfig,
}

impl<K: RequestKey> std::fmt::Debug for DecodePipeline<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodePipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<K: RequestKey> DecodePipeline<K> {
    /// Creates a pipeline around `decoder`.
    #[must_use]
    pub fn new(config: DecodePipelineConfig, decoder: Arc<dyn ImageDecoderPort>) -> Self {
        let cache = Arc::new(BlockingImageCache::new(config.cache));
        cache.set_blocking(config.blocking);
        let permits = config.max_concurrent_decodes.max(1);
        info!(
            max_concurrent_decodes = permits,
            target_size = config.cache.target_size,
            "Decode pipeline ready"
        );
        Self {
            cache,
            decoder,
            aggregator: Arc::new(ContiguousFifoAggregator::new()),
            semaphore: Arc::new(Semaphore::new(permits)),
            config,
        }
    }

    /// Creates a pipeline using the `image` crate decoder.
    #[must_use]
    pub fn with_defaults(config: DecodePipelineConfig) -> Self {
        Self::new(config, Arc::new(ImageCrateDecoder::new()))
    }

    /// Schedules a decode of `key`. The listener receives the lifecycle
    /// notifications from a worker thread.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn request_decode(
        &self,
        key: K,
        options: DecodeOptions,
        listener: Arc<dyn DecodeListener<K>>,
    ) -> DecodeHandle {
        let mut task = DecodeTask::new(
            key,
            options,
            self.cache.clone(),
            self.decoder.clone(),
            listener,
        );
        if let Some(timeout) = self.config.poll_timeout {
            task = task.with_poll_timeout(timeout);
        }
        let handle = task.handle();
        let semaphore = self.semaphore.clone();
        debug!(key = %task.key(), id = %handle.id(), "Scheduling decode");

        tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                error!("Decode semaphore closed");
                return;
            };
            if let Err(e) = tokio::task::spawn_blocking(move || task.run()).await {
                error!(error = %e, "Decode task panicked");
            }
        });

        handle
    }

    /// Expects `key` in the aggregator and schedules its decode so the
    /// listener's terminal notifications arrive in request order.
    ///
    /// # Errors
    /// Returns [`AggregatorError::BlankKey`] if the key has no identity.
    pub fn request_decode_ordered(
        &self,
        key: K,
        options: DecodeOptions,
        listener: Arc<dyn DecodeListener<K>>,
    ) -> Result<DecodeHandle, AggregatorError> {
        self.aggregator.expect(key.clone(), None)?;
        let ordered = Arc::new(OrderedListener::new(listener, self.aggregator.clone()));
        Ok(self.request_decode(key, options, ordered))
    }

    /// Requests cancellation of a scheduled decode.
    pub fn cancel(&self, handle: &DecodeHandle) {
        debug!(id = %handle.id(), "Cancelling decode");
        handle.cancel();
    }

    /// Looks up a cached buffer. A hit carries a new reference for the caller;
    /// a negative hit returns the null buffer.
    pub fn cache_get(&self, key: &K) -> Option<Arc<PoolableBuffer>> {
        self.cache.get(key, true)
    }

    /// Drops every cached, pooled and negative entry. Buffers still referenced
    /// by consumers stay valid.
    pub fn cache_clear(&self) {
        self.cache.clear();
    }

    /// Switches the buffer pool's blocking mode.
    pub fn set_blocking(&self, blocking: bool) {
        self.cache.set_blocking(blocking);
    }

    /// See [`ContiguousFifoAggregator::expect`].
    ///
    /// # Errors
    /// Returns [`AggregatorError::BlankKey`] if the key has no identity.
    pub fn aggregator_expect(
        &self,
        key: K,
        on_first: Option<OnFirstExpected<K>>,
    ) -> Result<(), AggregatorError> {
        self.aggregator.expect(key, on_first)
    }

    /// See [`ContiguousFifoAggregator::execute`].
    pub fn aggregator_execute(&self, key: K, task: impl FnOnce() + Send + 'static) {
        self.aggregator.execute(key, task);
    }

    /// See [`ContiguousFifoAggregator::forget`].
    pub fn aggregator_forget(&self, key: &K) {
        self.aggregator.forget(key);
    }

    /// The shared buffer cache.
    #[must_use]
    pub const fn cache(&self) -> &Arc<BlockingImageCache<K>> {
        &self.cache
    }

    /// The shared completion aggregator.
    #[must_use]
    pub const fn aggregator(&self) -> &Arc<ContiguousFifoAggregator<K>> {
        &self.aggregator
    }

    /// Cache statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
