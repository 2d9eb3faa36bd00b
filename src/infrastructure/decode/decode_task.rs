//! One cancellable decode of a request key into a pooled buffer.

use std::io::{self, Cursor, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use image::RgbaImage;
use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};
use uuid::Uuid;

use super::sampling;
use crate::domain::entities::{DecodeOptions, Dimensions, Orientation, PoolableBuffer};
use crate::domain::errors::{DecodeError, DecodeResult};
use crate::domain::ports::{
    DecodeListener, HandleFactory, ImageDecoderPort, ReadSeek, RequestKey, SourceHandle,
};
use crate::infrastructure::cache::BlockingImageCache;

type Buffer = Arc<PoolableBuffer>;

/// Lifecycle of a decode task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Scheduled but not yet running.
    Pending,
    /// Running on a worker.
    Running,
    /// Finished and published its result.
    Completed,
    /// Stopped without publishing a result.
    Cancelled,
}

/// Caller-side handle for observing and cancelling a decode.
#[derive(Debug, Clone)]
pub struct DecodeHandle {
    id: Uuid,
    cancelled: Arc<AtomicBool>,
    state: Arc<Mutex<TaskState>>,
}

impl DecodeHandle {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            cancelled: Arc::new(AtomicBool::new(false)),
            state: Arc::new(Mutex::new(TaskState::Pending)),
        }
    }

    /// Unique id of the task.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Requests cancellation. The task stops at its next checkpoint.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns true once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TaskState {
        *self.state.lock()
    }

    /// Returns true once the task reached a terminal state.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self.state(), TaskState::Completed | TaskState::Cancelled)
    }
}

/// Reason a decode stopped early.
enum Halt {
    Cancelled,
    Failed(DecodeError),
}

impl From<DecodeError> for Halt {
    fn from(e: DecodeError) -> Self {
        Self::Failed(e)
    }
}

impl From<io::Error> for Halt {
    fn from(e: io::Error) -> Self {
        Self::Failed(DecodeError::Io(e))
    }
}

/// Encoded bytes that can be reopened for each decode step.
enum EncodedSource {
    Factory(Arc<dyn HandleFactory>),
    Buffered(Bytes),
}

impl EncodedSource {
    fn resolve<K: RequestKey>(key: &K) -> io::Result<Self> {
        match key.handle_factory() {
            Ok(Some(factory)) => return Ok(Self::Factory(factory)),
            Ok(None) => {}
            Err(e) => debug!(key = %key, error = %e, "Handle factory unavailable, reading stream"),
        }
        let mut bytes = Vec::new();
        key.open_stream()?.read_to_end(&mut bytes)?;
        trace!(key = %key, len = bytes.len(), "Buffered single-use stream");
        Ok(Self::Buffered(Bytes::from(bytes)))
    }

    fn open(&self) -> io::Result<SourceHandle> {
        match self {
            Self::Factory(factory) => factory.open(),
            Self::Buffered(bytes) => Ok(Box::new(Cursor::new(bytes.clone()))),
        }
    }

    fn with_handle<T>(
        &self,
        f: impl FnOnce(&mut dyn ReadSeek) -> DecodeResult<T>,
    ) -> DecodeResult<T> {
        let mut handle = self.open()?;
        f(&mut *handle)
    }
}

/// Decodes one key into a buffer sized for [`DecodeOptions::dest`].
///
/// Runs synchronously on a worker thread. The listener sees
/// `on_decode_begin` and then exactly one of `on_decode_complete` or
/// `on_decode_cancel`. A completed buffer is already cached under the key
/// and carries one reference owned by the listener.
pub struct DecodeTask<K: RequestKey> {
    key: K,
    options: DecodeOptions,
    cache: Arc<BlockingImageCache<K>>,
    decoder: Arc<dyn ImageDecoderPort>,
    listener: Arc<dyn DecodeListener<K>>,
    poll_timeout: Option<Duration>,
    handle: DecodeHandle,
}

impl<K: RequestKey> DecodeTask<K> {
    /// Creates a pending task.
    pub fn new(
        key: K,
        options: DecodeOptions,
        cache: Arc<BlockingImageCache<K>>,
        decoder: Arc<dyn ImageDecoderPort>,
        listener: Arc<dyn DecodeListener<K>>,
    ) -> Self {
        Self {
            key,
            options,
            cache,
            decoder,
            listener,
            poll_timeout: None,
            handle: DecodeHandle::new(),
        }
    }

    /// Bounds how long a blocking pool poll may wait before the task
    /// allocates a fresh buffer instead.
    #[must_use]
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = Some(timeout);
        self
    }

    /// Returns a handle sharing this task's cancellation flag and state.
    #[must_use]
    pub fn handle(&self) -> DecodeHandle {
        self.handle.clone()
    }

    /// The request key.
    pub const fn key(&self) -> &K {
        &self.key
    }

    /// Runs the decode to a terminal state and returns it.
    pub fn run(self) -> TaskState {
        self.set_state(TaskState::Running);
        self.listener.on_decode_begin(&self.key);

        let mut pooled = None;
        let outcome = self.decode(&mut pooled);

        if let Some(unused) = pooled.take() {
            self.recycle(unused);
        }

        let outcome = if self.handle.is_cancelled() {
            if let Ok(buffer) = outcome {
                self.recycle(buffer);
            }
            Err(Halt::Cancelled)
        } else {
            outcome
        };

        match outcome {
            Ok(buffer) => self.finish_completed(Some(buffer)),
            Err(Halt::Cancelled) => self.finish_cancelled(),
            Err(Halt::Failed(e)) => {
                warn!(key = %self.key, error = %e, "Decode produced no image");
                self.finish_completed(None)
            }
        }
    }

    fn set_state(&self, state: TaskState) {
        *self.handle.state.lock() = state;
    }

    fn checkpoint(&self) -> Result<(), Halt> {
        if self.handle.is_cancelled() {
            trace!(key = %self.key, "Decode cancelled at checkpoint");
            return Err(Halt::Cancelled);
        }
        Ok(())
    }

    fn decode(&self, pooled: &mut Option<Buffer>) -> Result<Buffer, Halt> {
        self.checkpoint()?;
        let source = EncodedSource::resolve(&self.key)?;

        self.checkpoint()?;
        if self.options.reuse_buffers {
            *pooled = match self.poll_timeout {
                Some(timeout) => self.cache.poll_timeout(timeout),
                None => self.cache.poll(),
            };
            trace!(key = %self.key, reused = pooled.is_some(), "Polled buffer pool");
            self.checkpoint()?;
        }

        let orientation = if self.key.has_orientation_metadata() {
            match source.open() {
                Ok(mut handle) => self.decoder.read_orientation(&mut *handle),
                Err(e) => {
                    debug!(key = %self.key, error = %e, "Could not open source for metadata");
                    Orientation::Normal
                }
            }
        } else {
            Orientation::Normal
        };
        self.checkpoint()?;

        let raw = source.with_handle(|handle| self.decoder.decode_bounds(handle))?;
        if raw.is_empty() {
            return Err(DecodeError::InvalidDimensions { size: raw }.into());
        }
        let display = orientation.to_display(raw);

        let sample = sampling::sample_size(display, self.options.dest, self.options.strategy);
        let display_crop = sampling::crop_rect(
            display,
            self.options.dest,
            self.options.horizontal_center,
            self.options.vertical_center,
        );
        let raw_crop = orientation.display_rect_to_raw(display_crop, raw);
        debug!(
            key = %self.key,
            raw = %raw,
            sample,
            crop = ?raw_crop,
            orientation = orientation.degrees(),
            "Decoding region"
        );
        self.checkpoint()?;

        let mut reuse = self.options.reuse_buffers;
        let pixels = match source
            .with_handle(|handle| self.decoder.decode_region(handle, raw_crop, sample))
        {
            Ok(pixels) => pixels,
            Err(e) => {
                debug!(key = %self.key, error = %e, "Region decode failed, decoding whole image");
                reuse = false;
                self.decode_whole(&source, sample)?
            }
        };
        self.checkpoint()?;

        let buffer = self.publishable(pixels, reuse, pooled);
        buffer.set_orientation(orientation);
        Ok(buffer)
    }

    fn decode_whole(&self, source: &EncodedSource, sample: u32) -> Result<RgbaImage, Halt> {
        self.checkpoint()?;
        match source.with_handle(|handle| self.decoder.decode(handle, sample)) {
            Ok(pixels) => Ok(pixels),
            Err(e) if sample > 1 => {
                debug!(key = %self.key, sample, error = %e, "Sampled decode failed, retrying unsampled");
                self.checkpoint()?;
                Ok(source.with_handle(|handle| self.decoder.decode(handle, 1))?)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Places decoded pixels into a buffer, preferring the polled one.
    fn publishable(&self, pixels: RgbaImage, reuse: bool, pooled: &mut Option<Buffer>) -> Buffer {
        if !reuse {
            return PoolableBuffer::from_pixels(pixels, false);
        }

        if let Some(buffer) = pooled.take() {
            match buffer.fill_from(&pixels) {
                Ok(()) => {
                    trace!(key = %self.key, physical = %buffer.physical_size(), "Decoded into pooled buffer");
                    return buffer;
                }
                Err(e) => {
                    debug!(key = %self.key, error = %e, "Pooled buffer too small");
                    *pooled = Some(buffer);
                }
            }
        }

        let decoded = Dimensions::new(pixels.width(), pixels.height());
        let physical = self
            .options
            .buffer_size
            .map_or(decoded, |size| size.max(decoded));
        if physical == decoded {
            return PoolableBuffer::from_pixels(pixels, true);
        }

        let buffer = PoolableBuffer::allocate(physical);
        match buffer.fill_from(&pixels) {
            Ok(()) => buffer,
            Err(_) => PoolableBuffer::from_pixels(pixels, true),
        }
    }

    /// Hands an unpublished buffer back to the pool, or lets it drop.
    fn recycle(&self, buffer: Buffer) {
        if !buffer.is_reusable() || buffer.is_referenced() {
            return;
        }
        if let Err(e) = self.cache.offer(buffer) {
            error!(key = %self.key, error = %e, "Failed to return buffer to pool");
        }
    }

    fn finish_completed(&self, result: Option<Buffer>) -> TaskState {
        if let Some(buffer) = &result {
            buffer.acquire();
        }
        self.cache.put_result(self.key.clone(), result.clone());
        self.set_state(TaskState::Completed);
        debug!(key = %self.key, found = result.is_some(), "Decode complete");
        self.listener.on_decode_complete(&self.key, result);
        TaskState::Completed
    }

    fn finish_cancelled(&self) -> TaskState {
        self.set_state(TaskState::Cancelled);
        debug!(key = %self.key, "Decode cancelled");
        self.listener.on_decode_cancel(&self.key);
        TaskState::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Orientation, Rect, SampleStrategy};
    use crate::domain::ports::mocks::{FakeDecoder, MockKey, Recorded, RecordingListener};
    use crate::infrastructure::cache::CacheConfig;

    struct Harness {
        cache: Arc<BlockingImageCache<MockKey>>,
        decoder: Arc<FakeDecoder>,
        listener: Arc<RecordingListener<MockKey>>,
    }

    impl Harness {
        fn new(decoder: FakeDecoder) -> Self {
            Self {
                cache: Arc::new(BlockingImageCache::new(CacheConfig::default())),
                decoder: Arc::new(decoder),
                listener: Arc::new(RecordingListener::new()),
            }
        }

        fn task(&self, key: MockKey, options: DecodeOptions) -> DecodeTask<MockKey> {
            DecodeTask::new(
                key,
                options,
                self.cache.clone(),
                self.decoder.clone(),
                self.listener.clone(),
            )
        }

        fn completed(&self) -> Option<Buffer> {
            let events = self.listener.take();
            assert_eq!(events.len(), 2, "expected begin and one terminal event");
            assert!(matches!(events[0], Recorded::Begin(_)));
            match &events[1] {
                Recorded::Complete(_, result) => result.clone(),
                other => panic!("expected completion, got {other:?}"),
            }
        }
    }

    fn thumbnail() -> DecodeOptions {
        DecodeOptions::new(100, 100).with_strategy(SampleStrategy::RoundNearest)
    }

    #[test]
    fn test_thumbnail_decode_end_to_end() {
        let harness = Harness::new(FakeDecoder::new(1600, 1200));
        let key = MockKey::new("photo");

        let state = harness.task(key.clone(), thumbnail()).run();

        assert_eq!(state, TaskState::Completed);
        assert_eq!(
            harness.decoder.regions.lock().as_slice(),
            &[(Rect::new(200, 0, 1400, 1200), 16)]
        );
        let buffer = harness.completed().unwrap();
        assert_eq!(buffer.logical_size(), Dimensions::new(75, 75));
        assert_eq!(buffer.ref_count(), 1);
        assert!(buffer.is_reusable());

        let cached = harness.cache.get(&key, false).unwrap();
        assert!(Arc::ptr_eq(&cached, &buffer));
    }

    #[test]
    fn test_handle_tracks_state() {
        let harness = Harness::new(FakeDecoder::new(64, 64));
        let task = harness.task(MockKey::new("a"), thumbnail());
        let handle = task.handle();
        assert_eq!(handle.state(), TaskState::Pending);
        assert!(!handle.is_finished());

        task.run();

        assert_eq!(handle.state(), TaskState::Completed);
        assert!(handle.is_finished());
    }

    #[test]
    fn test_cancel_before_run_skips_decode() {
        let harness = Harness::new(FakeDecoder::new(1600, 1200));
        let key = MockKey::new("photo");
        let task = harness.task(key.clone(), thumbnail());
        task.handle().cancel();

        assert_eq!(task.run(), TaskState::Cancelled);

        let events = harness.listener.take();
        assert!(matches!(events.as_slice(), [Recorded::Begin(_), Recorded::Cancel(_)]));
        assert!(harness.decoder.regions.lock().is_empty());
        assert_eq!(key.open_count(), 0);
        assert!(harness.cache.get(&key, false).is_none());
    }

    #[test]
    fn test_cancel_during_decode_recycles_buffer() {
        let handle_slot: Arc<Mutex<Option<DecodeHandle>>> = Arc::new(Mutex::new(None));
        let slot = handle_slot.clone();
        let decoder = FakeDecoder::new(1600, 1200).on_decode(move || {
            if let Some(handle) = slot.lock().as_ref() {
                handle.cancel();
            }
        });
        let harness = Harness::new(decoder);
        let pooled = PoolableBuffer::allocate(Dimensions::new(128, 128));
        harness.cache.offer(pooled.clone()).unwrap();
        let key = MockKey::new("photo");
        let task = harness.task(key.clone(), thumbnail());
        *handle_slot.lock() = Some(task.handle());

        assert_eq!(task.run(), TaskState::Cancelled);

        assert!(harness.cache.get(&key, false).is_none());
        let recycled = harness.cache.poll().unwrap();
        assert!(Arc::ptr_eq(&recycled, &pooled));
        assert_eq!(recycled.ref_count(), 0);
        assert!(matches!(
            harness.listener.take().as_slice(),
            [Recorded::Begin(_), Recorded::Cancel(_)]
        ));
    }

    #[test]
    fn test_region_failure_falls_back_without_reuse() {
        let harness = Harness::new(FakeDecoder::new(1600, 1200).failing_regions());
        let pooled = PoolableBuffer::allocate(Dimensions::new(200, 200));
        harness.cache.offer(pooled.clone()).unwrap();

        harness.task(MockKey::new("photo"), thumbnail()).run();

        assert_eq!(harness.decoder.full_decodes.lock().as_slice(), &[16]);
        let buffer = harness.completed().unwrap();
        assert_eq!(buffer.logical_size(), Dimensions::new(100, 75));
        assert!(!buffer.is_reusable());
        assert!(!Arc::ptr_eq(&buffer, &pooled));

        let back = harness.cache.poll().unwrap();
        assert!(Arc::ptr_eq(&back, &pooled));
    }

    #[test]
    fn test_sampled_failure_retries_at_full_size() {
        let decoder = FakeDecoder::new(320, 240)
            .failing_regions()
            .failing_sampled_decodes();
        let harness = Harness::new(decoder);

        harness
            .task(MockKey::new("photo"), DecodeOptions::new(40, 40))
            .run();

        assert_eq!(harness.decoder.full_decodes.lock().as_slice(), &[8, 1]);
        let buffer = harness.completed().unwrap();
        assert_eq!(buffer.logical_size(), Dimensions::new(320, 240));
    }

    #[test]
    fn test_undecodable_source_caches_negative_result() {
        let harness = Harness::new(FakeDecoder::new(10, 10).failing_everything());
        let key = MockKey::new("broken");

        assert_eq!(harness.task(key.clone(), thumbnail()).run(), TaskState::Completed);

        assert!(harness.completed().is_none());
        assert!(harness.cache.get(&key, false).unwrap().is_null());
    }

    #[test]
    fn test_exhausted_fallbacks_cache_negative_result() {
        let decoder = FakeDecoder::new(320, 240)
            .failing_regions()
            .failing_full_decodes();
        let harness = Harness::new(decoder);
        let key = MockKey::new("photo");

        harness.task(key.clone(), DecodeOptions::new(40, 40)).run();

        assert_eq!(harness.decoder.full_decodes.lock().as_slice(), &[8, 1]);
        assert!(harness.completed().is_none());
        assert!(harness.cache.get(&key, false).unwrap().is_null());
    }

    #[test]
    fn test_orientation_swaps_display_axes() {
        let decoder = FakeDecoder::new(1200, 1600).with_orientation(Orientation::Rotate90);
        let harness = Harness::new(decoder);
        let key = MockKey::new("portrait").with_orientation();

        harness
            .task(key, DecodeOptions::new(200, 100).with_crop_center(0.5, 0.5))
            .run();

        assert_eq!(*harness.decoder.orientation_reads.lock(), 1);
        let (region, sample) = harness.decoder.regions.lock()[0];
        assert_eq!(sample, 8);
        assert_eq!(region, Rect::new(200, 0, 1000, 1600));
        let buffer = harness.completed().unwrap();
        assert_eq!(buffer.logical_size(), Dimensions::new(100, 200));
        assert_eq!(buffer.orientation(), Orientation::Rotate90);
        assert_eq!(buffer.display_size(), Dimensions::new(200, 100));
    }

    #[test]
    fn test_metadata_not_read_without_orientation_support() {
        let harness = Harness::new(FakeDecoder::new(100, 100).with_orientation(Orientation::Rotate90));
        harness.task(MockKey::new("png"), thumbnail()).run();

        assert_eq!(*harness.decoder.orientation_reads.lock(), 0);
        assert_eq!(harness.completed().unwrap().orientation(), Orientation::Normal);
    }

    #[test]
    fn test_stream_source_is_read_once() {
        let harness = Harness::new(FakeDecoder::new(400, 300));
        let key = MockKey::new("stream").with_bytes(vec![1, 2, 3]).stream_only();

        harness.task(key.clone(), thumbnail()).run();

        assert_eq!(key.open_count(), 1);
        assert!(harness.completed().is_some());
    }

    #[test]
    fn test_factory_source_is_reopened_per_step() {
        let harness = Harness::new(FakeDecoder::new(400, 300));
        let key = MockKey::new("file").with_orientation();

        harness.task(key.clone(), thumbnail()).run();

        assert_eq!(key.open_count(), 3);
    }

    #[test]
    fn test_pooled_buffer_is_reused() {
        let harness = Harness::new(FakeDecoder::new(1600, 1200));
        let pooled = PoolableBuffer::allocate(Dimensions::new(128, 128));
        pooled.set_orientation(Orientation::Rotate180);
        harness.cache.offer(pooled.clone()).unwrap();

        harness.task(MockKey::new("photo"), thumbnail()).run();

        let buffer = harness.completed().unwrap();
        assert!(Arc::ptr_eq(&buffer, &pooled));
        assert_eq!(buffer.logical_size(), Dimensions::new(75, 75));
        assert_eq!(buffer.physical_size(), Dimensions::new(128, 128));
        assert_eq!(buffer.orientation(), Orientation::Normal);
    }

    #[test]
    fn test_small_pooled_buffer_is_returned() {
        let harness = Harness::new(FakeDecoder::new(1600, 1200));
        let pooled = PoolableBuffer::allocate(Dimensions::new(10, 10));
        harness.cache.offer(pooled.clone()).unwrap();

        harness.task(MockKey::new("photo"), thumbnail()).run();

        let buffer = harness.completed().unwrap();
        assert!(!Arc::ptr_eq(&buffer, &pooled));
        assert!(buffer.is_reusable());
        assert!(Arc::ptr_eq(&harness.cache.poll().unwrap(), &pooled));
    }

    #[test]
    fn test_fresh_buffer_uses_configured_size() {
        let harness = Harness::new(FakeDecoder::new(1600, 1200));
        let options = thumbnail().with_buffer_size(Dimensions::new(128, 64));

        harness.task(MockKey::new("photo"), options).run();

        let buffer = harness.completed().unwrap();
        assert_eq!(buffer.physical_size(), Dimensions::new(128, 75));
        assert_eq!(buffer.logical_size(), Dimensions::new(75, 75));
    }

    #[test]
    fn test_blocking_poll_timeout_allocates_fresh_buffer() {
        let harness = Harness::new(FakeDecoder::new(1600, 1200));
        harness.cache.set_blocking(true);

        let state = harness
            .task(MockKey::new("photo"), thumbnail())
            .with_poll_timeout(Duration::from_millis(20))
            .run();

        assert_eq!(state, TaskState::Completed);
        let buffer = harness.completed().unwrap();
        assert!(buffer.is_reusable());
        assert_eq!(buffer.ref_count(), 1);
        assert!(harness.cache.is_blocking());
    }

    #[test]
    fn test_reuse_disabled_allocates_plain_buffer() {
        let harness = Harness::new(FakeDecoder::new(1600, 1200));
        let pooled = PoolableBuffer::allocate(Dimensions::new(128, 128));
        harness.cache.offer(pooled.clone()).unwrap();

        harness
            .task(MockKey::new("photo"), thumbnail().with_reuse(false))
            .run();

        let buffer = harness.completed().unwrap();
        assert!(!buffer.is_reusable());
        assert!(Arc::ptr_eq(&harness.cache.poll().unwrap(), &pooled));
    }
}
