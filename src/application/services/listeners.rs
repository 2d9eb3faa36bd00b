//! Decode listeners for channel delivery and ordered completion.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::ordered_aggregator::ContiguousFifoAggregator;
use crate::domain::entities::PoolableBuffer;
use crate::domain::ports::{DecodeListener, OrderKey};

/// Message sent for each decode lifecycle notification.
#[derive(Debug, Clone)]
pub enum DecodeEvent<K> {
    /// The decode started on a worker.
    Begin {
        /// The request key.
        key: K,
    },
    /// The decode finished. The buffer carries one reference owned by the
    /// receiver, which must release it when done.
    Completed {
        /// The request key.
        key: K,
        /// The decoded buffer, or `None` if the source decoded to nothing.
        result: Option<Arc<PoolableBuffer>>,
    },
    /// The decode was cancelled.
    Cancelled {
        /// The request key.
        key: K,
    },
}

impl<K> DecodeEvent<K> {
    /// The request key.
    pub const fn key(&self) -> &K {
        match self {
            Self::Begin { key } | Self::Completed { key, .. } | Self::Cancelled { key } => key,
        }
    }

    /// Returns true for completion and cancellation.
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Begin { .. })
    }
}

/// Forwards notifications to a channel, marshalling them off the worker.
pub struct ChannelListener<K> {
    tx: mpsc::UnboundedSender<DecodeEvent<K>>,
}

impl<K> ChannelListener<K> {
    /// Creates a listener sending into `tx`.
    pub const fn new(tx: mpsc::UnboundedSender<DecodeEvent<K>>) -> Self {
        Self { tx }
    }
}

impl<K: Clone + Send + Sync + std::fmt::Debug> DecodeListener<K> for ChannelListener<K> {
    fn on_decode_begin(&self, key: &K) {
        let _ = self.tx.send(DecodeEvent::Begin { key: key.clone() });
    }

    fn on_decode_complete(&self, key: &K, result: Option<Arc<PoolableBuffer>>) {
        let event = DecodeEvent::Completed {
            key: key.clone(),
            result,
        };
        if let Err(mpsc::error::SendError(DecodeEvent::Completed {
            result: Some(buffer),
            ..
        })) = self.tx.send(event)
        {
            debug!(key = ?key, "Receiver gone, releasing decoded buffer");
            if let Err(e) = buffer.release() {
                warn!(key = ?key, error = %e, "Failed to release undelivered buffer");
            }
        }
    }

    fn on_decode_cancel(&self, key: &K) {
        let _ = self.tx.send(DecodeEvent::Cancelled { key: key.clone() });
    }
}

/// Completion result parked in the aggregator. Releases the listener's
/// reference if the completion is dropped undelivered, such as when its key
/// is forgotten.
struct HeldResult(Option<Arc<PoolableBuffer>>);

impl HeldResult {
    fn deliver(mut self) -> Option<Arc<PoolableBuffer>> {
        self.0.take()
    }
}

impl Drop for HeldResult {
    fn drop(&mut self) {
        if let Some(buffer) = self.0.take() {
            debug!("Completion dropped undelivered, releasing buffer");
            if let Err(e) = buffer.release() {
                warn!(error = %e, "Failed to release undelivered buffer");
            }
        }
    }
}

/// Delivers terminal notifications to `inner` in the order keys were
/// expected by the aggregator. Begin notifications pass straight through.
pub struct OrderedListener<K: OrderKey> {
    inner: Arc<dyn DecodeListener<K>>,
    aggregator: Arc<ContiguousFifoAggregator<K>>,
}

impl<K: OrderKey> OrderedListener<K> {
    /// Wraps `inner` so completions are released through `aggregator`.
    pub fn new(
        inner: Arc<dyn DecodeListener<K>>,
        aggregator: Arc<ContiguousFifoAggregator<K>>,
    ) -> Self {
        Self { inner, aggregator }
    }
}

impl<K: OrderKey + Sync> DecodeListener<K> for OrderedListener<K> {
    fn on_decode_begin(&self, key: &K) {
        self.inner.on_decode_begin(key);
    }

    fn on_decode_complete(&self, key: &K, result: Option<Arc<PoolableBuffer>>) {
        let inner = self.inner.clone();
        let owned = key.clone();
        let held = HeldResult(result);
        self.aggregator.execute(key.clone(), move || {
            inner.on_decode_complete(&owned, held.deliver());
        });
    }

    fn on_decode_cancel(&self, key: &K) {
        let inner = self.inner.clone();
        let owned = key.clone();
        self.aggregator.execute(key.clone(), move || {
            inner.on_decode_cancel(&owned);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Dimensions;
    use crate::domain::ports::mocks::{Recorded, RecordingListener};

    #[tokio::test]
    async fn test_channel_listener_forwards_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let listener = ChannelListener::new(tx);

        listener.on_decode_begin(&"a");
        listener.on_decode_complete(&"a", None);
        listener.on_decode_cancel(&"b");

        let begin = rx.recv().await.unwrap();
        assert!(matches!(begin, DecodeEvent::Begin { key: "a" }));
        assert!(!begin.is_terminal());
        let done = rx.recv().await.unwrap();
        assert!(matches!(done, DecodeEvent::Completed { key: "a", result: None }));
        assert!(done.is_terminal());
        assert_eq!(rx.recv().await.unwrap().key(), &"b");
    }

    #[test]
    fn test_undelivered_buffer_is_released() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let listener = ChannelListener::new(tx);
        let buffer = PoolableBuffer::allocate(Dimensions::new(2, 2));
        buffer.acquire();

        listener.on_decode_complete(&"a", Some(buffer.clone()));

        assert_eq!(buffer.ref_count(), 0);
    }

    #[test]
    fn test_ordered_listener_delays_out_of_order_completion() {
        let aggregator = Arc::new(ContiguousFifoAggregator::new());
        let recorder = Arc::new(RecordingListener::new());
        let listener = OrderedListener::new(recorder.clone(), aggregator.clone());
        aggregator.expect("first", None).unwrap();
        aggregator.expect("second", None).unwrap();

        listener.on_decode_begin(&"second");
        listener.on_decode_complete(&"second", None);
        assert_eq!(recorder.events.lock().len(), 1);

        listener.on_decode_cancel(&"first");

        let events = recorder.take();
        assert!(matches!(
            events.as_slice(),
            [
                Recorded::Begin("second"),
                Recorded::Cancel("first"),
                Recorded::Complete("second", None)
            ]
        ));
    }

    #[test]
    fn test_re_expected_key_still_delivers_parked_completion() {
        let aggregator = Arc::new(ContiguousFifoAggregator::new());
        let recorder = Arc::new(RecordingListener::new());
        let listener = OrderedListener::new(recorder.clone(), aggregator.clone());
        aggregator.expect("a", None).unwrap();
        aggregator.expect("k", None).unwrap();
        let buffer = PoolableBuffer::allocate(Dimensions::new(2, 2));
        buffer.acquire();

        listener.on_decode_complete(&"k", Some(buffer.clone()));
        aggregator.expect("k", None).unwrap();
        aggregator.forget(&"a");
        aggregator.forget(&"k");

        let events = recorder.take();
        assert!(matches!(events.as_slice(), [Recorded::Complete("k", Some(_))]));
        assert_eq!(buffer.ref_count(), 1);
    }

    #[test]
    fn test_forgotten_completion_releases_buffer() {
        let aggregator = Arc::new(ContiguousFifoAggregator::new());
        let recorder = Arc::new(RecordingListener::new());
        let listener = OrderedListener::new(recorder.clone(), aggregator.clone());
        aggregator.expect("a", None).unwrap();
        aggregator.expect("k", None).unwrap();
        let buffer = PoolableBuffer::allocate(Dimensions::new(2, 2));
        buffer.acquire();

        listener.on_decode_complete(&"k", Some(buffer.clone()));
        aggregator.forget(&"k");

        assert!(recorder.take().is_empty());
        assert_eq!(buffer.ref_count(), 0);
    }
}
