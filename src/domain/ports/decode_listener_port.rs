//! Port for receiving decode lifecycle notifications.

use std::sync::Arc;

use crate::domain::entities::PoolableBuffer;

/// Receives the lifecycle of one decode request.
///
/// Every request produces `on_decode_begin` followed by exactly one of
/// `on_decode_complete` or `on_decode_cancel`.
pub trait DecodeListener<K>: Send + Sync {
    /// The task started running.
    fn on_decode_begin(&self, key: &K);

    /// The task finished. `None` means the source decoded to nothing.
    /// A returned buffer carries one reference owned by the listener.
    fn on_decode_complete(&self, key: &K, result: Option<Arc<PoolableBuffer>>);

    /// The task was cancelled before publishing a result.
    fn on_decode_cancel(&self, key: &K);
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use parking_lot::Mutex;

    /// Lifecycle notifications as recorded by [`RecordingListener`].
    #[derive(Debug, Clone)]
    pub enum Recorded<K> {
        Begin(K),
        Complete(K, Option<Arc<PoolableBuffer>>),
        Cancel(K),
    }

    /// Listener that records every notification in order.
    pub struct RecordingListener<K> {
        pub events: Mutex<Vec<Recorded<K>>>,
    }

    impl<K> RecordingListener<K> {
        pub fn new() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
            }
        }

        pub fn take(&self) -> Vec<Recorded<K>> {
            std::mem::take(&mut *self.events.lock())
        }
    }

    impl<K: Clone + Send + Sync> DecodeListener<K> for RecordingListener<K> {
        fn on_decode_begin(&self, key: &K) {
            self.events.lock().push(Recorded::Begin(key.clone()));
        }

        fn on_decode_complete(&self, key: &K, result: Option<Arc<PoolableBuffer>>) {
            self.events.lock().push(Recorded::Complete(key.clone(), result));
        }

        fn on_decode_cancel(&self, key: &K) {
            self.events.lock().push(Recorded::Cancel(key.clone()));
        }
    }
}
