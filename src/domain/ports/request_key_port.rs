//! Port definitions for request identity and encoded-byte sources.

use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::io::{self, Read, Seek};
use std::sync::Arc;

use crate::domain::entities::ImageId;

/// A readable, seekable handle onto encoded image bytes.
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Boxed random-access handle.
pub type SourceHandle = Box<dyn ReadSeek>;

/// Produces independent random-access handles onto the same encoded bytes.
/// Each call returns a fresh handle positioned at the start.
pub trait HandleFactory: Send + Sync {
    /// Opens a new handle.
    ///
    /// # Errors
    /// Returns an I/O error if the source cannot be opened.
    fn open(&self) -> io::Result<SourceHandle>;
}

/// Identity that can be ordered by the completion aggregator.
pub trait OrderKey: Eq + Hash + Clone + Debug + Send + 'static {
    /// Returns true when the key has no identity and cannot be queued.
    fn is_blank(&self) -> bool {
        false
    }
}

impl OrderKey for ImageId {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

impl OrderKey for String {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

impl OrderKey for &'static str {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

impl OrderKey for u32 {}
impl OrderKey for u64 {}
impl OrderKey for usize {}

/// Identifies one decode request and supplies its encoded bytes.
/// Doubles as the cache key, so equality and hashing must be stable.
pub trait RequestKey: OrderKey + Display + Sync {
    /// Returns a factory for repeatable random-access handles, if the source
    /// supports it. `Ok(None)` means the caller must use [`Self::open_stream`].
    ///
    /// # Errors
    /// Returns an I/O error if the factory cannot be created.
    fn handle_factory(&self) -> io::Result<Option<Arc<dyn HandleFactory>>>;

    /// Opens a single-use stream over the encoded bytes.
    ///
    /// # Errors
    /// Returns an I/O error if the stream cannot be opened.
    fn open_stream(&self) -> io::Result<Box<dyn Read + Send>>;

    /// Returns true if the encoded bytes may carry EXIF orientation.
    fn has_orientation_metadata(&self) -> bool;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory request key that counts how its bytes are opened.
    #[derive(Clone)]
    pub struct MockKey {
        pub name: &'static str,
        pub bytes: Arc<Vec<u8>>,
        pub use_factory: bool,
        pub orientation: bool,
        pub opens: Arc<AtomicUsize>,
    }

    impl MockKey {
        pub fn new(name: &'static str) -> Self {
            Self {
                name,
                bytes: Arc::new(Vec::new()),
                use_factory: true,
                orientation: false,
                opens: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn with_bytes(mut self, bytes: Vec<u8>) -> Self {
            self.bytes = Arc::new(bytes);
            self
        }

        pub fn stream_only(mut self) -> Self {
            self.use_factory = false;
            self
        }

        pub fn with_orientation(mut self) -> Self {
            self.orientation = true;
            self
        }

        pub fn open_count(&self) -> usize {
            self.opens.load(Ordering::SeqCst)
        }
    }

    impl PartialEq for MockKey {
        fn eq(&self, other: &Self) -> bool {
            self.name == other.name
        }
    }

    impl Eq for MockKey {}

    impl Hash for MockKey {
        fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
            self.name.hash(state);
        }
    }

    impl Debug for MockKey {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "MockKey({})", self.name)
        }
    }

    impl Display for MockKey {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.name)
        }
    }

    impl OrderKey for MockKey {
        fn is_blank(&self) -> bool {
            self.name.is_empty()
        }
    }

    struct MockFactory {
        bytes: Arc<Vec<u8>>,
        opens: Arc<AtomicUsize>,
    }

    impl HandleFactory for MockFactory {
        fn open(&self) -> io::Result<SourceHandle> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(Cursor::new(self.bytes.as_ref().clone())))
        }
    }

    impl RequestKey for MockKey {
        fn handle_factory(&self) -> io::Result<Option<Arc<dyn HandleFactory>>> {
            if !self.use_factory {
                return Ok(None);
            }
            Ok(Some(Arc::new(MockFactory {
                bytes: self.bytes.clone(),
                opens: self.opens.clone(),
            })))
        }

        fn open_stream(&self) -> io::Result<Box<dyn Read + Send>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(Cursor::new(self.bytes.as_ref().clone())))
        }

        fn has_orientation_metadata(&self) -> bool {
            self.orientation
        }
    }
}
