//! Request keys for encoded images already held in memory.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::{self, Cursor, Read};
use std::sync::Arc;

use bytes::Bytes;

use crate::domain::entities::ImageId;
use crate::domain::ports::{HandleFactory, OrderKey, RequestKey};

/// Encoded bytes received from elsewhere, such as a network response.
///
/// Identity is the content hash unless an explicit id is given. The bytes
/// are exposed as a single-use stream only.
#[derive(Debug, Clone)]
pub struct MemoryKey {
    id: ImageId,
    bytes: Bytes,
}

impl MemoryKey {
    /// Creates a key identified by the hash of `bytes`.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        Self {
            id: ImageId::from_bytes(&bytes),
            bytes,
        }
    }

    /// Creates a key with an explicit id.
    pub fn with_id(id: impl Into<ImageId>, bytes: impl Into<Bytes>) -> Self {
        Self {
            id: id.into(),
            bytes: bytes.into(),
        }
    }

    /// The key's identity.
    #[must_use]
    pub const fn id(&self) -> &ImageId {
        &self.id
    }

    /// Length of the encoded bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if no bytes are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl PartialEq for MemoryKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MemoryKey {}

impl Hash for MemoryKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for MemoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "memory:{}", self.id)
    }
}

impl OrderKey for MemoryKey {
    fn is_blank(&self) -> bool {
        self.id.is_empty()
    }
}

impl RequestKey for MemoryKey {
    fn handle_factory(&self) -> io::Result<Option<Arc<dyn HandleFactory>>> {
        Ok(None)
    }

    fn open_stream(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(Cursor::new(self.bytes.clone())))
    }

    fn has_orientation_metadata(&self) -> bool {
        let jpeg = self.bytes.starts_with(&[0xFF, 0xD8]);
        let webp = self.bytes.len() >= 12 && &self.bytes[..4] == b"RIFF" && &self.bytes[8..12] == b"WEBP";
        jpeg || webp
    }
}
