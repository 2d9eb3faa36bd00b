//! Stable identity for decode requests.

use sha2::{Digest, Sha256};

/// Unique identifier for a decode request.
/// Generated from a path, a URL, or a hash of the encoded bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageId(String);

impl ImageId {
    /// Creates a new `ImageId` from any string-like input.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Creates an `ImageId` by hashing encoded image bytes.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let result = hasher.finalize();
        Self(hex::encode(&result[..16]))
    }

    /// Returns the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the identifier is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for ImageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ImageId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ImageId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_id_from_bytes() {
        let id = ImageId::from_bytes(b"\x89PNG fake payload");
        assert_eq!(id.as_str().len(), 32);
        assert_eq!(id, ImageId::from_bytes(b"\x89PNG fake payload"));
        assert_ne!(id, ImageId::from_bytes(b"other payload"));
    }

    #[test]
    fn test_empty_id() {
        assert!(ImageId::new("").is_empty());
        assert!(!ImageId::from("a").is_empty());
    }
}
