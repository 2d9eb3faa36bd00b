//! Decode error types.

use std::io;

use thiserror::Error;

use crate::domain::entities::{Dimensions, Rect};

/// Result type for decoder operations.
pub type DecodeResult<T> = std::result::Result<T, DecodeError>;

/// Decode error variants. All of them are recovered by the decode task's
/// fallback path; only exhausting the fallbacks surfaces an absent result.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum DecodeError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("region decode not supported for {format}")]
    RegionUnsupported { format: String },

    #[error("region {region:?} lies outside an image of size {size}")]
    EmptyRegion { region: Rect, size: Dimensions },

    #[error("invalid source dimensions {size}")]
    InvalidDimensions { size: Dimensions },
}

impl DecodeError {
    /// Creates an unsupported region error.
    #[must_use]
    pub fn region_unsupported(format: impl Into<String>) -> Self {
        Self::RegionUnsupported {
            format: format.into(),
        }
    }
}
