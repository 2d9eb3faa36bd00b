//! Port definition for the image decoder capability.

use image::RgbaImage;

use super::request_key_port::ReadSeek;
use crate::domain::entities::{Dimensions, Orientation, Rect};
use crate::domain::errors::DecodeResult;

/// Turns encoded bytes into RGBA8 pixels.
///
/// Sampled decodes produce `floor(size / sample_size)` pixels per axis,
/// never less than one.
pub trait ImageDecoderPort: Send + Sync {
    /// Reads the raw pixel dimensions without decoding pixel data.
    ///
    /// # Errors
    /// Returns an error if the header cannot be read.
    fn decode_bounds(&self, source: &mut dyn ReadSeek) -> DecodeResult<Dimensions>;

    /// Reads the display orientation from the source metadata.
    /// Missing or unreadable metadata yields [`Orientation::Normal`].
    fn read_orientation(&self, source: &mut dyn ReadSeek) -> Orientation;

    /// Decodes `region` (raw coordinates) downsampled by `sample_size`.
    ///
    /// # Errors
    /// Returns an error if the format cannot be region-decoded or decoding fails.
    fn decode_region(
        &self,
        source: &mut dyn ReadSeek,
        region: Rect,
        sample_size: u32,
    ) -> DecodeResult<RgbaImage>;

    /// Decodes the whole image downsampled by `sample_size`.
    ///
    /// # Errors
    /// Returns an error if decoding fails.
    fn decode(&self, source: &mut dyn ReadSeek, sample_size: u32) -> DecodeResult<RgbaImage>;
}

/// Scales a size down by `sample_size`, keeping at least one pixel per axis.
#[must_use]
pub fn sampled_size(size: Dimensions, sample_size: u32) -> Dimensions {
    let sample = sample_size.max(1);
    Dimensions::new((size.width / sample).max(1), (size.height / sample).max(1))
}
