//! Decoder backed by the `image` crate with EXIF orientation support.

use std::io::BufReader;

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader, RgbaImage};
use tracing::trace;

use crate::domain::entities::{Dimensions, Orientation, Rect};
use crate::domain::errors::{DecodeError, DecodeResult};
use crate::domain::ports::{ImageDecoderPort, ReadSeek, sampled_size};

/// Decodes PNG, JPEG and WebP sources into RGBA8 pixels.
///
/// Region decoding is emulated: the `image` crate has no partial decoder, so
/// the whole image is decoded and then cropped. It costs as much memory as
/// the whole-image path. Formats outside PNG, JPEG and WebP report
/// [`DecodeError::RegionUnsupported`] so the caller falls back to a
/// whole-image decode.
#[derive(Debug, Clone, Copy)]
pub struct ImageCrateDecoder {
    filter: FilterType,
}

impl ImageCrateDecoder {
    /// Creates a decoder that downsamples with a triangle filter.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            filter: FilterType::Triangle,
        }
    }

    /// Sets the resampling filter.
    #[must_use]
    pub const fn with_filter(mut self, filter: FilterType) -> Self {
        self.filter = filter;
        self
    }

    fn reader(
        source: &mut dyn ReadSeek,
    ) -> DecodeResult<ImageReader<BufReader<&mut dyn ReadSeek>>> {
        Ok(ImageReader::new(BufReader::new(source)).with_guessed_format()?)
    }

    fn downsample(&self, image: &DynamicImage, sample_size: u32) -> RgbaImage {
        if sample_size <= 1 {
            return image.to_rgba8();
        }
        let out = sampled_size(Dimensions::new(image.width(), image.height()), sample_size);
        image
            .resize_exact(out.width, out.height, self.filter)
            .into_rgba8()
    }
}

impl Default for ImageCrateDecoder {
    fn default() -> Self {
        Self::new()
    }
}

const fn supports_region(format: ImageFormat) -> bool {
    matches!(
        format,
        ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::WebP
    )
}

impl ImageDecoderPort for ImageCrateDecoder {
    fn decode_bounds(&self, source: &mut dyn ReadSeek) -> DecodeResult<Dimensions> {
        let (width, height) = Self::reader(source)?.into_dimensions()?;
        Ok(Dimensions::new(width, height))
    }

    fn read_orientation(&self, source: &mut dyn ReadSeek) -> Orientation {
        let mut reader = BufReader::new(source);
        match exif::Reader::new().read_from_container(&mut reader) {
            Ok(exif) => exif
                .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
                .and_then(|field| field.value.get_uint(0))
                .map_or(Orientation::Normal, Orientation::from_exif),
            Err(e) => {
                trace!(error = %e, "No readable EXIF orientation");
                Orientation::Normal
            }
        }
    }

    fn decode_region(
        &self,
        source: &mut dyn ReadSeek,
        region: Rect,
        sample_size: u32,
    ) -> DecodeResult<RgbaImage> {
        let reader = Self::reader(source)?;
        match reader.format() {
            Some(format) if supports_region(format) => {}
            Some(format) => return Err(DecodeError::region_unsupported(format!("{format:?}"))),
            None => return Err(DecodeError::region_unsupported("unknown")),
        }

        let image = reader.decode()?;
        let size = Dimensions::new(image.width(), image.height());
        if region.is_empty() || region.right > size.width || region.bottom > size.height {
            return Err(DecodeError::EmptyRegion { region, size });
        }

        let cropped = image.crop_imm(region.left, region.top, region.width(), region.height());
        Ok(self.downsample(&cropped, sample_size))
    }

    fn decode(&self, source: &mut dyn ReadSeek, sample_size: u32) -> DecodeResult<RgbaImage> {
        let image = Self::reader(source)?.decode()?;
        if image.width() == 0 || image.height() == 0 {
            return Err(DecodeError::InvalidDimensions {
                size: Dimensions::new(image.width(), image.height()),
            });
        }
        Ok(self.downsample(&image, sample_size))
    }
}
