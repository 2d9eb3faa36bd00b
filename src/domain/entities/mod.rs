//! Domain entity definitions.

mod buffer;
mod decode_options;
mod geometry;
mod image_id;

pub use buffer::{BYTES_PER_PIXEL, PoolableBuffer};
pub use decode_options::{DecodeOptions, SampleStrategy};
pub use geometry::{Dimensions, Orientation, Rect};
pub use image_id::ImageId;
