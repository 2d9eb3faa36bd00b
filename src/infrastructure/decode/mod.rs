//! Decoding of request keys into pooled pixel buffers.

mod decode_task;
mod image_decoder;
pub mod sampling;

pub use decode_task::{DecodeHandle, DecodeTask, TaskState};
pub use image_decoder::ImageCrateDecoder;
