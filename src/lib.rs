//! Pixpool - concurrent image decoding with pooled pixel buffers.
//!
//! Decodes downsampled, cropped thumbnails on a worker pool, recycles
//! unreferenced pixel buffers between decodes, and releases completions in
//! the order they were requested.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Application layer containing the decode pipeline and ordering services.
pub mod application;
/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing caches, decoders, sources and config.
pub mod infrastructure;

/// Current version of the application.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name.
pub const NAME: &str = "pixpool";
