//! Infrastructure layer with caches, decoders and source adapters.

/// Pooled buffer caches.
pub mod cache;
/// Application configuration.
pub mod config;
/// Decoder and decode task.
pub mod decode;
/// Request keys for files and in-memory bytes.
pub mod source;

pub use cache::{BlockingImageCache, CacheConfig, UnrefedPool, UnrefedPooledCache};
pub use config::{AppConfig, CliArgs, LogLevel, StorageManager};
pub use decode::{DecodeHandle, DecodeTask, ImageCrateDecoder, TaskState};
pub use source::{FileKey, MemoryKey};
