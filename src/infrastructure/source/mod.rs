//! Request key implementations for encoded image sources.

mod file_key;
mod memory_key;

pub use file_key::FileKey;
pub use memory_key::MemoryKey;
