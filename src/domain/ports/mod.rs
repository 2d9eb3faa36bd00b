mod decode_listener_port;
mod image_decoder_port;
mod pooled_cache_port;
mod request_key_port;

pub use decode_listener_port::DecodeListener;
pub use image_decoder_port::{ImageDecoderPort, sampled_size};
pub use pooled_cache_port::{CacheStats, Poolable, PooledCache, Sizer};
pub use request_key_port::{HandleFactory, OrderKey, ReadSeek, RequestKey, SourceHandle};
