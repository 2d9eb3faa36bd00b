//! Domain layer with core entities, errors, and port definitions.

/// Entity definitions.
pub mod entities;
/// Error types.
pub mod errors;
/// Port definitions.
pub mod ports;

pub use entities::{DecodeOptions, Dimensions, ImageId, Orientation, PoolableBuffer, SampleStrategy};
pub use errors::{AggregatorError, DecodeError, PoolError};
pub use ports::{DecodeListener, ImageDecoderPort, OrderKey, PooledCache, RequestKey};
