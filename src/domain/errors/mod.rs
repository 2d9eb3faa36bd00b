//! Domain error types.

mod aggregator_error;
mod decode_error;
mod pool_error;

pub use aggregator_error::AggregatorError;
pub use decode_error::{DecodeError, DecodeResult};
pub use pool_error::PoolError;
