//! Application services.

pub mod decode_service;
pub mod listeners;
pub mod ordered_aggregator;

pub use decode_service::{DEFAULT_POLL_TIMEOUT, DecodePipeline, DecodePipelineConfig};
pub use listeners::{ChannelListener, DecodeEvent, OrderedListener};
pub use ordered_aggregator::{ContiguousFifoAggregator, OnFirstExpected, Task};
