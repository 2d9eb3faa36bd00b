//! Application layer with the decode pipeline and completion ordering.

/// Pipeline, listener and aggregator services.
pub mod services;

pub use services::{
    ChannelListener, ContiguousFifoAggregator, DecodeEvent, DecodePipeline, DecodePipelineConfig,
    OrderedListener,
};
