//! Completion aggregator errors.

use thiserror::Error;

/// Aggregator error variants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregatorError {
    /// A key without identity was passed to `expect`.
    #[error("cannot expect a blank key")]
    BlankKey,
}
