//! Buffer pool misuse errors.

use thiserror::Error;

use crate::domain::entities::Dimensions;

/// Buffer pool error variants.
///
/// Every variant except `BufferTooSmall` is a programming error on the
/// caller's side.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[allow(missing_docs)]
pub enum PoolError {
    #[error("release called on a buffer with no outstanding references")]
    ReleaseUnreferenced,

    #[error("cannot offer a buffer that still has {ref_count} reference(s)")]
    OfferReferenced { ref_count: usize },

    #[error("cannot offer a buffer that is not reusable")]
    OfferNotReusable,

    #[error("pixels of size {needed} do not fit a buffer of size {physical}")]
    BufferTooSmall {
        needed: Dimensions,
        physical: Dimensions,
    },
}
