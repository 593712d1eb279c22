//! Error taxonomy for the render middleware core.
//!
//! Per the design, only two classes of failure are ever surfaced to a caller:
//! a geometry/range too large for its block, and a batch registered with a
//! buffer layout whose vertex streams disagree on block capacity. Everything
//! else (stale task output, missing resource ids, empty per-stage lists) is
//! recoverable and handled silently by the next frame.

use thiserror::Error;

/// Failures that can be returned directly to application code.
#[derive(Debug, Error)]
pub enum DrawError {
    /// A single geometry (or a single update to one) does not fit within one
    /// block of its target allocator.
    #[error("geometry of {requested} bytes exceeds block size of {block_size} bytes")]
    CapacityExceeded {
        requested: usize,
        block_size: usize,
    },

    /// `RegisterBatch` was given a `BufferLayout` whose vertex-stream
    /// allocators do not all agree on block capacity in vertices.
    #[error("mismatching block sizes across vertex streams of buffer layout")]
    MismatchingBlockSizes,

    /// A single source geometry handed to the batch engine is larger than
    /// one block all by itself; it can never be merged regardless of split
    /// point.
    #[error("geometry exceeds block size")]
    GeometryExceedsBlockSize,
}

pub type DrawResult<T> = Result<T, DrawError>;
