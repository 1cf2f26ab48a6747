use thiserror::Error;

/// Error taxonomy for the buffer core and pooled allocator.
///
/// All preconditions are validated before any mutation; partial writes
/// followed by a returned error never happen except for [`BufError::IoFailure`],
/// which documents exactly how much was transferred before the failure.
#[derive(Error, Debug)]
pub enum BufError {
    #[error("index/length out of bounds: {0}")]
    OutOfBounds(String),

    #[error("capacity growth would exceed max_capacity: {0}")]
    InsufficientCapacity(String),

    #[error("illegal reference count operation: {0}")]
    IllegalReferenceCount(String),

    #[error("operation unsupported on this buffer variant: {0}")]
    Unsupported(String),

    #[error("allocator could not satisfy request: {0}")]
    AllocationFailure(String),

    #[error("stream I/O failure: {0}")]
    IoFailure(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BufError>;
