//! Error types for filter operations.

use thiserror::Error;

/// Errors that can occur during filter operations.
#[derive(Debug, Error)]
pub enum FilterError {
    /// Block length must be at least one sample.
    #[error("Block length must be at least 1, got {0}")]
    InvalidBlockLen(usize),

    /// Buffer length mismatch.
    #[error("Buffer length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// A transform backend reported a failure.
    #[error("Transform failed: {0}")]
    Transform(String),
}

/// Result type for filter operations.
pub type FilterResult<T> = Result<T, FilterError>;
