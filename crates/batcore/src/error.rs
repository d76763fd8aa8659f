//! Error types for the batcore kernel
//!
//! Every fallible operation returns [`Result`]; there is no process-wide
//! error slot. Failures leave input columns unmodified.

use thiserror::Error;

/// Result type alias using the batcore [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for the column kernel
#[derive(Error, Debug)]
pub enum Error {
    /// Column types don't line up between operands
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Expected tail type
        expected: String,
        /// Actual tail type
        actual: String,
    },

    /// Memory could not be reserved while growing a heap or result buffer
    #[error("Allocation failure: {0}")]
    Allocation(String),

    /// Row count would exceed the maximum addressable position
    #[error("Capacity overflow: {0}")]
    CapacityOverflow(String),

    /// Attempt to mutate a read-only column without `force`
    #[error("Read-only column: {0}")]
    ReadOnly(String),

    /// Caller contract violation (misordered bounds, misaligned inputs, ...)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A row would violate an enforced uniqueness constraint
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Variable-heap management errors
    #[error("Heap error: {0}")]
    Heap(String),

    /// Mutation engine errors
    #[error("Mutation error: {0}")]
    Mutation(String),

    /// Ordering engine errors
    #[error("Ordering error: {0}")]
    Ordering(String),

    /// Selection engine errors
    #[error("Selection error: {0}")]
    Selection(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an allocation error
    pub fn allocation(msg: impl Into<String>) -> Self {
        Self::Allocation(msg.into())
    }

    /// Create a capacity overflow error
    pub fn capacity(msg: impl Into<String>) -> Self {
        Self::CapacityOverflow(msg.into())
    }

    /// Create a read-only error
    pub fn read_only(msg: impl Into<String>) -> Self {
        Self::ReadOnly(msg.into())
    }

    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a heap error
    pub fn heap(msg: impl Into<String>) -> Self {
        Self::Heap(msg.into())
    }

    /// Create a mutation error
    pub fn mutation(msg: impl Into<String>) -> Self {
        Self::Mutation(msg.into())
    }

    /// Create an ordering error
    pub fn ordering(msg: impl Into<String>) -> Self {
        Self::Ordering(msg.into())
    }

    /// Create a selection error
    pub fn selection(msg: impl Into<String>) -> Self {
        Self::Selection(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a type mismatch error from the two type names
    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

impl From<std::collections::TryReserveError> for Error {
    fn from(e: std::collections::TryReserveError) -> Self {
        Self::Allocation(e.to_string())
    }
}
