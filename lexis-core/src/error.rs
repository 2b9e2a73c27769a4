//! # Error Types for Lexis
//!
//! Unified error handling across the lexis crates.
//!
//! Three kinds of failure exist in the engine:
//! - **Capacity overflow**: a pool or index ran out of room. Fatal for the
//!   batch that triggered it.
//! - **Malformed batch**: host input that does not describe a valid batch.
//!   Rejected before any kernel is dispatched.
//! - **Configuration**: capacities or settings that cannot work.
//!
//! Degenerate numbers (zero marginals, zero norms) are not errors; the
//! kernels return 0 for them.

use thiserror::Error;

/// Main error type for lexis operations
#[derive(Error, Debug)]
pub enum LexisError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A pool or hash index has no room left
    #[error("Capacity overflow in {structure}: capacity {capacity} exhausted")]
    CapacityOverflow {
        structure: &'static str,
        capacity: usize,
    },

    /// Host input rejected before dispatch
    #[error("Malformed batch: {0}")]
    MalformedBatch(String),

    /// Compute backend error
    #[error("Compute error: {0}")]
    Compute(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid state
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type for lexis operations
pub type LexisResult<T> = Result<T, LexisError>;

impl LexisError {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a malformed batch error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedBatch(msg.into())
    }

    /// Create a compute error
    pub fn compute(msg: impl Into<String>) -> Self {
        Self::Compute(msg.into())
    }

    /// Create a capacity overflow error
    pub fn overflow(structure: &'static str, capacity: usize) -> Self {
        Self::CapacityOverflow {
            structure,
            capacity,
        }
    }

    /// True if this error is a capacity overflow
    pub fn is_overflow(&self) -> bool {
        matches!(self, Self::CapacityOverflow { .. })
    }
}

impl From<serde_json::Error> for LexisError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
