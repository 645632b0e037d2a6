//! Stream error types

use thiserror::Error;

use crate::block::BlockError;

/// Result type for stream operations
pub type StreamResult<T> = Result<T, StreamError>;

/// Errors raised while producing or consuming blocks
#[derive(Debug, Error)]
pub enum StreamError {
    /// Block-level invariant violation
    #[error(transparent)]
    Block(#[from] BlockError),

    /// Error reported by an upstream stage
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Caller violated the stream lifecycle (e.g. write before prefix)
    #[error("stream misuse: {0}")]
    Misuse(&'static str),

    /// A background worker died without reporting a structured error
    #[error("background worker failed: {0}")]
    Worker(String),
}
