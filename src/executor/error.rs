//! Executor error types

use std::fmt;

use crate::block::BlockError;

/// Result type for executor operations
pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// Executor errors
#[derive(Debug)]
pub enum ExecutorError {
    /// Table not found
    TableNotFound(String),

    /// Query text the executor cannot interpret
    InvalidQuery(String),

    /// Block-level invariant violation while building a pipeline
    Block(BlockError),

    /// Internal executor error
    Internal(String),
}

impl fmt::Display for ExecutorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutorError::TableNotFound(name) => write!(f, "table not found: {}", name),
            ExecutorError::InvalidQuery(msg) => write!(f, "invalid query: {}", msg),
            ExecutorError::Block(e) => write!(f, "block error: {}", e),
            ExecutorError::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for ExecutorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExecutorError::Block(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BlockError> for ExecutorError {
    fn from(e: BlockError) -> Self {
        ExecutorError::Block(e)
    }
}
