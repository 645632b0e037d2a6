//! Block and column error types

use thiserror::Error;

use super::types::DataType;

/// Errors raised by block and column operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockError {
    /// A column with this name is already present in the block
    #[error("duplicate column: {0}")]
    DuplicateColumn(String),

    /// Column length disagrees with the block's row count
    #[error("column {name} has {got} rows, block has {expected}")]
    ShapeMismatch {
        name: String,
        expected: usize,
        got: usize,
    },

    /// Value type disagrees with the column's element type
    #[error("type mismatch: column holds {column}, value is {value}")]
    TypeMismatch { column: DataType, value: DataType },

    /// Appending to a constant column is not supported
    #[error("cannot append to a constant column")]
    ConstAppend,
}
