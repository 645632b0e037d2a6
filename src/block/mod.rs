//! Blocks - rectangular batches of named, typed columns
//!
//! A block is the unit of data flow through the query pipeline: an ordered
//! collection of `(name, type, column)` entries where every column has the
//! same length and names are unique. A block with no columns is the stream
//! terminator; a block with columns but zero rows is a schema-only sample.
//! Operators hand fresh blocks downstream instead of mutating shared ones.

pub mod column;
pub mod error;
pub mod types;

pub use column::{Column, ColumnData, Value};
pub use error::BlockError;
pub use types::DataType;

/// One column of a block together with its name and declared type
#[derive(Debug, Clone, PartialEq)]
pub struct NamedColumn {
    pub name: String,
    pub data_type: DataType,
    pub column: Column,
}

impl NamedColumn {
    pub fn new(name: impl Into<String>, data_type: DataType, column: Column) -> Self {
        NamedColumn {
            name: name.into(),
            data_type,
            column,
        }
    }
}

/// A rectangular batch of named, typed columns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    columns: Vec<NamedColumn>,
}

impl Block {
    /// The empty block, used as the end-of-stream marker
    pub fn empty() -> Self {
        Block::default()
    }

    /// Build a block from columns, validating shape and name uniqueness
    pub fn from_columns(columns: Vec<NamedColumn>) -> Result<Self, BlockError> {
        let mut block = Block::empty();
        for col in columns {
            block.insert(col)?;
        }
        Ok(block)
    }

    /// True iff the block has no columns (the end-of-stream marker)
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Row count; zero for the empty block
    pub fn rows(&self) -> usize {
        self.columns.first().map(|c| c.column.len()).unwrap_or(0)
    }

    /// Number of columns
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// True iff a column with this name is present
    pub fn has(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// Look up a column by name
    pub fn get(&self, name: &str) -> Option<&NamedColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Look up a column by position
    pub fn column(&self, index: usize) -> Option<&NamedColumn> {
        self.columns.get(index)
    }

    /// Iterate over columns in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &NamedColumn> {
        self.columns.iter()
    }

    /// Add a column
    ///
    /// The first column fixes the block's row count; later columns must match
    /// it. Duplicate names are rejected.
    pub fn insert(&mut self, col: NamedColumn) -> Result<(), BlockError> {
        if self.has(&col.name) {
            return Err(BlockError::DuplicateColumn(col.name));
        }
        if !self.columns.is_empty() && col.column.len() != self.rows() {
            return Err(BlockError::ShapeMismatch {
                name: col.name,
                expected: self.rows(),
                got: col.column.len(),
            });
        }
        self.columns.push(col);
        Ok(())
    }

    /// Uncompressed in-memory size estimate in bytes
    pub fn byte_size(&self) -> usize {
        self.columns.iter().map(|c| c.column.byte_size()).sum()
    }

    /// The `(name, type)` pairs of this block in column order
    pub fn schema(&self) -> Vec<(String, DataType)> {
        self.columns
            .iter()
            .map(|c| (c.name.clone(), c.data_type))
            .collect()
    }

    /// A zero-row block carrying only this block's schema
    pub fn sample(&self) -> Block {
        let columns = self
            .columns
            .iter()
            .map(|c| NamedColumn::new(c.name.clone(), c.data_type, c.data_type.empty_column()))
            .collect();
        // schema was already valid, emptying columns cannot break it
        Block { columns }
    }
}
