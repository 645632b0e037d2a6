//! Columns and scalar values
//!
//! A column is a named-less, typed, homogeneous vector. It comes in two
//! shapes: materialized (`Full`, explicit per-row values) and constant
//! (`Const`, a single value logically repeated). Constant columns expand to
//! materialized ones with `materialized()`; every other operation treats the
//! two shapes uniformly.

use super::error::BlockError;
use super::types::DataType;

/// A single scalar value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    String(String),
}

impl Value {
    /// The data type this value belongs to
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Int8(_) => DataType::Int8,
            Value::Int16(_) => DataType::Int16,
            Value::Int32(_) => DataType::Int32,
            Value::Int64(_) => DataType::Int64,
            Value::UInt8(_) => DataType::UInt8,
            Value::UInt16(_) => DataType::UInt16,
            Value::UInt32(_) => DataType::UInt32,
            Value::UInt64(_) => DataType::UInt64,
            Value::Float32(_) => DataType::Float32,
            Value::Float64(_) => DataType::Float64,
            Value::String(_) => DataType::String,
        }
    }
}

/// Materialized column storage, one vector variant per data type
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    UInt8(Vec<u8>),
    UInt16(Vec<u16>),
    UInt32(Vec<u32>),
    UInt64(Vec<u64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    String(Vec<String>),
}

impl ColumnData {
    /// Number of rows
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Int8(v) => v.len(),
            ColumnData::Int16(v) => v.len(),
            ColumnData::Int32(v) => v.len(),
            ColumnData::Int64(v) => v.len(),
            ColumnData::UInt8(v) => v.len(),
            ColumnData::UInt16(v) => v.len(),
            ColumnData::UInt32(v) => v.len(),
            ColumnData::UInt64(v) => v.len(),
            ColumnData::Float32(v) => v.len(),
            ColumnData::Float64(v) => v.len(),
            ColumnData::String(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element type of this storage
    pub fn data_type(&self) -> DataType {
        match self {
            ColumnData::Int8(_) => DataType::Int8,
            ColumnData::Int16(_) => DataType::Int16,
            ColumnData::Int32(_) => DataType::Int32,
            ColumnData::Int64(_) => DataType::Int64,
            ColumnData::UInt8(_) => DataType::UInt8,
            ColumnData::UInt16(_) => DataType::UInt16,
            ColumnData::UInt32(_) => DataType::UInt32,
            ColumnData::UInt64(_) => DataType::UInt64,
            ColumnData::Float32(_) => DataType::Float32,
            ColumnData::Float64(_) => DataType::Float64,
            ColumnData::String(_) => DataType::String,
        }
    }

    /// Read the value at `index`, or None past the end
    pub fn value(&self, index: usize) -> Option<Value> {
        if index >= self.len() {
            return None;
        }
        Some(match self {
            ColumnData::Int8(v) => Value::Int8(v[index]),
            ColumnData::Int16(v) => Value::Int16(v[index]),
            ColumnData::Int32(v) => Value::Int32(v[index]),
            ColumnData::Int64(v) => Value::Int64(v[index]),
            ColumnData::UInt8(v) => Value::UInt8(v[index]),
            ColumnData::UInt16(v) => Value::UInt16(v[index]),
            ColumnData::UInt32(v) => Value::UInt32(v[index]),
            ColumnData::UInt64(v) => Value::UInt64(v[index]),
            ColumnData::Float32(v) => Value::Float32(v[index]),
            ColumnData::Float64(v) => Value::Float64(v[index]),
            ColumnData::String(v) => Value::String(v[index].clone()),
        })
    }

    /// Append a value of the matching type
    pub fn push(&mut self, value: Value) -> Result<(), BlockError> {
        match (self, value) {
            (ColumnData::Int8(v), Value::Int8(x)) => v.push(x),
            (ColumnData::Int16(v), Value::Int16(x)) => v.push(x),
            (ColumnData::Int32(v), Value::Int32(x)) => v.push(x),
            (ColumnData::Int64(v), Value::Int64(x)) => v.push(x),
            (ColumnData::UInt8(v), Value::UInt8(x)) => v.push(x),
            (ColumnData::UInt16(v), Value::UInt16(x)) => v.push(x),
            (ColumnData::UInt32(v), Value::UInt32(x)) => v.push(x),
            (ColumnData::UInt64(v), Value::UInt64(x)) => v.push(x),
            (ColumnData::Float32(v), Value::Float32(x)) => v.push(x),
            (ColumnData::Float64(v), Value::Float64(x)) => v.push(x),
            (ColumnData::String(v), Value::String(x)) => v.push(x),
            (data, value) => {
                return Err(BlockError::TypeMismatch {
                    column: data.data_type(),
                    value: value.data_type(),
                })
            }
        }
        Ok(())
    }

    /// Expand a single value into `len` repetitions
    pub fn repeated(value: &Value, len: usize) -> ColumnData {
        match value {
            Value::Int8(x) => ColumnData::Int8(vec![*x; len]),
            Value::Int16(x) => ColumnData::Int16(vec![*x; len]),
            Value::Int32(x) => ColumnData::Int32(vec![*x; len]),
            Value::Int64(x) => ColumnData::Int64(vec![*x; len]),
            Value::UInt8(x) => ColumnData::UInt8(vec![*x; len]),
            Value::UInt16(x) => ColumnData::UInt16(vec![*x; len]),
            Value::UInt32(x) => ColumnData::UInt32(vec![*x; len]),
            Value::UInt64(x) => ColumnData::UInt64(vec![*x; len]),
            Value::Float32(x) => ColumnData::Float32(vec![*x; len]),
            Value::Float64(x) => ColumnData::Float64(vec![*x; len]),
            Value::String(x) => ColumnData::String(vec![x.clone(); len]),
        }
    }

    /// Uncompressed in-memory size estimate in bytes
    pub fn byte_size(&self) -> usize {
        match self {
            ColumnData::Int8(v) => v.len(),
            ColumnData::Int16(v) => v.len() * 2,
            ColumnData::Int32(v) => v.len() * 4,
            ColumnData::Int64(v) => v.len() * 8,
            ColumnData::UInt8(v) => v.len(),
            ColumnData::UInt16(v) => v.len() * 2,
            ColumnData::UInt32(v) => v.len() * 4,
            ColumnData::UInt64(v) => v.len() * 8,
            ColumnData::Float32(v) => v.len() * 4,
            ColumnData::Float64(v) => v.len() * 8,
            ColumnData::String(v) => v.iter().map(|s| s.len() + 8).sum(),
        }
    }
}

/// A column: materialized storage or a constant repeated value
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Full(ColumnData),
    Const { len: usize, value: Value },
}

impl Column {
    /// Number of rows
    pub fn len(&self) -> usize {
        match self {
            Column::Full(data) => data.len(),
            Column::Const { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element type
    pub fn data_type(&self) -> DataType {
        match self {
            Column::Full(data) => data.data_type(),
            Column::Const { value, .. } => value.data_type(),
        }
    }

    /// Read the value at `index`, or None past the end
    pub fn value(&self, index: usize) -> Option<Value> {
        match self {
            Column::Full(data) => data.value(index),
            Column::Const { len, value } => (index < *len).then(|| value.clone()),
        }
    }

    /// Append a value; only materialized columns grow
    pub fn push(&mut self, value: Value) -> Result<(), BlockError> {
        match self {
            Column::Full(data) => data.push(value),
            Column::Const { .. } => Err(BlockError::ConstAppend),
        }
    }

    /// Convert to a materialized column, expanding constants
    pub fn materialized(self) -> Column {
        match self {
            Column::Full(_) => self,
            Column::Const { len, value } => Column::Full(ColumnData::repeated(&value, len)),
        }
    }

    /// Uncompressed in-memory size estimate in bytes
    pub fn byte_size(&self) -> usize {
        match self {
            Column::Full(data) => data.byte_size(),
            Column::Const { len, value } => ColumnData::repeated(value, 1).byte_size() * len,
        }
    }
}
