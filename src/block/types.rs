//! Column data types
//!
//! A `DataType` names the element type of a column and knows how to build
//! empty, constant, and default-valued columns of itself. Type names are part
//! of the wire format and must stay stable.

use std::fmt;

use super::column::{Column, ColumnData, Value};
use super::error::BlockError;

/// Element type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    String,
}

impl DataType {
    /// Stable type name used on the wire
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Int8 => "Int8",
            DataType::Int16 => "Int16",
            DataType::Int32 => "Int32",
            DataType::Int64 => "Int64",
            DataType::UInt8 => "UInt8",
            DataType::UInt16 => "UInt16",
            DataType::UInt32 => "UInt32",
            DataType::UInt64 => "UInt64",
            DataType::Float32 => "Float32",
            DataType::Float64 => "Float64",
            DataType::String => "String",
        }
    }

    /// Resolve a type by its wire name
    pub fn by_name(name: &str) -> Option<DataType> {
        match name {
            "Int8" => Some(DataType::Int8),
            "Int16" => Some(DataType::Int16),
            "Int32" => Some(DataType::Int32),
            "Int64" => Some(DataType::Int64),
            "UInt8" => Some(DataType::UInt8),
            "UInt16" => Some(DataType::UInt16),
            "UInt32" => Some(DataType::UInt32),
            "UInt64" => Some(DataType::UInt64),
            "Float32" => Some(DataType::Float32),
            "Float64" => Some(DataType::Float64),
            "String" => Some(DataType::String),
            _ => None,
        }
    }

    /// Default value for this type (zero, or the empty string)
    pub fn default_value(&self) -> Value {
        match self {
            DataType::Int8 => Value::Int8(0),
            DataType::Int16 => Value::Int16(0),
            DataType::Int32 => Value::Int32(0),
            DataType::Int64 => Value::Int64(0),
            DataType::UInt8 => Value::UInt8(0),
            DataType::UInt16 => Value::UInt16(0),
            DataType::UInt32 => Value::UInt32(0),
            DataType::UInt64 => Value::UInt64(0),
            DataType::Float32 => Value::Float32(0.0),
            DataType::Float64 => Value::Float64(0.0),
            DataType::String => Value::String(String::new()),
        }
    }

    /// Build an empty materialized column of this type
    pub fn empty_column(&self) -> Column {
        let data = match self {
            DataType::Int8 => ColumnData::Int8(Vec::new()),
            DataType::Int16 => ColumnData::Int16(Vec::new()),
            DataType::Int32 => ColumnData::Int32(Vec::new()),
            DataType::Int64 => ColumnData::Int64(Vec::new()),
            DataType::UInt8 => ColumnData::UInt8(Vec::new()),
            DataType::UInt16 => ColumnData::UInt16(Vec::new()),
            DataType::UInt32 => ColumnData::UInt32(Vec::new()),
            DataType::UInt64 => ColumnData::UInt64(Vec::new()),
            DataType::Float32 => ColumnData::Float32(Vec::new()),
            DataType::Float64 => ColumnData::Float64(Vec::new()),
            DataType::String => ColumnData::String(Vec::new()),
        };
        Column::Full(data)
    }

    /// Build a constant column of this type
    pub fn const_column(&self, len: usize, value: Value) -> Result<Column, BlockError> {
        if value.data_type() != *self {
            return Err(BlockError::TypeMismatch {
                column: *self,
                value: value.data_type(),
            });
        }
        Ok(Column::Const { len, value })
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
