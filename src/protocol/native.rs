//! Native columnar block codec
//!
//! Encodes a block as a column count, a row count (both u32 little-endian),
//! then per column: name, type name, payload. Numeric payloads are raw
//! little-endian values; string payloads are cumulative end offsets (u64
//! little-endian, one per row) followed by the concatenated bytes. Constant
//! columns are materialized on encode, so the decoded block is always fully
//! materialized.

use tokio::io::{AsyncRead, AsyncWrite};

use crate::block::{Block, Column, ColumnData, DataType, NamedColumn};

use super::error::{ProtocolError, ProtocolResult};
use super::wire::{WireReader, WireWriter};

/// Decoder limits; a frame violating them is corrupt or hostile
const MAX_COLUMNS: u32 = 1 << 16;
const MAX_ROWS: u32 = 1 << 30;
const MAX_STRING_PAYLOAD: u64 = 1 << 30;

/// Encode one block
pub async fn write_block<W: AsyncWrite + Unpin>(
    out: &mut WireWriter<W>,
    block: &Block,
) -> ProtocolResult<()> {
    out.write_u32_le(block.column_count() as u32).await?;
    out.write_u32_le(block.rows() as u32).await?;

    for col in block.iter() {
        out.write_string(&col.name).await?;
        out.write_string(col.data_type.name()).await?;

        let materialized;
        let data = match &col.column {
            Column::Full(data) => data,
            constant @ Column::Const { .. } => {
                materialized = constant.clone().materialized();
                match &materialized {
                    Column::Full(data) => data,
                    Column::Const { .. } => unreachable!("materialized returns Full"),
                }
            }
        };
        write_column_data(out, data).await?;
    }
    Ok(())
}

/// Decode one block
pub async fn read_block<R: AsyncRead + Unpin>(
    input: &mut WireReader<R>,
) -> ProtocolResult<Block> {
    let columns = input.read_u32_le().await?;
    let rows = input.read_u32_le().await?;
    if columns > MAX_COLUMNS {
        return Err(ProtocolError::Codec(format!("{} columns exceeds limit", columns)));
    }
    if rows > MAX_ROWS {
        return Err(ProtocolError::Codec(format!("{} rows exceeds limit", rows)));
    }

    let mut block = Block::empty();
    for _ in 0..columns {
        let name = input.read_string().await?;
        let type_name = input.read_string().await?;
        let data_type = DataType::by_name(&type_name)
            .ok_or_else(|| ProtocolError::Codec(format!("unknown data type: {}", type_name)))?;

        let data = read_column_data(input, data_type, rows as usize).await?;
        block.insert(NamedColumn::new(name, data_type, Column::Full(data)))?;
    }
    Ok(block)
}

macro_rules! write_numeric {
    ($out:expr, $values:expr) => {{
        for value in $values {
            $out.write_all(&value.to_le_bytes()).await?;
        }
    }};
}

async fn write_column_data<W: AsyncWrite + Unpin>(
    out: &mut WireWriter<W>,
    data: &ColumnData,
) -> ProtocolResult<()> {
    match data {
        ColumnData::Int8(v) => write_numeric!(out, v),
        ColumnData::Int16(v) => write_numeric!(out, v),
        ColumnData::Int32(v) => write_numeric!(out, v),
        ColumnData::Int64(v) => write_numeric!(out, v),
        ColumnData::UInt8(v) => out.write_all(v).await?,
        ColumnData::UInt16(v) => write_numeric!(out, v),
        ColumnData::UInt32(v) => write_numeric!(out, v),
        ColumnData::UInt64(v) => write_numeric!(out, v),
        ColumnData::Float32(v) => write_numeric!(out, v),
        ColumnData::Float64(v) => write_numeric!(out, v),
        ColumnData::String(v) => {
            let mut end: u64 = 0;
            for s in v {
                end += s.len() as u64;
                out.write_u64_le(end).await?;
            }
            for s in v {
                out.write_all(s.as_bytes()).await?;
            }
        }
    }
    Ok(())
}

macro_rules! read_numeric {
    ($input:expr, $rows:expr, $ty:ty) => {{
        let mut values = Vec::with_capacity($rows);
        let mut buf = [0u8; std::mem::size_of::<$ty>()];
        for _ in 0..$rows {
            $input.read_exact(&mut buf).await?;
            values.push(<$ty>::from_le_bytes(buf));
        }
        values
    }};
}

async fn read_column_data<R: AsyncRead + Unpin>(
    input: &mut WireReader<R>,
    data_type: DataType,
    rows: usize,
) -> ProtocolResult<ColumnData> {
    Ok(match data_type {
        DataType::Int8 => ColumnData::Int8(read_numeric!(input, rows, i8)),
        DataType::Int16 => ColumnData::Int16(read_numeric!(input, rows, i16)),
        DataType::Int32 => ColumnData::Int32(read_numeric!(input, rows, i32)),
        DataType::Int64 => ColumnData::Int64(read_numeric!(input, rows, i64)),
        DataType::UInt8 => {
            let mut values = vec![0u8; rows];
            input.read_exact(&mut values).await?;
            ColumnData::UInt8(values)
        }
        DataType::UInt16 => ColumnData::UInt16(read_numeric!(input, rows, u16)),
        DataType::UInt32 => ColumnData::UInt32(read_numeric!(input, rows, u32)),
        DataType::UInt64 => ColumnData::UInt64(read_numeric!(input, rows, u64)),
        DataType::Float32 => ColumnData::Float32(read_numeric!(input, rows, f32)),
        DataType::Float64 => ColumnData::Float64(read_numeric!(input, rows, f64)),
        DataType::String => {
            let mut offsets = Vec::with_capacity(rows);
            let mut previous: u64 = 0;
            for _ in 0..rows {
                let end = input.read_u64_le().await?;
                if end < previous || end > MAX_STRING_PAYLOAD {
                    return Err(ProtocolError::Codec(format!(
                        "invalid string offset: {}",
                        end
                    )));
                }
                offsets.push(end);
                previous = end;
            }

            let total = offsets.last().copied().unwrap_or(0);
            let mut bytes = vec![0u8; total as usize];
            input.read_exact(&mut bytes).await?;

            let mut values = Vec::with_capacity(rows);
            let mut start: usize = 0;
            for end in offsets {
                let end = end as usize;
                let s = std::str::from_utf8(&bytes[start..end])
                    .map_err(|_| ProtocolError::Codec("invalid UTF-8 in string column".into()))?;
                values.push(s.to_string());
                start = end;
            }
            ColumnData::String(values)
        }
    })
}
