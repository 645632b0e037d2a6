//! Wire protocol tests
//!
//! Framing primitives, the native block codec, compressed payload frames,
//! and exception payloads, driven through in-memory buffers.

use corvusdb::block::{Block, Column, ColumnData, DataType, NamedColumn, Value};
use corvusdb::protocol::{codes, compress, native, ProtocolError, WireException, WireReader,
    WireWriter};

fn sensor_block() -> Block {
    Block::from_columns(vec![
        NamedColumn::new(
            "ts",
            DataType::UInt64,
            Column::Full(ColumnData::UInt64(vec![1000, 1001, 1002, 1003])),
        ),
        NamedColumn::new(
            "temp",
            DataType::Float32,
            Column::Full(ColumnData::Float32(vec![21.5, 21.6, 21.4, 21.9])),
        ),
        NamedColumn::new(
            "site",
            DataType::String,
            Column::Full(ColumnData::String(vec![
                "север".into(),
                "".into(),
                "lab-2".into(),
                "lab-2".into(),
            ])),
        ),
        NamedColumn::new(
            "flag",
            DataType::Int8,
            Column::Full(ColumnData::Int8(vec![-1, 0, 1, 0])),
        ),
    ])
    .unwrap()
}

#[tokio::test]
async fn test_varuint_boundary_encodings() {
    let mut writer = WireWriter::new(Vec::new());
    for value in [0u64, 127, 128, 16383, 16384] {
        writer.write_varuint(value).await.unwrap();
    }
    let bytes = writer.into_inner().await.unwrap();
    // 1 + 1 + 2 + 2 + 3 bytes
    assert_eq!(bytes.len(), 9);

    let mut reader = WireReader::new(bytes.as_slice());
    for expected in [0u64, 127, 128, 16383, 16384] {
        assert_eq!(reader.read_varuint().await.unwrap(), expected);
    }
}

#[tokio::test]
async fn test_native_roundtrip_unicode_strings() {
    let block = sensor_block();

    let mut writer = WireWriter::new(Vec::new());
    native::write_block(&mut writer, &block).await.unwrap();
    let bytes = writer.into_inner().await.unwrap();

    let mut reader = WireReader::new(bytes.as_slice());
    let decoded = native::read_block(&mut reader).await.unwrap();
    assert_eq!(decoded, block);
}

#[tokio::test]
async fn test_native_roundtrip_through_compressed_frame() {
    let block = sensor_block();

    let mut encoder = WireWriter::new(Vec::new());
    native::write_block(&mut encoder, &block).await.unwrap();
    let payload = encoder.into_inner().await.unwrap();

    let mut writer = WireWriter::new(Vec::new());
    compress::write_frame(&mut writer, &payload).await.unwrap();
    let framed = writer.into_inner().await.unwrap();

    let mut reader = WireReader::new(framed.as_slice());
    let decompressed = compress::read_frame(&mut reader).await.unwrap();
    assert_eq!(decompressed, payload);

    let mut decoder = WireReader::new(decompressed.as_slice());
    let decoded = native::read_block(&mut decoder).await.unwrap();
    assert_eq!(decoded, block);
}

#[tokio::test]
async fn test_consecutive_blocks_share_one_stream() {
    let first = sensor_block();
    let second = first.sample();

    let mut writer = WireWriter::new(Vec::new());
    native::write_block(&mut writer, &first).await.unwrap();
    native::write_block(&mut writer, &second).await.unwrap();
    native::write_block(&mut writer, &Block::empty()).await.unwrap();
    let bytes = writer.into_inner().await.unwrap();

    let mut reader = WireReader::new(bytes.as_slice());
    assert_eq!(native::read_block(&mut reader).await.unwrap(), first);
    assert_eq!(native::read_block(&mut reader).await.unwrap(), second);
    assert!(native::read_block(&mut reader).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_truncated_block_payload_fails_cleanly() {
    let mut writer = WireWriter::new(Vec::new());
    native::write_block(&mut writer, &sensor_block()).await.unwrap();
    let bytes = writer.into_inner().await.unwrap();

    let mut reader = WireReader::new(&bytes[..bytes.len() / 2]);
    assert!(matches!(
        native::read_block(&mut reader).await,
        Err(ProtocolError::ConnectionClosed)
    ));
}

#[tokio::test]
async fn test_exception_payload_carries_error_kind() {
    let error = ProtocolError::UnknownDatabase("telemetry".into());
    let exception = WireException::from_error(&error);

    let mut writer = WireWriter::new(Vec::new());
    exception.write(&mut writer).await.unwrap();
    let bytes = writer.into_inner().await.unwrap();

    let mut reader = WireReader::new(bytes.as_slice());
    let decoded = WireException::read(&mut reader).await.unwrap();
    assert_eq!(decoded.code, codes::UNKNOWN_DATABASE);
    assert_eq!(decoded.name, "UnknownDatabase");
    assert!(decoded.message.contains("telemetry"));
    assert!(decoded.nested.is_none());
}

#[tokio::test]
async fn test_const_column_is_sent_materialized() {
    let block = Block::from_columns(vec![NamedColumn::new(
        "version",
        DataType::UInt32,
        Column::Const {
            len: 3,
            value: Value::UInt32(7),
        },
    )])
    .unwrap();

    let mut writer = WireWriter::new(Vec::new());
    native::write_block(&mut writer, &block).await.unwrap();
    let bytes = writer.into_inner().await.unwrap();

    let mut reader = WireReader::new(bytes.as_slice());
    let decoded = native::read_block(&mut reader).await.unwrap();
    assert_eq!(
        decoded.get("version").unwrap().column,
        Column::Full(ColumnData::UInt32(vec![7, 7, 7]))
    );
}
