//! Shared helpers for integration tests
//!
//! `TestClient` speaks the wire protocol over a real TCP socket;
//! `PipelineExecutor` lets a test hand the server an exact pipeline for a
//! given query text.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use corvusdb::block::Block;
use corvusdb::executor::{ExecutorError, ExecutorResult, QueryExecutor, QueryIo, Stage};
use corvusdb::protocol::{
    client, compress, native, server, Compression, ProtocolResult, WireException, WireReader,
    WireWriter,
};
use corvusdb::stream::{BlockInputStream, ProfileState, StreamResult};

/// Minimal protocol client driving one connection
pub struct TestClient {
    pub reader: WireReader<OwnedReadHalf>,
    pub writer: WireWriter<OwnedWriteHalf>,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let socket = TcpStream::connect(addr).await.expect("connect to test server");
        let (read_half, write_half) = socket.into_split();
        TestClient {
            reader: WireReader::new(read_half),
            writer: WireWriter::new(write_half),
        }
    }

    /// Send the client Hello and read the server's reply
    ///
    /// Returns `(server_name, major, minor, revision)`.
    pub async fn hello(&mut self, database: &str) -> ProtocolResult<(String, u64, u64, u64)> {
        self.writer.write_varuint(client::HELLO).await?;
        self.writer.write_string("corvusdb-test").await?;
        self.writer.write_varuint(0).await?;
        self.writer.write_varuint(1).await?;
        self.writer.write_varuint(1).await?;
        self.writer.write_string(database).await?;
        self.writer.flush().await?;

        let packet_type = self.reader.read_varuint().await?;
        assert_eq!(packet_type, server::HELLO, "expected server Hello");
        let name = self.reader.read_string().await?;
        let major = self.reader.read_varuint().await?;
        let minor = self.reader.read_varuint().await?;
        let revision = self.reader.read_varuint().await?;
        Ok((name, major, minor, revision))
    }

    pub async fn send_query(
        &mut self,
        query_id: u64,
        compression: Compression,
        query: &str,
    ) -> ProtocolResult<()> {
        self.writer.write_varuint(client::QUERY).await?;
        self.writer.write_u64_le(query_id).await?;
        self.writer.write_varuint(Stage::Complete.to_wire()).await?;
        self.writer.write_varuint(compression.to_wire()).await?;
        self.writer.write_string(query).await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub async fn send_data(
        &mut self,
        block: &Block,
        compression: Compression,
    ) -> ProtocolResult<()> {
        self.writer.write_varuint(client::DATA).await?;
        if compression.is_enabled() {
            let mut frame = WireWriter::new(Vec::new());
            native::write_block(&mut frame, block).await?;
            let payload = frame.into_inner().await?;
            compress::write_frame(&mut self.writer, &payload).await?;
        } else {
            native::write_block(&mut self.writer, block).await?;
        }
        self.writer.flush().await?;
        Ok(())
    }

    pub async fn send_cancel(&mut self) -> ProtocolResult<()> {
        self.writer.write_varuint(client::CANCEL).await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub async fn send_ping(&mut self) -> ProtocolResult<()> {
        self.writer.write_varuint(client::PING).await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub async fn read_packet_type(&mut self) -> ProtocolResult<u64> {
        self.reader.read_varuint().await
    }

    /// Read a Data packet payload (the type varuint was already consumed)
    pub async fn read_block(&mut self, compression: Compression) -> ProtocolResult<Block> {
        if compression.is_enabled() {
            let payload = compress::read_frame(&mut self.reader).await?;
            let mut frame = WireReader::new(payload.as_slice());
            native::read_block(&mut frame).await
        } else {
            native::read_block(&mut self.reader).await
        }
    }

    /// Read a Progress packet payload as `(rows, bytes)`
    pub async fn read_progress(&mut self) -> ProtocolResult<(u64, u64)> {
        let rows = self.reader.read_varuint().await?;
        let bytes = self.reader.read_varuint().await?;
        Ok((rows, bytes))
    }

    pub async fn read_exception(&mut self) -> ProtocolResult<WireException> {
        WireException::read(&mut self.reader).await
    }
}

type PipelineBuilder = Box<dyn Fn() -> QueryIo + Send + Sync>;

/// Executor serving pre-registered pipelines keyed by the query text
#[derive(Default)]
pub struct PipelineExecutor {
    builders: Mutex<HashMap<String, PipelineBuilder>>,
}

impl PipelineExecutor {
    pub fn new() -> Self {
        PipelineExecutor::default()
    }

    pub fn register(&self, query: &str, builder: impl Fn() -> QueryIo + Send + Sync + 'static) {
        self.builders
            .lock()
            .insert(query.to_string(), Box::new(builder));
    }
}

impl QueryExecutor for PipelineExecutor {
    fn execute(
        &self,
        query: &str,
        _database: Option<&str>,
        _stage: Stage,
    ) -> ExecutorResult<QueryIo> {
        let builders = self.builders.lock();
        let builder = builders
            .get(query)
            .ok_or_else(|| ExecutorError::InvalidQuery(format!("unregistered query: {}", query)))?;
        Ok(builder())
    }
}

/// Yields `remaining` one-row blocks, pausing before each one
pub struct SlowStream {
    pub remaining: u64,
    pub pause: Duration,
    pub profile: ProfileState,
}

impl SlowStream {
    pub fn new(remaining: u64, pause: Duration) -> Self {
        SlowStream {
            remaining,
            pause,
            profile: ProfileState::default(),
        }
    }
}

#[async_trait]
impl BlockInputStream for SlowStream {
    fn name(&self) -> &'static str {
        "Slow"
    }

    async fn read(&mut self) -> StreamResult<Block> {
        if self.profile.is_cancelled() || self.remaining == 0 {
            return Ok(Block::empty());
        }
        tokio::time::sleep(self.pause).await;
        self.remaining -= 1;

        let block = one_row_block();
        self.profile.account(&block);
        Ok(block)
    }

    fn profile(&mut self) -> Option<&mut ProfileState> {
        Some(&mut self.profile)
    }
}

/// A one-row block with a single UInt64 column
pub fn one_row_block() -> Block {
    use corvusdb::block::{Column, ColumnData, DataType, NamedColumn};
    Block::from_columns(vec![NamedColumn::new(
        "n",
        DataType::UInt64,
        Column::Full(ColumnData::UInt64(vec![1])),
    )])
    .unwrap()
}
