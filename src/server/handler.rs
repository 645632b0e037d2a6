//! Connection handler
//!
//! One task per accepted socket. The handler performs the handshake, then
//! loops receiving packets: a Query builds a pipeline through the executor
//! and is driven to completion before the next packet is considered. All
//! server-to-client packets leave through the handler's own writer, so data,
//! progress, exception, and end-of-stream packets can never interleave on the
//! wire; pipeline producers talk to the handler only through the cancellation
//! flag and the progress counters.

use std::future::Future;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tracing::{debug, error, info};

use crate::block::Block;
use crate::catalog::Catalog;
use crate::executor::{QueryExecutor, Stage};
use crate::protocol::{
    client, compress, native, server, Compression, ProtocolError, ProtocolResult, WireException,
    WireReader, WireWriter, DBMS_NAME, REVISION, VERSION_MAJOR, VERSION_MINOR,
};
use crate::stream::{self, AsynchronousStream, BlockInputStream, CancelCheck};

use super::state::QueryState;
use super::{Settings, ShutdownSignal};

/// Bound a protocol step with a deadline
async fn timed<T>(
    limit: Duration,
    what: &'static str,
    step: impl Future<Output = ProtocolResult<T>>,
) -> ProtocolResult<T> {
    match tokio::time::timeout(limit, step).await {
        Ok(result) => result,
        Err(_) => Err(ProtocolError::Timeout(what)),
    }
}

/// Per-connection protocol state machine
pub struct Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    reader: WireReader<ReadHalf<S>>,
    writer: WireWriter<WriteHalf<S>>,
    connection_id: u32,
    settings: Settings,
    catalog: Arc<RwLock<Catalog>>,
    executor: Arc<dyn QueryExecutor>,
    shutdown: ShutdownSignal,
    /// Database selected at handshake time
    database: Option<String>,
    /// In-flight query, if any
    state: Option<QueryState>,
    last_cancel_check: Instant,
    last_progress_send: Instant,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(
        socket: S,
        connection_id: u32,
        settings: Settings,
        catalog: Arc<RwLock<Catalog>>,
        executor: Arc<dyn QueryExecutor>,
        shutdown: ShutdownSignal,
    ) -> Self {
        let (read_half, write_half) = tokio::io::split(socket);
        Connection {
            reader: WireReader::new(read_half),
            writer: WireWriter::new(write_half),
            connection_id,
            settings,
            catalog,
            executor,
            shutdown,
            database: None,
            state: None,
            last_cancel_check: Instant::now(),
            last_progress_send: Instant::now(),
        }
    }

    /// Serve the connection until shutdown, disconnect, or a fatal error
    pub async fn run(mut self) {
        match self.run_impl().await {
            Ok(()) => info!(
                connection_id = self.connection_id,
                "done processing connection"
            ),
            Err(ProtocolError::ConnectionClosed) => {
                debug!(connection_id = self.connection_id, "client disconnected")
            }
            // a timed-out transfer closes the connection but is not a server fault
            Err(ProtocolError::Timeout(what)) => {
                debug!(connection_id = self.connection_id, what, "connection timed out")
            }
            Err(e) => error!(
                connection_id = self.connection_id,
                error = %e,
                "connection error"
            ),
        }
    }

    async fn run_impl(&mut self) -> ProtocolResult<()> {
        let limit = self.settings.receive_timeout;
        timed(limit, "handshake", self.handshake()).await?;

        loop {
            // Idle in poll_interval slices so shutdown is observed even while
            // no client packet arrives.
            loop {
                if self.shutdown.is_cancelled() {
                    info!(connection_id = self.connection_id, "shutting down");
                    return Ok(());
                }
                if self.reader.poll(self.settings.poll_interval).await? {
                    break;
                }
            }
            if self.reader.is_eof() {
                debug!(connection_id = self.connection_id, "client disconnected");
                return Ok(());
            }

            let started = Instant::now();
            let result = self.serve_query().await;
            self.state = None;

            match result {
                Ok(true) => info!(
                    connection_id = self.connection_id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "query processed"
                ),
                Ok(false) => {}
                Err(e) => {
                    if matches!(e, ProtocolError::Io(_) | ProtocolError::ConnectionClosed) {
                        return Err(e);
                    }
                    error!(
                        connection_id = self.connection_id,
                        code = e.code(),
                        error = %e,
                        "query failed"
                    );
                    self.send_exception(&WireException::from_error(&e)).await?;
                    if e.is_fatal() {
                        return Err(e);
                    }
                }
            }
        }
    }

    /// Receive one packet and, if it started a query, run it to completion
    async fn serve_query(&mut self) -> ProtocolResult<bool> {
        self.last_cancel_check = Instant::now();
        self.last_progress_send = Instant::now();

        let limit = self.settings.receive_timeout;
        let got_query = timed(limit, "receiving packet", self.receive_packet()).await?;
        if !got_query {
            return Ok(false);
        }

        let is_insert = self
            .state
            .as_ref()
            .map(|s| s.io.output.is_some())
            .unwrap_or(false);
        if is_insert {
            self.process_insert().await?;
        } else {
            self.process_select().await?;
        }
        self.send_end_of_stream().await?;
        Ok(true)
    }

    async fn handshake(&mut self) -> ProtocolResult<()> {
        let packet_type = self.reader.read_varuint().await?;
        if packet_type != client::HELLO {
            let e = ProtocolError::UnexpectedPacket("expected Hello");
            self.send_exception(&WireException::from_error(&e)).await?;
            return Err(e);
        }

        let client_name = self.reader.read_string().await?;
        let major = self.reader.read_varuint().await?;
        let minor = self.reader.read_varuint().await?;
        let revision = self.reader.read_varuint().await?;
        let database = self.reader.read_string().await?;

        if !database.is_empty() {
            if !self.catalog.read().has_database(&database) {
                let e = ProtocolError::UnknownDatabase(database);
                error!(connection_id = self.connection_id, error = %e, "handshake failed");
                self.send_exception(&WireException::from_error(&e)).await?;
                return Err(e);
            }
            self.database = Some(database);
        }

        info!(
            connection_id = self.connection_id,
            client = %client_name,
            major,
            minor,
            revision,
            database = self.database.as_deref().unwrap_or(""),
            "client connected"
        );

        self.writer.write_varuint(server::HELLO).await?;
        self.writer.write_string(DBMS_NAME).await?;
        self.writer.write_varuint(VERSION_MAJOR).await?;
        self.writer.write_varuint(VERSION_MINOR).await?;
        self.writer.write_varuint(REVISION).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Read one packet and dispatch it
    ///
    /// Returns true when a Query was received or an INSERT got another data
    /// block; false when the data terminator or a Cancel ended the exchange.
    /// Ping is answered inline and the wait continues.
    async fn receive_packet(&mut self) -> ProtocolResult<bool> {
        loop {
            let packet_type = self.reader.read_varuint().await?;
            match packet_type {
                client::QUERY => {
                    if self.state.is_some() {
                        return Err(ProtocolError::UnexpectedPacket("Query during a query"));
                    }
                    self.receive_query().await?;
                    return Ok(true);
                }
                client::DATA => {
                    if self.state.is_none() {
                        return Err(ProtocolError::UnexpectedPacket("Data without a query"));
                    }
                    return self.receive_data().await;
                }
                client::CANCEL => match &self.state {
                    Some(state) => {
                        info!(connection_id = self.connection_id, "query was cancelled");
                        state.cancel();
                        return Ok(false);
                    }
                    None => {
                        return Err(ProtocolError::UnexpectedPacket("Cancel without a query"))
                    }
                },
                client::PING => {
                    self.writer.write_varuint(server::PONG).await?;
                    self.writer.flush().await?;
                }
                client::HELLO => return Err(ProtocolError::UnexpectedHello),
                other => return Err(ProtocolError::UnknownPacket(other)),
            }
        }
    }

    async fn receive_query(&mut self) -> ProtocolResult<()> {
        let query_id = self.reader.read_u64_le().await?;

        let stage_raw = self.reader.read_varuint().await?;
        let stage = Stage::from_wire(stage_raw)
            .ok_or_else(|| ProtocolError::Malformed(format!("invalid stage: {}", stage_raw)))?;

        let compression_raw = self.reader.read_varuint().await?;
        let compression = Compression::from_wire(compression_raw).ok_or_else(|| {
            ProtocolError::Malformed(format!("invalid compression mode: {}", compression_raw))
        })?;

        let query = self.reader.read_string().await?;

        debug!(
            connection_id = self.connection_id,
            query_id,
            query = %query,
            stage = stage.as_str(),
            "received query"
        );

        let io = self
            .executor
            .execute(&query, self.database.as_deref(), stage)?;
        self.state = Some(QueryState::new(query_id, query, stage, compression, io));
        Ok(())
    }

    /// Decode one data block and hand it to the query's output stream
    ///
    /// Returns false for the empty block that terminates the client's data.
    async fn receive_data(&mut self) -> ProtocolResult<bool> {
        let compression = self
            .state
            .as_ref()
            .map(|s| s.compression)
            .unwrap_or_default();

        let block = if compression.is_enabled() {
            let payload = compress::read_frame(&mut self.reader).await?;
            let mut frame = WireReader::new(payload.as_slice());
            native::read_block(&mut frame).await?
        } else {
            native::read_block(&mut self.reader).await?
        };

        if block.is_empty() {
            return Ok(false);
        }

        let output = self
            .state
            .as_mut()
            .and_then(|s| s.io.output.as_mut())
            .ok_or(ProtocolError::UnexpectedPacket("Data for a query that takes none"))?;
        output.write(block).await?;
        Ok(true)
    }

    /// Drive a result-producing query: pull blocks, ship them, watch for
    /// cancellation between polls
    async fn process_select(&mut self) -> ProtocolResult<()> {
        let (input, cancelled, counters) = match self.state.as_mut() {
            Some(state) => match state.io.input.take() {
                Some(input) => (input, state.cancelled.clone(), state.progress.clone()),
                None => return Ok(()),
            },
            None => return Ok(()),
        };

        let mut root = AsynchronousStream::new(input);

        let flag = cancelled;
        let check: CancelCheck = Arc::new(move || flag.load(Ordering::Relaxed));
        stream::for_each_profile(&mut root, &mut |profile| {
            profile.set_cancel_check(check.clone())
        });

        if let Some(profile) = root.profile() {
            let sink = counters;
            profile.set_progress_callback(Arc::new(move |rows, bytes| sink.add(rows, bytes)));
        }

        debug!(
            connection_id = self.connection_id,
            "query pipeline:\n{}",
            stream::dump_tree(&mut root)
        );

        let started = Instant::now();
        loop {
            while !root.poll(self.settings.interactive_delay).await {
                self.check_query_cancelled().await?;
            }
            // the check throttles itself; run it per block as well so a fast
            // pipeline cannot outrun the cancel packet
            self.check_query_cancelled().await?;
            let block = root.read().await?;
            self.send_progress_if_due().await?;
            if block.is_empty() {
                break;
            }
            self.send_data(&block).await?;
        }

        let (rows, bytes) = stream::leaf_rows_bytes(&mut root);
        if rows != 0 {
            let secs = started.elapsed().as_secs_f64().max(f64::EPSILON);
            info!(
                connection_id = self.connection_id,
                rows,
                bytes,
                elapsed_ms = started.elapsed().as_millis() as u64,
                rows_per_sec = (rows as f64 / secs) as u64,
                "read from pipeline leaves"
            );
        }
        Ok(())
    }

    /// Drive an INSERT: announce the expected schema, then consume data
    /// blocks until the terminator
    async fn process_insert(&mut self) -> ProtocolResult<()> {
        let sample = match &self.state {
            Some(state) => state.io.out_sample.clone(),
            None => return Ok(()),
        };
        self.send_data(&sample).await?;

        match self.state.as_mut().and_then(|s| s.io.output.as_mut()) {
            Some(output) => output.write_prefix().await?,
            None => return Ok(()),
        }

        let limit = self.settings.receive_timeout;
        loop {
            let more = timed(limit, "receiving data", self.receive_packet()).await?;
            if !more {
                break;
            }
        }

        if let Some(output) = self.state.as_mut().and_then(|s| s.io.output.as_mut()) {
            output.write_suffix().await?;
        }
        Ok(())
    }

    /// Throttled mid-query cancellation check
    ///
    /// Consults the in-memory flags first; at most every `interactive_delay`
    /// also polls the socket, where the only legal packet is Cancel. A peer
    /// that disconnected mid-query counts as cancelled.
    async fn check_query_cancelled(&mut self) -> ProtocolResult<bool> {
        let (cancelled, sent_all_data) = match &self.state {
            Some(state) => (state.cancelled.clone(), state.sent_all_data),
            None => return Ok(true),
        };
        if cancelled.load(Ordering::Relaxed) || sent_all_data {
            return Ok(true);
        }
        if self.last_cancel_check.elapsed() < self.settings.interactive_delay {
            return Ok(false);
        }
        self.last_cancel_check = Instant::now();

        if self.reader.poll(Duration::ZERO).await? {
            if self.reader.is_eof() {
                info!(
                    connection_id = self.connection_id,
                    "client disconnected mid-query"
                );
                cancelled.store(true, Ordering::Relaxed);
                return Ok(true);
            }
            let packet_type = self.reader.read_varuint().await?;
            match packet_type {
                client::CANCEL => {
                    info!(connection_id = self.connection_id, "query was cancelled");
                    cancelled.store(true, Ordering::Relaxed);
                    return Ok(true);
                }
                other => return Err(ProtocolError::UnknownPacket(other)),
            }
        }
        Ok(false)
    }

    /// Encode a block into a Data packet and flush it
    async fn send_data(&mut self, block: &Block) -> ProtocolResult<()> {
        let compression = self
            .state
            .as_ref()
            .map(|s| s.compression)
            .unwrap_or_default();
        let limit = self.settings.send_timeout;

        timed(limit, "sending data", async {
            self.writer.write_varuint(server::DATA).await?;
            if compression.is_enabled() {
                let mut frame = WireWriter::new(Vec::new());
                native::write_block(&mut frame, block).await?;
                let payload = frame.into_inner().await?;
                compress::write_frame(&mut self.writer, &payload).await?;
            } else {
                native::write_block(&mut self.writer, block).await?;
            }
            self.writer.flush().await
        })
        .await
    }

    /// Drain accumulated progress deltas into a Progress packet when the
    /// throttle allows; suppressed after EndOfStream
    async fn send_progress_if_due(&mut self) -> ProtocolResult<()> {
        let counters = match &self.state {
            Some(state) if !state.sent_all_data => state.progress.clone(),
            _ => return Ok(()),
        };
        if self.last_progress_send.elapsed() < self.settings.interactive_delay {
            return Ok(());
        }
        self.last_progress_send = Instant::now();

        let (rows, bytes) = counters.take();
        self.writer.write_varuint(server::PROGRESS).await?;
        self.writer.write_varuint(rows).await?;
        self.writer.write_varuint(bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn send_exception(&mut self, exception: &WireException) -> ProtocolResult<()> {
        self.writer.write_varuint(server::EXCEPTION).await?;
        exception.write(&mut self.writer).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn send_end_of_stream(&mut self) -> ProtocolResult<()> {
        if let Some(state) = self.state.as_mut() {
            state.sent_all_data = true;
        }
        self.writer.write_varuint(server::END_OF_STREAM).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::MemoryExecutor;

    fn spawn_connection() -> tokio::io::DuplexStream {
        let (client, socket) = tokio::io::duplex(64 * 1024);
        let connection = Connection::new(
            socket,
            1,
            Settings::default(),
            Arc::new(RwLock::new(Catalog::new())),
            Arc::new(MemoryExecutor::new()),
            ShutdownSignal::new(),
        );
        tokio::spawn(connection.run());
        client
    }

    #[tokio::test]
    async fn test_handshake_then_ping() {
        let (read_half, write_half) = tokio::io::split(spawn_connection());
        let mut reader = WireReader::new(read_half);
        let mut writer = WireWriter::new(write_half);

        writer.write_varuint(client::HELLO).await.unwrap();
        writer.write_string("test-client").await.unwrap();
        writer.write_varuint(0).await.unwrap();
        writer.write_varuint(1).await.unwrap();
        writer.write_varuint(1).await.unwrap();
        writer.write_string("").await.unwrap();
        writer.flush().await.unwrap();

        assert_eq!(reader.read_varuint().await.unwrap(), server::HELLO);
        assert_eq!(reader.read_string().await.unwrap(), DBMS_NAME);
        assert_eq!(reader.read_varuint().await.unwrap(), VERSION_MAJOR);
        assert_eq!(reader.read_varuint().await.unwrap(), VERSION_MINOR);
        assert_eq!(reader.read_varuint().await.unwrap(), REVISION);

        writer.write_varuint(client::PING).await.unwrap();
        writer.flush().await.unwrap();
        assert_eq!(reader.read_varuint().await.unwrap(), server::PONG);
    }

    #[tokio::test]
    async fn test_non_hello_first_packet_is_rejected() {
        let (read_half, write_half) = tokio::io::split(spawn_connection());
        let mut reader = WireReader::new(read_half);
        let mut writer = WireWriter::new(write_half);

        writer.write_varuint(client::DATA).await.unwrap();
        writer.flush().await.unwrap();

        assert_eq!(reader.read_varuint().await.unwrap(), server::EXCEPTION);
        let exception = WireException::read(&mut reader).await.unwrap();
        assert_eq!(exception.name, "UnexpectedPacket");
    }
}
