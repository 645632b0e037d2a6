//! Wire framing primitives
//!
//! Buffered reader/writer halves speaking the protocol's primitive shapes:
//! varuints (continuation-bit encoding, little-endian septets), length-prefixed
//! UTF-8 strings, fixed-width little-endian integers, and raw byte runs. The
//! reader additionally supports a bounded-wait readability poll, which the
//! connection handler uses for shutdown checks and mid-query cancellation.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
    BufWriter};

use super::error::{ProtocolError, ProtocolResult};

/// Longest legal varuint encoding of a u64
const MAX_VARUINT_BYTES: usize = 10;

/// Upper bound on length-prefixed strings (queries, names, messages)
const MAX_STRING_SIZE: u64 = 64 * 1024 * 1024;

/// Buffered packet reader over one half of the socket
pub struct WireReader<R> {
    inner: BufReader<R>,
    eof: bool,
}

impl<R: AsyncRead + Unpin> WireReader<R> {
    pub fn new(inner: R) -> Self {
        WireReader {
            inner: BufReader::new(inner),
            eof: false,
        }
    }

    /// Wait up to `wait` for at least one readable byte
    ///
    /// Returns true when a byte can be read without blocking, or when the
    /// peer has closed the stream (check `is_eof` afterwards); false when the
    /// wait elapsed first.
    pub async fn poll(&mut self, wait: Duration) -> ProtocolResult<bool> {
        if self.eof || !self.inner.buffer().is_empty() {
            return Ok(true);
        }
        match tokio::time::timeout(wait, self.inner.fill_buf()).await {
            Ok(Ok(buf)) => {
                if buf.is_empty() {
                    self.eof = true;
                }
                Ok(true)
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Ok(false),
        }
    }

    /// True once the peer has closed its write side
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    pub async fn read_u8(&mut self) -> ProtocolResult<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf).await?;
        Ok(buf[0])
    }

    pub async fn read_u32_le(&mut self) -> ProtocolResult<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf).await?;
        Ok(u32::from_le_bytes(buf))
    }

    pub async fn read_u64_le(&mut self) -> ProtocolResult<u64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf).await?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Read a continuation-bit varuint
    pub async fn read_varuint(&mut self) -> ProtocolResult<u64> {
        let mut value: u64 = 0;
        for i in 0..MAX_VARUINT_BYTES {
            let byte = self.read_u8().await?;
            value |= ((byte & 0x7f) as u64) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(ProtocolError::Malformed("varuint longer than 10 bytes".into()))
    }

    /// Read a varuint-length-prefixed UTF-8 string
    pub async fn read_string(&mut self) -> ProtocolResult<String> {
        let len = self.read_varuint().await?;
        if len > MAX_STRING_SIZE {
            return Err(ProtocolError::Malformed(format!(
                "string of {} bytes exceeds limit",
                len
            )));
        }
        let mut buf = vec![0u8; len as usize];
        self.read_exact(&mut buf).await?;
        String::from_utf8(buf)
            .map_err(|_| ProtocolError::Malformed("invalid UTF-8 in string".into()))
    }

    pub async fn read_exact(&mut self, buf: &mut [u8]) -> ProtocolResult<()> {
        match self.inner.read_exact(buf).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                self.eof = true;
                Err(ProtocolError::ConnectionClosed)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Buffered packet writer over one half of the socket
pub struct WireWriter<W> {
    inner: BufWriter<W>,
}

impl<W: AsyncWrite + Unpin> WireWriter<W> {
    pub fn new(inner: W) -> Self {
        WireWriter {
            inner: BufWriter::new(inner),
        }
    }

    pub async fn write_u8(&mut self, value: u8) -> ProtocolResult<()> {
        self.inner.write_all(&[value]).await?;
        Ok(())
    }

    pub async fn write_u32_le(&mut self, value: u32) -> ProtocolResult<()> {
        self.inner.write_all(&value.to_le_bytes()).await?;
        Ok(())
    }

    pub async fn write_u64_le(&mut self, value: u64) -> ProtocolResult<()> {
        self.inner.write_all(&value.to_le_bytes()).await?;
        Ok(())
    }

    /// Write a continuation-bit varuint
    pub async fn write_varuint(&mut self, mut value: u64) -> ProtocolResult<()> {
        loop {
            let mut byte = (value & 0x7f) as u8;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
            }
            self.write_u8(byte).await?;
            if value == 0 {
                return Ok(());
            }
        }
    }

    /// Write a varuint-length-prefixed string
    pub async fn write_string(&mut self, value: &str) -> ProtocolResult<()> {
        self.write_varuint(value.len() as u64).await?;
        self.inner.write_all(value.as_bytes()).await?;
        Ok(())
    }

    pub async fn write_all(&mut self, buf: &[u8]) -> ProtocolResult<()> {
        self.inner.write_all(buf).await?;
        Ok(())
    }

    /// Push buffered bytes down to the socket
    pub async fn flush(&mut self) -> ProtocolResult<()> {
        self.inner.flush().await?;
        Ok(())
    }

    /// Flush and return the underlying writer
    pub async fn into_inner(mut self) -> ProtocolResult<W> {
        self.inner.flush().await?;
        Ok(self.inner.into_inner())
    }
}
