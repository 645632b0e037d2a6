//! Compressed payload framing
//!
//! When a query enables compression, block payloads (not the outer packet
//! frame) travel as self-delimiting frames: varuint compressed size, varuint
//! raw size, then the lz4-compressed bytes. Checksumming is left to the
//! storage-side codecs.

use lz4_flex::block::{compress, decompress};
use tokio::io::{AsyncRead, AsyncWrite};

use super::error::{ProtocolError, ProtocolResult};
use super::wire::{WireReader, WireWriter};

/// Upper bound on a single frame, compressed or raw
const MAX_FRAME_SIZE: u64 = 256 * 1024 * 1024;

/// Compress `payload` and write it as one frame
pub async fn write_frame<W: AsyncWrite + Unpin>(
    out: &mut WireWriter<W>,
    payload: &[u8],
) -> ProtocolResult<()> {
    let compressed = compress(payload);
    out.write_varuint(compressed.len() as u64).await?;
    out.write_varuint(payload.len() as u64).await?;
    out.write_all(&compressed).await?;
    Ok(())
}

/// Read one frame and return the decompressed payload
pub async fn read_frame<R: AsyncRead + Unpin>(
    input: &mut WireReader<R>,
) -> ProtocolResult<Vec<u8>> {
    let compressed_len = input.read_varuint().await?;
    let raw_len = input.read_varuint().await?;
    if compressed_len > MAX_FRAME_SIZE || raw_len > MAX_FRAME_SIZE {
        return Err(ProtocolError::Codec(format!(
            "frame of {} bytes ({} raw) exceeds limit",
            compressed_len, raw_len
        )));
    }

    let mut compressed = vec![0u8; compressed_len as usize];
    input.read_exact(&mut compressed).await?;

    let payload = decompress(&compressed, raw_len as usize)
        .map_err(|e| ProtocolError::Codec(format!("lz4: {}", e)))?;
    if payload.len() as u64 != raw_len {
        return Err(ProtocolError::Codec(format!(
            "frame declared {} raw bytes, got {}",
            raw_len,
            payload.len()
        )));
    }
    Ok(payload)
}
