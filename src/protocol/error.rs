//! Protocol error types and wire error codes

use thiserror::Error;

use crate::block::BlockError;
use crate::executor::ExecutorError;
use crate::stream::StreamError;

/// Result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Stable error codes carried in Exception packets
pub mod codes {
    pub const UNKNOWN: u64 = 1;
    pub const UNKNOWN_DATABASE: u64 = 2;
    pub const UNEXPECTED_PACKET: u64 = 3;
    pub const UNKNOWN_PACKET: u64 = 4;
    pub const DUPLICATE_COLUMN: u64 = 5;
    pub const SHAPE_MISMATCH: u64 = 6;
    pub const PROTOCOL_MISUSE: u64 = 7;
    pub const CODEC: u64 = 8;
    pub const UPSTREAM: u64 = 9;
    pub const TIMEOUT: u64 = 10;
}

/// Errors raised by the protocol layer and the connection handler
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed by peer")]
    ConnectionClosed,

    /// Known packet type arriving where the protocol does not allow it
    #[error("unexpected packet from client: {0}")]
    UnexpectedPacket(&'static str),

    /// Hello is only valid as the very first packet of a connection
    #[error("unexpected Hello after handshake")]
    UnexpectedHello,

    /// Packet type code the server does not know; the byte stream is
    /// desynchronized and the connection cannot continue
    #[error("unknown packet from client: {0}")]
    UnknownPacket(u64),

    #[error("unknown database: {0}")]
    UnknownDatabase(String),

    /// Malformed frame: bad varuint, oversized string, invalid UTF-8, ...
    #[error("malformed packet: {0}")]
    Malformed(String),

    /// Block payload could not be encoded or decoded
    #[error("codec error: {0}")]
    Codec(String),

    #[error("timeout while {0}")]
    Timeout(&'static str),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error(transparent)]
    Block(#[from] BlockError),
}

impl ProtocolError {
    /// Wire code for the Exception packet
    pub fn code(&self) -> u64 {
        match self {
            ProtocolError::UnknownDatabase(_) => codes::UNKNOWN_DATABASE,
            ProtocolError::UnexpectedPacket(_) | ProtocolError::UnexpectedHello => {
                codes::UNEXPECTED_PACKET
            }
            ProtocolError::UnknownPacket(_) => codes::UNKNOWN_PACKET,
            ProtocolError::Malformed(_) | ProtocolError::Codec(_) => codes::CODEC,
            ProtocolError::Timeout(_) => codes::TIMEOUT,
            ProtocolError::Block(e) | ProtocolError::Stream(StreamError::Block(e)) => match e {
                BlockError::DuplicateColumn(_) => codes::DUPLICATE_COLUMN,
                BlockError::ShapeMismatch { .. } => codes::SHAPE_MISMATCH,
                _ => codes::UNKNOWN,
            },
            ProtocolError::Stream(StreamError::Misuse(_)) => codes::PROTOCOL_MISUSE,
            ProtocolError::Stream(StreamError::Upstream(_))
            | ProtocolError::Stream(StreamError::Worker(_))
            | ProtocolError::Executor(_) => codes::UPSTREAM,
            ProtocolError::Io(_) | ProtocolError::ConnectionClosed => codes::UNKNOWN,
        }
    }

    /// Stable kind name for the Exception packet
    pub fn kind(&self) -> &'static str {
        match self.code() {
            codes::UNKNOWN_DATABASE => "UnknownDatabase",
            codes::UNEXPECTED_PACKET => "UnexpectedPacket",
            codes::UNKNOWN_PACKET => "UnknownPacket",
            codes::DUPLICATE_COLUMN => "DuplicateColumn",
            codes::SHAPE_MISMATCH => "ShapeMismatch",
            codes::PROTOCOL_MISUSE => "ProtocolMisuse",
            codes::CODEC => "CodecError",
            codes::UPSTREAM => "UpstreamError",
            codes::TIMEOUT => "Timeout",
            _ => "Unknown",
        }
    }

    /// True for errors after which the connection cannot keep serving
    /// queries: a desynchronized stream, a dead socket, or a transfer that
    /// timed out midway.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProtocolError::UnknownPacket(_)
                | ProtocolError::UnexpectedHello
                | ProtocolError::Timeout(_)
                | ProtocolError::Io(_)
                | ProtocolError::ConnectionClosed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_mapping() {
        let err = ProtocolError::Block(BlockError::DuplicateColumn("a".into()));
        assert_eq!(err.code(), codes::DUPLICATE_COLUMN);
        assert_eq!(err.kind(), "DuplicateColumn");

        let err = ProtocolError::Stream(StreamError::Misuse("x"));
        assert_eq!(err.code(), codes::PROTOCOL_MISUSE);

        let err = ProtocolError::UnknownPacket(42);
        assert_eq!(err.kind(), "UnknownPacket");
    }

    #[test]
    fn test_fatality() {
        assert!(ProtocolError::UnknownPacket(9).is_fatal());
        assert!(ProtocolError::UnexpectedHello.is_fatal());
        assert!(!ProtocolError::UnexpectedPacket("Data").is_fatal());
        assert!(!ProtocolError::UnknownDatabase("d".into()).is_fatal());
    }
}
