//! CorvusDB - a column-oriented analytical database server
//!
//! The crate implements the query execution pipeline over columnar blocks
//! and the TCP wire protocol driving it:
//! - pull-based block streams with profiling, defaulting, and asynchronous
//!   pre-fetch stages
//! - the native columnar codec, varuint wire framing, and optional
//!   compressed payload frames
//! - a per-connection protocol handler multiplexing queries, bulk data,
//!   cancellation, and progress over one socket

pub mod block;
pub mod catalog;
pub mod executor;
pub mod protocol;
pub mod server;
pub mod stream;
