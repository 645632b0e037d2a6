//! Block streams - pull/push operator model
//!
//! The query pipeline is a tree of streams moving blocks between stages. A
//! `BlockInputStream` is pulled with `read()` until it yields the empty block;
//! a `BlockOutputStream` is pushed with a prefix/write/suffix lifecycle.
//! Parents own their children; the tree is walked for dumping, callback
//! installation, and leaf counter roll-up.

pub mod adding_default;
pub mod asynchronous;
pub mod error;
pub mod profile;
pub mod sink;
pub mod source;

pub use adding_default::AddingDefaultStream;
pub use asynchronous::AsynchronousStream;
pub use error::{StreamError, StreamResult};
pub use profile::{CancelCheck, ProfileState, ProgressCallback};
pub use sink::{MemoryOutputStream, SinkState};
pub use source::BlocksListInputStream;

use std::fmt::Write as _;

use async_trait::async_trait;

use crate::block::Block;

/// A lazy, finite, non-restartable producer of blocks
///
/// `read()` yields the empty block exactly once to terminate; further reads
/// keep yielding it. Structural accessors are safe to call at any point of
/// the stream's life.
#[async_trait]
pub trait BlockInputStream: Send {
    /// Short operator name for logs and tree dumps
    fn name(&self) -> &'static str;

    /// Deterministic identifier derived from the name and the children's ids
    fn id(&self) -> String {
        self.name().to_string()
    }

    /// Pull the next block; the empty block signals end-of-stream
    async fn read(&mut self) -> StreamResult<Block>;

    /// Child streams, for tree traversal
    fn children(&mut self) -> Vec<&mut dyn BlockInputStream> {
        Vec::new()
    }

    /// Profiling view, if this stream participates in progress/cancellation
    fn profile(&mut self) -> Option<&mut ProfileState> {
        None
    }
}

/// A consumer of blocks with an explicit prefix/write/suffix lifecycle
#[async_trait]
pub trait BlockOutputStream: Send {
    /// Called once before any data
    async fn write_prefix(&mut self) -> StreamResult<()>;

    /// Write one block
    async fn write(&mut self, block: Block) -> StreamResult<()>;

    /// Called once after the last block
    async fn write_suffix(&mut self) -> StreamResult<()>;
}

/// Render the stream tree, one operator per line, children indented
pub fn dump_tree(stream: &mut dyn BlockInputStream) -> String {
    fn walk(stream: &mut dyn BlockInputStream, depth: usize, out: &mut String) {
        let _ = writeln!(out, "{:indent$}{}", "", stream.name(), indent = depth * 2);
        for child in stream.children() {
            walk(child, depth + 1, out);
        }
    }

    let mut out = String::new();
    walk(stream, 0, &mut out);
    out
}

/// Apply `f` to the profiling view of every stream in the tree
pub fn for_each_profile(stream: &mut dyn BlockInputStream, f: &mut dyn FnMut(&mut ProfileState)) {
    if let Some(profile) = stream.profile() {
        f(profile);
    }
    for child in stream.children() {
        for_each_profile(child, f);
    }
}

/// Sum the row/byte counters of all childless descendants
///
/// Distinguishes work done at I/O leaves from work amplified by intermediate
/// operators.
pub fn leaf_rows_bytes(stream: &mut dyn BlockInputStream) -> (u64, u64) {
    {
        let children = stream.children();
        if !children.is_empty() {
            return children
                .into_iter()
                .map(leaf_rows_bytes)
                .fold((0, 0), |(r, b), (cr, cb)| (r + cr, b + cb));
        }
    }
    stream
        .profile()
        .map(|p| (p.rows, p.bytes))
        .unwrap_or((0, 0))
}
