//! Per-stream execution profiling
//!
//! Streams that participate in progress reporting and cooperative
//! cancellation embed a `ProfileState`. The consumer installs a cancellation
//! check (consulted before each read) and, on the pipeline root, a progress
//! callback fired with per-block row/byte deltas.

use std::sync::Arc;

use crate::block::Block;

/// Shared check consulted before each read; true means stop producing
pub type CancelCheck = Arc<dyn Fn() -> bool + Send + Sync>;

/// Callback fired after each block with (rows, bytes) deltas
pub type ProgressCallback = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Row/byte counters plus the installed callbacks
#[derive(Default)]
pub struct ProfileState {
    /// Total rows produced by this stream so far
    pub rows: u64,
    /// Total uncompressed bytes produced by this stream so far
    pub bytes: u64,
    cancel: Option<CancelCheck>,
    progress: Option<ProgressCallback>,
}

impl ProfileState {
    /// Install the cancellation check
    pub fn set_cancel_check(&mut self, check: CancelCheck) {
        self.cancel = Some(check);
    }

    /// Install the progress callback
    pub fn set_progress_callback(&mut self, callback: ProgressCallback) {
        self.progress = Some(callback);
    }

    /// True iff the installed cancellation check asks to stop
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map(|c| c()).unwrap_or(false)
    }

    /// Account a produced block and fire the progress callback
    pub fn account(&mut self, block: &Block) {
        if block.is_empty() {
            return;
        }
        let rows = block.rows() as u64;
        let bytes = block.byte_size() as u64;
        self.rows += rows;
        self.bytes += bytes;
        if let Some(progress) = &self.progress {
            progress(rows, bytes);
        }
    }
}
