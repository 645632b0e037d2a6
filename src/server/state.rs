//! Per-query connection state

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::executor::{QueryIo, Stage};
use crate::protocol::Compression;

/// Row/byte deltas accumulated since the last progress packet
///
/// Producers add from stream callbacks; the connection task drains into a
/// Progress packet when the throttle allows.
#[derive(Debug, Default)]
pub struct ProgressCounters {
    rows: AtomicU64,
    bytes: AtomicU64,
}

impl ProgressCounters {
    pub fn add(&self, rows: u64, bytes: u64) {
        self.rows.fetch_add(rows, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Take the accumulated deltas, resetting them to zero
    pub fn take(&self) -> (u64, u64) {
        (
            self.rows.swap(0, Ordering::Relaxed),
            self.bytes.swap(0, Ordering::Relaxed),
        )
    }
}

/// Everything the handler tracks for one in-flight query
pub struct QueryState {
    pub query_id: u64,
    pub query: String,
    pub stage: Stage,
    pub compression: Compression,
    pub io: QueryIo,
    /// Set when the client asks to cancel; observed by the pipeline's
    /// cancellation checks
    pub cancelled: Arc<AtomicBool>,
    /// Set once EndOfStream went out; no Data or Progress afterwards
    pub sent_all_data: bool,
    pub progress: Arc<ProgressCounters>,
}

impl QueryState {
    pub fn new(
        query_id: u64,
        query: String,
        stage: Stage,
        compression: Compression,
        io: QueryIo,
    ) -> Self {
        QueryState {
            query_id,
            query,
            stage,
            compression,
            io,
            cancelled: Arc::new(AtomicBool::new(false)),
            sent_all_data: false,
            progress: Arc::new(ProgressCounters::default()),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_take_resets() {
        let counters = ProgressCounters::default();
        counters.add(3, 120);
        counters.add(2, 80);
        assert_eq!(counters.take(), (5, 200));
        assert_eq!(counters.take(), (0, 0));
    }

    #[test]
    fn test_cancel_flag() {
        let state = QueryState::new(
            7,
            "select t".into(),
            Stage::Complete,
            Compression::Disabled,
            QueryIo::default(),
        );
        assert!(!state.is_cancelled());
        state.cancel();
        assert!(state.is_cancelled());
    }
}
