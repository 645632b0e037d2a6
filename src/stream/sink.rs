//! In-memory block sink

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::block::Block;

use super::{BlockOutputStream, StreamError, StreamResult};

/// Lifecycle position of an output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Created,
    Writing,
    Finished,
}

/// Everything a sink has observed, shared with the test or caller side
#[derive(Debug, Default)]
pub struct SinkState {
    pub blocks: Vec<Block>,
    pub prefixes: u32,
    pub suffixes: u32,
}

/// Collects written blocks in memory, enforcing the prefix/write/suffix order
pub struct MemoryOutputStream {
    state: Arc<Mutex<SinkState>>,
    phase: Phase,
}

impl MemoryOutputStream {
    pub fn new() -> Self {
        MemoryOutputStream {
            state: Arc::new(Mutex::new(SinkState::default())),
            phase: Phase::Created,
        }
    }

    /// Handle for inspecting what was written after the stream is consumed
    pub fn state(&self) -> Arc<Mutex<SinkState>> {
        self.state.clone()
    }
}

impl Default for MemoryOutputStream {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlockOutputStream for MemoryOutputStream {
    async fn write_prefix(&mut self) -> StreamResult<()> {
        if self.phase != Phase::Created {
            return Err(StreamError::Misuse("write_prefix called twice"));
        }
        self.phase = Phase::Writing;
        self.state.lock().prefixes += 1;
        Ok(())
    }

    async fn write(&mut self, block: Block) -> StreamResult<()> {
        if self.phase != Phase::Writing {
            return Err(StreamError::Misuse("write outside prefix/suffix bracket"));
        }
        self.state.lock().blocks.push(block);
        Ok(())
    }

    async fn write_suffix(&mut self) -> StreamResult<()> {
        if self.phase != Phase::Writing {
            return Err(StreamError::Misuse("write_suffix without write_prefix"));
        }
        self.phase = Phase::Finished;
        self.state.lock().suffixes += 1;
        Ok(())
    }
}
