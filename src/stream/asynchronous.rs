//! Asynchronous pre-fetching stage
//!
//! Runs its upstream on a background task so that (1) pipeline stages overlap
//! and (2) the consumer can poll for readiness without blocking, which is what
//! makes mid-query cancellation checks possible. Exactly one worker is in
//! flight at any time; the buffered block is owned by the worker until ready
//! and handed to the consumer on `read()`.

use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::block::Block;

use super::profile::ProfileState;
use super::{BlockInputStream, StreamError, StreamResult};

type WorkerOutput = (Box<dyn BlockInputStream>, StreamResult<Block>);

enum State {
    /// No computation dispatched yet
    Idle(Box<dyn BlockInputStream>),
    /// A worker is computing the next block
    Running(JoinHandle<WorkerOutput>),
    /// A result is buffered; the upstream is back (unless the worker died)
    Ready(Option<Box<dyn BlockInputStream>>, StreamResult<Block>),
    /// Upstream terminated or errored; reads keep returning the terminator
    Finished(Option<Box<dyn BlockInputStream>>),
}

pub struct AsynchronousStream {
    state: State,
    id: String,
    profile: ProfileState,
}

impl AsynchronousStream {
    pub fn new(input: Box<dyn BlockInputStream>) -> Self {
        let id = format!("Asynchronous({})", input.id());
        AsynchronousStream {
            state: State::Idle(input),
            id,
            profile: ProfileState::default(),
        }
    }

    /// Wait up to `wait` for the next result to become ready, dispatching the
    /// first worker if none has run yet. True iff `read()` will not block on
    /// upstream work. Readiness is sticky until the buffered result is taken.
    pub async fn poll(&mut self, wait: Duration) -> bool {
        match std::mem::replace(&mut self.state, State::Finished(None)) {
            State::Idle(input) => self.dispatch(input),
            other => self.state = other,
        }

        match std::mem::replace(&mut self.state, State::Finished(None)) {
            State::Running(mut handle) => match tokio::time::timeout(wait, &mut handle).await {
                Ok(Ok((input, result))) => {
                    self.state = State::Ready(Some(input), result);
                    true
                }
                Ok(Err(e)) => {
                    self.state = State::Ready(None, Err(StreamError::Worker(e.to_string())));
                    true
                }
                Err(_) => {
                    self.state = State::Running(handle);
                    false
                }
            },
            other => {
                self.state = other;
                true
            }
        }
    }

    fn dispatch(&mut self, mut input: Box<dyn BlockInputStream>) {
        self.state = State::Running(tokio::spawn(async move {
            let result = input.read().await;
            (input, result)
        }));
    }
}

#[async_trait]
impl BlockInputStream for AsynchronousStream {
    fn name(&self) -> &'static str {
        "Asynchronous"
    }

    fn id(&self) -> String {
        self.id.clone()
    }

    async fn read(&mut self) -> StreamResult<Block> {
        if self.profile.is_cancelled() {
            return Ok(Block::empty());
        }

        let (input, result) = match std::mem::replace(&mut self.state, State::Finished(None)) {
            // First read computes synchronously on the caller's task; no
            // point paying a task switch before any block exists.
            State::Idle(mut input) => {
                let result = input.read().await;
                (Some(input), result)
            }
            State::Running(handle) => match handle.await {
                Ok((input, result)) => (Some(input), result),
                Err(e) => (None, Err(StreamError::Worker(e.to_string()))),
            },
            State::Ready(input, result) => (input, result),
            State::Finished(input) => {
                self.state = State::Finished(input);
                return Ok(Block::empty());
            }
        };

        match result {
            Ok(block) if !block.is_empty() => {
                // Start computing the next block before handing this one out
                match input {
                    Some(input) => self.dispatch(input),
                    None => self.state = State::Finished(None),
                }
                self.profile.account(&block);
                Ok(block)
            }
            Ok(terminator) => {
                self.state = State::Finished(input);
                Ok(terminator)
            }
            Err(e) => {
                self.state = State::Finished(input);
                Err(e)
            }
        }
    }

    fn children(&mut self) -> Vec<&mut dyn BlockInputStream> {
        match &mut self.state {
            State::Idle(input)
            | State::Ready(Some(input), _)
            | State::Finished(Some(input)) => vec![input.as_mut()],
            _ => Vec::new(),
        }
    }

    fn profile(&mut self) -> Option<&mut ProfileState> {
        Some(&mut self.profile)
    }
}

impl Drop for AsynchronousStream {
    fn drop(&mut self) {
        if let State::Running(handle) = &self.state {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::block::{Column, ColumnData, DataType, NamedColumn};
    use crate::stream::BlocksListInputStream;

    fn block_of(values: Vec<u64>) -> Block {
        Block::from_columns(vec![NamedColumn::new(
            "n",
            DataType::UInt64,
            Column::Full(ColumnData::UInt64(values)),
        )])
        .unwrap()
    }

    struct FailingStream {
        reads: u32,
    }

    #[async_trait]
    impl BlockInputStream for FailingStream {
        fn name(&self) -> &'static str {
            "Failing"
        }

        async fn read(&mut self) -> StreamResult<Block> {
            self.reads += 1;
            if self.reads == 1 {
                Ok(block_of(vec![1]))
            } else {
                Err(StreamError::Upstream("boom".to_string()))
            }
        }
    }

    #[tokio::test]
    async fn test_preserves_block_sequence() {
        let blocks = vec![block_of(vec![1, 2, 3]), block_of(vec![4, 5])];
        let source = BlocksListInputStream::new(blocks.clone());
        let mut stream = AsynchronousStream::new(Box::new(source));

        assert_eq!(stream.read().await.unwrap(), blocks[0]);
        assert_eq!(stream.read().await.unwrap(), blocks[1]);
        assert!(stream.read().await.unwrap().is_empty());
        // non-restartable: terminator repeats
        assert!(stream.read().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_poll_then_read() {
        let source = BlocksListInputStream::new(vec![block_of(vec![7])]);
        let mut stream = AsynchronousStream::new(Box::new(source));

        while !stream.poll(Duration::from_millis(10)).await {}
        assert_eq!(stream.read().await.unwrap(), block_of(vec![7]));

        while !stream.poll(Duration::from_millis(10)).await {}
        assert!(stream.read().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_worker_error_reraised_on_read() {
        let mut stream = AsynchronousStream::new(Box::new(FailingStream { reads: 0 }));

        assert_eq!(stream.read().await.unwrap(), block_of(vec![1]));
        assert!(matches!(
            stream.read().await,
            Err(StreamError::Upstream(_))
        ));
        // errors terminate the stream
        assert!(stream.read().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_returns_terminator() {
        let blocks: Vec<Block> = (0..100).map(|_| block_of(vec![0])).collect();
        let source = BlocksListInputStream::new(blocks);
        let mut stream = AsynchronousStream::new(Box::new(source));

        let flag = Arc::new(AtomicBool::new(false));
        let check = flag.clone();
        stream
            .profile()
            .unwrap()
            .set_cancel_check(Arc::new(move || check.load(Ordering::Relaxed)));

        assert!(!stream.read().await.unwrap().is_empty());
        flag.store(true, Ordering::Relaxed);
        assert!(stream.read().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_id_is_structural() {
        let make = || {
            AsynchronousStream::new(Box::new(BlocksListInputStream::new(Vec::new())))
        };
        assert_eq!(make().id(), "Asynchronous(BlocksList)");
        assert_eq!(make().id(), make().id());
    }
}
