//! Query execution contract
//!
//! The connection handler is agnostic of how query text becomes a pipeline:
//! it hands the text to a `QueryExecutor` and gets back the streams and
//! sample schemas it needs to drive the wire. A real deployment plugs a SQL
//! frontend in here; this crate ships an in-memory reference executor for the
//! server binary and the test suites.

pub mod error;
pub mod memory;

pub use error::{ExecutorError, ExecutorResult};
pub use memory::MemoryExecutor;

use crate::block::Block;
use crate::stream::{BlockInputStream, BlockOutputStream};

/// How far query processing should be pushed before results are returned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stage {
    /// Only fetch the referenced columns
    FetchColumns,
    /// Process up to intermediate aggregation state
    WithMergeableState,
    /// Run the query to completion
    #[default]
    Complete,
}

impl Stage {
    pub fn from_wire(value: u64) -> Option<Stage> {
        match value {
            0 => Some(Stage::FetchColumns),
            1 => Some(Stage::WithMergeableState),
            2 => Some(Stage::Complete),
            _ => None,
        }
    }

    pub fn to_wire(self) -> u64 {
        match self {
            Stage::FetchColumns => 0,
            Stage::WithMergeableState => 1,
            Stage::Complete => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::FetchColumns => "fetch_columns",
            Stage::WithMergeableState => "with_mergeable_state",
            Stage::Complete => "complete",
        }
    }
}

/// Streams and sample schemas realizing one query
///
/// SELECT-like queries carry `input` (results to pull) and `in_sample` (the
/// result schema). INSERT-like queries carry `output` (where received blocks
/// go) and `out_sample` (the schema the client is expected to send).
#[derive(Default)]
pub struct QueryIo {
    pub input: Option<Box<dyn BlockInputStream>>,
    pub output: Option<Box<dyn BlockOutputStream>>,
    pub in_sample: Block,
    pub out_sample: Block,
}

/// Translates query text into a runnable pipeline
pub trait QueryExecutor: Send + Sync {
    fn execute(&self, query: &str, database: Option<&str>, stage: Stage)
        -> ExecutorResult<QueryIo>;
}
