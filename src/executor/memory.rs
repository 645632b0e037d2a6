//! In-memory reference executor
//!
//! Keeps named tables (schema plus a list of blocks) behind a lock and
//! understands a three-verb placeholder grammar standing in for a real SQL
//! frontend:
//!
//! - `create <table> <col>:<Type> ...`
//! - `insert <table>` - returns an output stream appending received blocks
//! - `select <table>` - returns an input stream over the stored blocks
//!
//! Stored blocks may miss columns that were added to the schema later; the
//! select pipeline reconciles them with a defaulting stage.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::block::{Block, DataType, NamedColumn};
use crate::stream::{
    AddingDefaultStream, BlockOutputStream, BlocksListInputStream, StreamError, StreamResult,
};

use super::error::{ExecutorError, ExecutorResult};
use super::{QueryExecutor, QueryIo, Stage};

type Schema = Vec<(String, DataType)>;

#[derive(Default)]
struct Table {
    schema: Schema,
    blocks: Vec<Block>,
}

type Tables = Arc<RwLock<HashMap<String, Table>>>;

/// Executor over in-memory tables
#[derive(Default)]
pub struct MemoryExecutor {
    tables: Tables,
}

impl MemoryExecutor {
    pub fn new() -> Self {
        MemoryExecutor::default()
    }

    /// Register a table up front, outside the query path
    pub fn create_table(&self, name: &str, schema: Schema) {
        self.tables
            .write()
            .insert(name.to_string(), Table { schema, blocks: Vec::new() });
    }

    fn schema_of(&self, table: &str) -> ExecutorResult<Schema> {
        self.tables
            .read()
            .get(table)
            .map(|t| t.schema.clone())
            .ok_or_else(|| ExecutorError::TableNotFound(table.to_string()))
    }
}

fn sample_block(schema: &Schema) -> Block {
    let mut block = Block::empty();
    for (name, ty) in schema {
        // empty columns of a fresh block cannot collide or mismatch
        let _ = block.insert(NamedColumn::new(name.clone(), *ty, ty.empty_column()));
    }
    block
}

fn parse_schema(parts: &mut std::str::SplitWhitespace<'_>) -> ExecutorResult<Schema> {
    let mut schema = Schema::new();
    for part in parts {
        let (name, type_name) = part
            .split_once(':')
            .ok_or_else(|| ExecutorError::InvalidQuery(format!("expected col:Type, got {}", part)))?;
        let ty = DataType::by_name(type_name)
            .ok_or_else(|| ExecutorError::InvalidQuery(format!("unknown type: {}", type_name)))?;
        schema.push((name.to_string(), ty));
    }
    if schema.is_empty() {
        return Err(ExecutorError::InvalidQuery("table needs at least one column".into()));
    }
    Ok(schema)
}

impl QueryExecutor for MemoryExecutor {
    fn execute(
        &self,
        query: &str,
        _database: Option<&str>,
        _stage: Stage,
    ) -> ExecutorResult<QueryIo> {
        let mut parts = query.split_whitespace();
        let verb = parts
            .next()
            .ok_or_else(|| ExecutorError::InvalidQuery("empty query".into()))?
            .to_ascii_lowercase();
        let table = parts
            .next()
            .ok_or_else(|| ExecutorError::InvalidQuery("missing table name".into()))?
            .to_string();

        match verb.as_str() {
            "create" => {
                let schema = parse_schema(&mut parts)?;
                self.create_table(&table, schema);
                Ok(QueryIo::default())
            }
            "select" => {
                let (schema, blocks) = {
                    let tables = self.tables.read();
                    let table = tables
                        .get(&table)
                        .ok_or_else(|| ExecutorError::TableNotFound(table.clone()))?;
                    (table.schema.clone(), table.blocks.clone())
                };
                let source = BlocksListInputStream::new(blocks);
                let input = AddingDefaultStream::new(Box::new(source), schema.clone());
                Ok(QueryIo {
                    input: Some(Box::new(input)),
                    in_sample: sample_block(&schema),
                    ..QueryIo::default()
                })
            }
            "insert" => {
                let schema = self.schema_of(&table)?;
                let output = TableOutputStream::new(table, self.tables.clone());
                Ok(QueryIo {
                    output: Some(Box::new(output)),
                    out_sample: sample_block(&schema),
                    ..QueryIo::default()
                })
            }
            other => Err(ExecutorError::InvalidQuery(format!("unknown verb: {}", other))),
        }
    }
}

/// Appends received blocks to a table
struct TableOutputStream {
    table: String,
    tables: Tables,
    writing: bool,
    finished: bool,
}

impl TableOutputStream {
    fn new(table: String, tables: Tables) -> Self {
        TableOutputStream {
            table,
            tables,
            writing: false,
            finished: false,
        }
    }
}

#[async_trait]
impl BlockOutputStream for TableOutputStream {
    async fn write_prefix(&mut self) -> StreamResult<()> {
        if self.writing || self.finished {
            return Err(StreamError::Misuse("write_prefix called twice"));
        }
        self.writing = true;
        Ok(())
    }

    async fn write(&mut self, block: Block) -> StreamResult<()> {
        if !self.writing {
            return Err(StreamError::Misuse("write outside prefix/suffix bracket"));
        }
        let mut tables = self.tables.write();
        let table = tables
            .get_mut(&self.table)
            .ok_or_else(|| StreamError::Upstream(format!("table dropped: {}", self.table)))?;
        table.blocks.push(block);
        Ok(())
    }

    async fn write_suffix(&mut self) -> StreamResult<()> {
        if !self.writing {
            return Err(StreamError::Misuse("write_suffix without write_prefix"));
        }
        self.writing = false;
        self.finished = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Column, ColumnData};
    use crate::stream::BlockInputStream;

    fn rows_block(values: Vec<u64>) -> Block {
        Block::from_columns(vec![NamedColumn::new(
            "id",
            DataType::UInt64,
            Column::Full(ColumnData::UInt64(values)),
        )])
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_insert_select() {
        let executor = MemoryExecutor::new();

        executor
            .execute("create metrics id:UInt64 label:String", None, Stage::Complete)
            .unwrap();

        let io = executor.execute("insert metrics", None, Stage::Complete).unwrap();
        assert_eq!(io.out_sample.column_count(), 2);
        let mut output = io.output.unwrap();
        output.write_prefix().await.unwrap();
        output.write(rows_block(vec![1, 2, 3])).await.unwrap();
        output.write_suffix().await.unwrap();

        let io = executor.execute("select metrics", None, Stage::Complete).unwrap();
        let mut input = io.input.unwrap();
        let block = input.read().await.unwrap();
        assert_eq!(block.rows(), 3);
        // the stored block had no labels, the pipeline defaults them in
        assert!(block.has("label"));
        assert!(input.read().await.unwrap().is_empty());
    }

    #[test]
    fn test_unknown_table() {
        let executor = MemoryExecutor::new();
        assert!(matches!(
            executor.execute("select nope", None, Stage::Complete),
            Err(ExecutorError::TableNotFound(_))
        ));
    }

    #[test]
    fn test_bad_queries() {
        let executor = MemoryExecutor::new();
        assert!(matches!(
            executor.execute("", None, Stage::Complete),
            Err(ExecutorError::InvalidQuery(_))
        ));
        assert!(matches!(
            executor.execute("drop metrics", None, Stage::Complete),
            Err(ExecutorError::InvalidQuery(_))
        ));
        assert!(matches!(
            executor.execute("create t id=UInt64", None, Stage::Complete),
            Err(ExecutorError::InvalidQuery(_))
        ));
    }
}
