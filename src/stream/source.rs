//! In-memory block source

use async_trait::async_trait;

use crate::block::Block;

use super::profile::ProfileState;
use super::{BlockInputStream, StreamResult};

/// Yields a fixed list of blocks, then terminates
pub struct BlocksListInputStream {
    blocks: std::vec::IntoIter<Block>,
    profile: ProfileState,
}

impl BlocksListInputStream {
    pub fn new(blocks: Vec<Block>) -> Self {
        BlocksListInputStream {
            blocks: blocks.into_iter(),
            profile: ProfileState::default(),
        }
    }
}

#[async_trait]
impl BlockInputStream for BlocksListInputStream {
    fn name(&self) -> &'static str {
        "BlocksList"
    }

    async fn read(&mut self) -> StreamResult<Block> {
        if self.profile.is_cancelled() {
            return Ok(Block::empty());
        }
        let block = self.blocks.next().unwrap_or_else(Block::empty);
        self.profile.account(&block);
        Ok(block)
    }

    fn profile(&mut self) -> Option<&mut ProfileState> {
        Some(&mut self.profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Column, ColumnData, DataType, NamedColumn};

    #[tokio::test]
    async fn test_yields_blocks_then_terminates() {
        let block = Block::from_columns(vec![NamedColumn::new(
            "a",
            DataType::Int8,
            Column::Full(ColumnData::Int8(vec![1, 2])),
        )])
        .unwrap();

        let mut stream = BlocksListInputStream::new(vec![block.clone()]);
        assert_eq!(stream.read().await.unwrap(), block);
        assert!(stream.read().await.unwrap().is_empty());
        assert_eq!(stream.profile().unwrap().rows, 2);
    }
}
