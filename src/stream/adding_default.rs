//! Missing-column defaulting stage
//!
//! Reconciles upstream blocks with a required schema: every required column
//! absent from an incoming block is filled in with the type's default value,
//! expanded to a materialized column of the block's row count. Columns that
//! are present are passed through untouched and are not type-checked against
//! the requirement; that is the caller's concern.

use async_trait::async_trait;

use crate::block::{Block, DataType, NamedColumn};

use super::profile::ProfileState;
use super::{BlockInputStream, StreamResult};

pub struct AddingDefaultStream {
    input: Box<dyn BlockInputStream>,
    required: Vec<(String, DataType)>,
    profile: ProfileState,
}

impl AddingDefaultStream {
    pub fn new(input: Box<dyn BlockInputStream>, required: Vec<(String, DataType)>) -> Self {
        AddingDefaultStream {
            input,
            required,
            profile: ProfileState::default(),
        }
    }
}

#[async_trait]
impl BlockInputStream for AddingDefaultStream {
    fn name(&self) -> &'static str {
        "AddingDefault"
    }

    fn id(&self) -> String {
        let mut id = format!("AddingDefault({}", self.input.id());
        for (name, ty) in &self.required {
            id.push_str(", ");
            id.push_str(name);
            id.push_str(", ");
            id.push_str(ty.name());
        }
        id.push(')');
        id
    }

    async fn read(&mut self) -> StreamResult<Block> {
        if self.profile.is_cancelled() {
            return Ok(Block::empty());
        }

        let mut block = self.input.read().await?;
        if block.is_empty() {
            return Ok(block);
        }

        for (name, ty) in &self.required {
            if block.has(name) {
                continue;
            }
            let column = ty
                .const_column(block.rows(), ty.default_value())?
                .materialized();
            block.insert(NamedColumn::new(name.clone(), *ty, column))?;
        }

        self.profile.account(&block);
        Ok(block)
    }

    fn children(&mut self) -> Vec<&mut dyn BlockInputStream> {
        vec![self.input.as_mut()]
    }

    fn profile(&mut self) -> Option<&mut ProfileState> {
        Some(&mut self.profile)
    }
}
