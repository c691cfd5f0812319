use crate::block::Block;
use crate::config::RunnerConfig;
use crate::engine::{ExecutionResult, Executor};
use crate::error::ParseError;
use crate::splitter::{is_manual_path, split_blocks};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// One migration file, parsed once into blocks.
#[derive(Debug)]
pub struct Script {
    block_list: Vec<Block>,
    discard: &'static Block,
    discard_on_completion: bool,
    is_manual: bool,
}

impl Script {
    /// Parses `reader`. `is_manual` marks scripts that must never run inside an
    /// implicit transaction, usually derived with [`is_manual_path`].
    pub fn parse<R: BufRead>(
        reader: R,
        is_manual: bool,
        config: &RunnerConfig,
    ) -> Result<Script, ParseError> {
        let lines = reader.lines().collect::<Result<Vec<String>, _>>()?;
        let block_list = split_blocks(&lines, is_manual, config)?;

        Ok(Script {
            block_list,
            discard: Block::discard(),
            discard_on_completion: config.discard_on_completion,
            is_manual,
        })
    }

    pub fn from_path(path: &Path, config: &RunnerConfig) -> Result<Script, ParseError> {
        let file = File::open(path)?;
        Self::parse(BufReader::new(file), is_manual_path(path), config)
    }

    pub fn block_list(&self) -> &[Block] {
        &self.block_list
    }

    pub fn discard_block(&self) -> &Block {
        self.discard
    }

    pub fn discard_on_completion(&self) -> bool {
        self.discard_on_completion
    }

    /// True when the caller flagged the script as manual. Scripts split around
    /// a meta region behave as manual without being flagged.
    pub fn is_manual(&self) -> bool {
        self.is_manual
    }

    /// Runs every block in source order, then the discard block if enabled.
    /// The first error aborts the run, and the discard block is skipped.
    pub async fn run<E>(&self, executor: &mut E) -> ExecutionResult<()>
    where
        E: Executor + ?Sized,
    {
        for (index, block) in self.block_list.iter().enumerate() {
            tracing::debug!("block {}/{}", index + 1, self.block_list.len());
            block.run(executor).await?;
        }

        if self.discard_on_completion {
            self.discard.run(executor).await?;
        }

        Ok(())
    }
}
