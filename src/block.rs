use crate::engine::{ExecutionResult, Executor};
use crate::statement::split_statements;
use std::fmt;
use std::sync::OnceLock;

/// Statement sent after every successful script unless disabled.
pub const DISCARD_ALL: &str = "DISCARD ALL;";

static DISCARD_BLOCK: OnceLock<Block> = OnceLock::new();

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockKind {
    /// Submitted statement by statement, never wrapped in a transaction.
    Plain,
    /// Submitted as a single transaction.
    Simple,
    /// Resubmitted until a run affects zero rows.
    Meta,
    /// The shared `DISCARD ALL` cleanup.
    Discard,
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BlockKind::Plain => write!(f, "plain"),
            BlockKind::Simple => write!(f, "simple"),
            BlockKind::Meta => write!(f, "meta"),
            BlockKind::Discard => write!(f, "discard"),
        }
    }
}

/// A contiguous chunk of a migration script and the way it must be run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    kind: BlockKind,
    text: String,
    statements: Vec<String>,
}

impl Block {
    pub fn new(kind: BlockKind, text: impl Into<String>) -> Self {
        let text = text.into();
        let statements = split_statements(&text)
            .into_iter()
            .map(str::to_string)
            .collect();

        Self {
            kind,
            text,
            statements,
        }
    }

    /// The process-wide discard block.
    pub fn discard() -> &'static Block {
        DISCARD_BLOCK.get_or_init(|| Block::new(BlockKind::Discard, DISCARD_ALL))
    }

    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    /// Source text, comments included.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Statements that will be submitted, in order.
    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    pub fn is_transactional(&self) -> bool {
        self.kind == BlockKind::Simple
    }

    /// Runs the block and returns the row count of its last submission.
    /// Executor errors are returned as they were raised.
    pub async fn run<E>(&self, executor: &mut E) -> ExecutionResult<u64>
    where
        E: Executor + ?Sized,
    {
        tracing::debug!(
            "running {} block ({} statements)",
            self.kind,
            self.statements.len()
        );

        match self.kind {
            BlockKind::Plain | BlockKind::Discard => self.submit(executor).await,
            BlockKind::Simple => executor.atomic(&self.statements).await,
            BlockKind::Meta => {
                let mut iteration = 0usize;
                loop {
                    iteration += 1;
                    let rowcount = self.submit(executor).await?;
                    tracing::debug!("meta block pass {}: {} rows", iteration, rowcount);
                    if rowcount == 0 {
                        return Ok(0);
                    }
                }
            }
        }
    }

    async fn submit<E>(&self, executor: &mut E) -> ExecutionResult<u64>
    where
        E: Executor + ?Sized,
    {
        let mut rowcount = 0;
        for statement in &self.statements {
            rowcount = executor.execute(statement).await?;
        }
        Ok(rowcount)
    }
}
