pub mod block;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod script;
pub mod splitter;
pub mod statement;

pub use block::{Block, BlockKind};
pub use config::RunnerConfig;
pub use engine::Executor;
pub use error::{ExecutionError, ParseError};
pub use script::Script;
