use std::io;

/// Raised while turning a migration file into blocks. Surfaced before any
/// statement reaches the database.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("could not read migration script")]
    Io(#[from] io::Error),

    #[error("meta block opened on line {line} is never closed")]
    UnclosedMetaBlock { line: usize },

    #[error("line {line}: 'done' without an open meta block")]
    UnexpectedMetaEnd { line: usize },

    #[error("line {line}: meta block opened while another one is still open")]
    NestedMetaBlock { line: usize },

    #[error("line {line}: only one meta block is allowed per script")]
    MultipleMetaBlocks { line: usize },

    #[error("line {line}: unknown meta command '{command}'")]
    UnknownMetaCommand { line: usize, command: String },

    #[error("invalid non-transactional keyword")]
    InvalidKeyword(#[from] regex::Error),
}

/// Raised by an executor while submitting a statement. Blocks and scripts
/// pass these through untouched.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("i/o error while talking to the database")]
    Io(#[from] io::Error),

    #[error("database command must not be empty")]
    EmptyCommand,

    #[error("statement failed with exit code {exit_code}: {stderr}")]
    StatementFailed { exit_code: i32, stderr: String },

    #[error("database session ended after an earlier failure")]
    SessionEnded,

    #[error("database error: {0}")]
    Database(String),
}
