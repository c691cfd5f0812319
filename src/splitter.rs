//! Turns the lines of a migration script into classified blocks.
//!
//! A script is one of:
//!
//! - a single transactional [`BlockKind::Simple`] block, the common case;
//! - a single [`BlockKind::Plain`] block, when it lives under a `manual`
//!   directory or mentions a configured non-transactional keyword;
//! - `[Plain, Meta, Plain]`, when it holds a meta region:
//!
//! ```sql
//! ALTER TABLE book ADD COLUMN author_id integer;
//! --meta-psql:do-until-0
//! UPDATE book SET author_id = 0 WHERE id IN (
//!     SELECT id FROM book WHERE author_id IS NULL LIMIT 1000);
//! --meta-psql:done
//! ALTER TABLE book ALTER COLUMN author_id SET NOT NULL;
//! ```
//!
//! A meta region makes the whole script manual, whatever directory it is in.

use crate::block::{Block, BlockKind};
use crate::config::RunnerConfig;
use crate::error::ParseError;
use crate::statement::code_only;
use regex::{Regex, RegexBuilder};
use std::path::Path;

pub const META_MARKER: &str = "--meta-psql:";
const META_OPEN: &str = "do-until-0";
const META_CLOSE: &str = "done";

/// Whether `path` sits under a directory named `manual`.
pub fn is_manual_path(path: &Path) -> bool {
    path.parent()
        .map(|parent| parent.components().any(|c| c.as_os_str() == "manual"))
        .unwrap_or(false)
}

fn meta_command(line: &str) -> Option<&str> {
    line.strip_prefix(META_MARKER).map(str::trim)
}

/// Builds a matcher for the configured keywords: case-insensitive, whole
/// words, any run of whitespace between the words of a keyword.
fn keyword_matcher(keywords: &[String]) -> Result<Option<Regex>, ParseError> {
    let alternatives: Vec<String> = keywords
        .iter()
        .map(|k| k.split_whitespace().map(regex::escape).collect::<Vec<_>>())
        .filter(|words| !words.is_empty())
        .map(|words| words.join(r"\s+"))
        .collect();

    if alternatives.is_empty() {
        return Ok(None);
    }

    let pattern = format!(r"\b(?:{})\b", alternatives.join("|"));
    let regex = RegexBuilder::new(&pattern).case_insensitive(true).build()?;
    Ok(Some(regex))
}

fn contains_non_transactional_keyword(
    lines: &[String],
    config: &RunnerConfig,
) -> Result<bool, ParseError> {
    let matcher = match keyword_matcher(&config.non_transactional_keywords)? {
        Some(matcher) => matcher,
        None => return Ok(false),
    };

    // Keywords inside comments, literals or quoted names do not count.
    Ok(matcher.is_match(&code_only(&join_lines(lines))))
}

fn join_lines(lines: &[String]) -> String {
    let mut text = String::new();
    for line in lines {
        text.push_str(line);
        text.push('\n');
    }
    text
}

/// Classifies the lines of one script and returns its blocks in source order.
pub fn split_blocks(
    lines: &[String],
    is_manual: bool,
    config: &RunnerConfig,
) -> Result<Vec<Block>, ParseError> {
    let has_meta = lines.iter().any(|line| line.starts_with(META_MARKER));

    if is_manual || has_meta {
        return split_manual(lines);
    }

    let kind = if contains_non_transactional_keyword(lines, config)? {
        BlockKind::Plain
    } else {
        BlockKind::Simple
    };

    Ok(vec![Block::new(kind, join_lines(lines))])
}

fn split_manual(lines: &[String]) -> Result<Vec<Block>, ParseError> {
    let mut blocks = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut kind = BlockKind::Plain;
    // Line on which the open meta region started.
    let mut open_at: Option<usize> = None;
    let mut seen_meta = false;

    for (index, line) in lines.iter().enumerate() {
        let line_no = index + 1;
        let command = match meta_command(line) {
            Some(command) => command,
            None => {
                current.push(line.clone());
                continue;
            }
        };

        match command {
            META_OPEN => {
                if open_at.is_some() {
                    return Err(ParseError::NestedMetaBlock { line: line_no });
                }
                if seen_meta {
                    return Err(ParseError::MultipleMetaBlocks { line: line_no });
                }
                blocks.push(Block::new(kind, join_lines(&current)));
                current.clear();
                kind = BlockKind::Meta;
                open_at = Some(line_no);
                seen_meta = true;
            }
            META_CLOSE => {
                if open_at.is_none() {
                    return Err(ParseError::UnexpectedMetaEnd { line: line_no });
                }
                blocks.push(Block::new(kind, join_lines(&current)));
                current.clear();
                kind = BlockKind::Plain;
                open_at = None;
            }
            other => {
                return Err(ParseError::UnknownMetaCommand {
                    line: line_no,
                    command: other.to_string(),
                })
            }
        }
    }

    if let Some(line) = open_at {
        return Err(ParseError::UnclosedMetaBlock { line });
    }

    blocks.push(Block::new(kind, join_lines(&current)));
    Ok(blocks)
}
