use crate::block::Block;
use crate::config::{Config, RunnerConfig};
use crate::engine::postgres_psql::PSQL;
use crate::engine::Executor;
use crate::script::Script;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Turn debugging information on
    #[arg(short, long)]
    pub debug: bool,

    #[arg(global = true, short, long, default_value = "north.toml")]
    pub config_file: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show how a migration script will be split and run
    Plan {
        /// Path to the migration script
        script: PathBuf,
    },
    /// Apply migration scripts in the order given.  Every script is parsed
    /// before the first one runs.
    Apply {
        /// Skip the DISCARD ALL sent after each script
        #[arg(long)]
        no_discard: bool,

        #[arg(required = true)]
        scripts: Vec<PathBuf>,
    },
    /// Print the effective configuration
    Config,
}

pub enum Outcome {
    Planned { table: String },
    AppliedScripts(usize),
    ShownConfig { content: String },
    Unimplemented,
}

#[derive(Tabled)]
struct BlockDisplay {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Transaction")]
    transactional: String,
    #[tabled(rename = "Statements")]
    statements: usize,
    #[tabled(rename = "Starts with")]
    first_line: String,
}

impl BlockDisplay {
    fn new(index: usize, block: &Block) -> Self {
        let transactional = if block.is_transactional() {
            style("✓").green().to_string()
        } else {
            style("✗").yellow().to_string()
        };

        let first_line = block
            .text()
            .lines()
            .find(|line| !line.trim().is_empty())
            .unwrap_or("")
            .to_string();

        Self {
            index,
            kind: block.kind().to_string(),
            transactional,
            statements: block.statements().len(),
            first_line,
        }
    }
}

pub fn render_plan(script: &Script) -> String {
    let mut rows: Vec<BlockDisplay> = script
        .block_list()
        .iter()
        .enumerate()
        .map(|(i, block)| BlockDisplay::new(i + 1, block))
        .collect();

    if script.discard_on_completion() {
        rows.push(BlockDisplay::new(rows.len() + 1, script.discard_block()));
    }

    let mut table = Table::new(rows);
    table.with(Style::sharp());
    table.to_string()
}

/// Parses every script in `paths`, then runs them one after the other.
/// Returns the number of scripts applied.
pub async fn apply_scripts<E>(
    paths: &[PathBuf],
    config: &RunnerConfig,
    executor: &mut E,
) -> Result<usize>
where
    E: Executor + ?Sized,
{
    let mut scripts = Vec::with_capacity(paths.len());
    for path in paths {
        let script = Script::from_path(path, config)
            .with_context(|| format!("failed to parse migration script '{}'", path.display()))?;
        scripts.push((path, script));
    }

    for (path, script) in &scripts {
        tracing::info!("applying {}", path.display());
        script
            .run(executor)
            .await
            .with_context(|| format!("Failed to apply migration '{}'", path.display()))?;
        tracing::info!("migration '{}' applied successfully", path.display());
    }

    Ok(scripts.len())
}

pub async fn run_cli(cli: Cli) -> Result<Outcome> {
    let main_config = Config::load(&cli.config_file)
        .context(format!("could not load config from {}", &cli.config_file))?;

    match cli.command {
        Some(Commands::Plan { script }) => {
            let parsed = Script::from_path(&script, &main_config.runner).with_context(|| {
                format!("failed to parse migration script '{}'", script.display())
            })?;
            Ok(Outcome::Planned {
                table: render_plan(&parsed),
            })
        }
        Some(Commands::Apply {
            no_discard,
            scripts,
        }) => {
            let mut runner = main_config.runner.clone();
            if no_discard {
                runner.discard_on_completion = false;
            }

            let mut engine = PSQL::new(main_config.database.psql_command.clone())
                .context("could not set up database command")?;
            let applied = apply_scripts(&scripts, &runner, &mut engine).await?;
            engine
                .close()
                .await
                .context("database session did not shut down cleanly")?;
            Ok(Outcome::AppliedScripts(applied))
        }
        Some(Commands::Config) => Ok(Outcome::ShownConfig {
            content: main_config.to_toml()?,
        }),
        None => {
            eprintln!("No subcommand specified");
            Ok(Outcome::Unimplemented)
        }
    }
}
