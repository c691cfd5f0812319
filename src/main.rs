use anyhow::Result;
use clap::Parser;
use north::cli::{run_cli, Cli, Outcome};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run_cli(cli).await? {
        Outcome::Planned { table } => println!("{}", table),
        Outcome::ShownConfig { content } => print!("{}", content),
        Outcome::AppliedScripts(count) => {
            tracing::info!("{} migration script(s) applied", count)
        }
        Outcome::Unimplemented => {}
    }

    Ok(())
}
