//! svelte-parse: Parse Svelte components and print their syntax trees.

mod cli;
mod orchestrator;
mod output;

use clap::Parser;
use cli::Args;
use miette::Result;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(args.log_level())),
        )
        .with_writer(std::io::stderr)
        .init();

    let summary = orchestrator::run(&args)?;
    if args.fail_on_errors && summary.error_count > 0 {
        std::process::exit(1);
    }
    Ok(())
}
