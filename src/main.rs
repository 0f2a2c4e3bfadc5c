mod cli;
mod collector;
mod engine;
mod ingest;
mod model;
mod orchestrator;
mod progress;
mod runner;
mod storage;
mod text_summary;
#[cfg(feature = "tui")]
mod tui;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let is_non_tui = args.json || args.text;

    cli::run(args).await?;
    // Explicitly exit with code 0 on success, especially for non-TUI modes
    if is_non_tui {
        std::process::exit(0);
    }
    Ok(())
}
