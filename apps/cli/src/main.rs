//! bookmark-reorg CLI: reorganize a browser bookmark export.
//!
//! Parses a Netscape bookmark export, enriches every entry with live page
//! metadata, asks a language model for a new folder hierarchy and renders
//! the result as an importable bookmark file.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let env_file = commands::load_env_file(None);
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    if let Some(path) = env_file {
        tracing::debug!(path = %path.display(), "loaded environment file");
    }
    commands::run(cli).await
}
