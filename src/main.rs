//! `oplog` - durable operation history and undo/redo engine.
//!
//! See `README.md` for user documentation and `DESIGN.md` for architecture.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use oplog::cli::Cli;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let exit_code = oplog::engine::run(cli)?;
    std::process::exit(exit_code);
}
