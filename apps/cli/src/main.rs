//! DocForge CLI entry point.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use crate::commands::{Cli, init_tracing, run};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(&cli);

    run(cli).await
}
