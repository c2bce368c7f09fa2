pub mod handlers;

use crate::presentation::cli::Cli;
use carvegen_core::error::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

pub fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    handlers::handle_generate(cli.config, cli.force)
}
