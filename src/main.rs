mod cli;
mod cli_utils;
mod commands;

use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;

use cli::{Cli, Commands};
use scriptorium::logging;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize structured logging
    logging::init(&cli.common.log_level);

    // Dispatch to appropriate command handler
    match cli.command {
        Commands::List(args) => commands::list::run(&cli.common, &args),
        Commands::Render(args) => commands::render::run(&cli.common, &args),
        Commands::Defrost(args) => commands::defrost::run(&cli.common, &args).await,
        Commands::Config(args) => commands::config::run(&cli.common, args.command),
    }
}
