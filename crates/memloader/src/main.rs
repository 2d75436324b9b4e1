//! memloader - ChatGPT history to long-term memory
//!
//! Extracts durable facts about the user from a ChatGPT export, consolidates
//! them, and loads them into Mem0 or OpenMemory.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod cli;
mod commands;
mod config;
mod error;
mod report;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::from_default_env()
                .add_directive(format!("memloader={level}").parse()?)
                .add_directive(format!("memloader_core={level}").parse()?),
        )
        .init();

    // Load configuration
    let config = config::Config::load()?;

    // Execute command
    match cli.command {
        Commands::Import(args) => commands::import::execute(args, &config).await,
        Commands::Consolidate(args) => commands::consolidate::execute(args, &config),
        Commands::Config(cmd) => commands::config::execute(cmd, &config),
        Commands::Version => {
            println!("memloader {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
