//! Undertone Control - analyze messages from the terminal.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;
use undertone_common::UndertoneConfig;
use undertone_core::Orchestrator;
use undertonectl::cli::{Cli, Commands};
use undertonectl::{commands, logging, output};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let (config, source) =
        UndertoneConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    logging::init(&config.log.level, cli.verbose);
    debug!(source = ?source, "Configuration loaded");

    let orchestrator = Orchestrator::from_config(&config);
    match cli.command {
        Commands::Analyze(args) => commands::analyze(&orchestrator, args).await,
        Commands::Capabilities { json } => commands::capabilities(&orchestrator, json),
        Commands::History { limit, json } => commands::history(&orchestrator, limit, json).await,
        Commands::Config => commands::config(&config, source.as_deref()),
    }
}
