//! Testlens CLI entry point.

use anyhow::Result;
use clap::Parser;

use testlens::cli::{commands, Cli, Commands};
use testlens::infrastructure::config::ConfigLoader;
use testlens::infrastructure::logging::LoggerImpl;

fn run(cli: &Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };
    let _logger = LoggerImpl::init(&config.logging)?;

    match &cli.command {
        Commands::Replay { events, export } => {
            commands::replay::execute(events, export.as_deref(), &config, cli.json)
        }
        Commands::Flaky { history } => commands::flaky::execute(history, &config, cli.json),
        Commands::Coverage { update } => commands::coverage::execute(update, &config, cli.json),
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(&cli) {
        testlens::cli::handle_error(err, cli.json);
    }
}
