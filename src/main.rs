//! tae CLI entry point.

use clap::Parser;

use tae::cli::commands::{batch, config, load_config, run};
use tae::cli::{handle_error, Cli, Commands};
use tae::infrastructure::logging::LoggerImpl;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let settings = match load_config(&cli) {
        Ok(settings) => settings,
        Err(err) => handle_error(&err, cli.json),
    };

    // held for the lifetime of the process so buffered log lines are flushed
    let _logger = match LoggerImpl::init(&settings.logging) {
        Ok(logger) => logger,
        Err(err) => handle_error(&err, cli.json),
    };

    let result = match cli.command {
        Commands::Run(args) => run::execute(args, settings, cli.json).await,
        Commands::Batch(args) => batch::execute(args, settings, cli.json).await,
        Commands::Config(command) => config::execute(&command, &settings, cli.json),
    };

    if let Err(err) = result {
        handle_error(&err, cli.json);
    }
}
