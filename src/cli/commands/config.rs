//! Implementation of the `tae config` commands.

use anyhow::{Context, Result};

use crate::cli::types::ConfigCommands;
use crate::domain::models::Config;

/// Run a `tae config` subcommand.
pub fn execute(command: &ConfigCommands, config: &Config, json_mode: bool) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            if json_mode {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                print!(
                    "{}",
                    serde_yaml::to_string(config).context("Failed to render configuration")?
                );
            }
        }
    }
    Ok(())
}
