//! Configuration CLI commands.
//!
//! `config path` prints where the configuration file is read from and
//! `config show` prints the effective settings as INI.

use std::path::Path;

use clap::Subcommand;
use objstore::ConfigFile;

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration file path
    Path,

    /// Show the effective configuration
    Show,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands, path: &Path, config: &ConfigFile) -> Result<(), CliError> {
    match command {
        ConfigCommands::Path => {
            println!("{}", path.display());
            Ok(())
        }
        ConfigCommands::Show => {
            print!("{}", render(config)?);
            Ok(())
        }
    }
}

fn render(config: &ConfigFile) -> Result<String, CliError> {
    let mut out = Vec::new();
    config
        .to_ini()
        .write_to(&mut out)
        .map_err(|e| CliError::Config(format!("Failed to render configuration: {}", e)))?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}
