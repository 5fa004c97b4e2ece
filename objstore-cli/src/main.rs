//! objstore CLI - Command-line interface
//!
//! Moves objects between local disk and the object store through the
//! `objstore` library.

mod commands;
mod error;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use console::style;
use objstore::logging::{init_logging, LoggingConfig, LoggingGuard};
use objstore::ConfigFile;

use commands::common::TransferArgs;
use commands::config::ConfigCommands;
use commands::download::DownloadArgs;
use commands::upload::UploadArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "objstore", version = objstore::VERSION, about = "Multipart object transfers")]
struct Cli {
    /// Configuration file (default: ~/.config/objstore/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Download an object into a directory
    Download {
        /// Object identifier
        #[arg(long)]
        object_id: String,

        /// Directory the object is written to
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        #[command(flatten)]
        transfer: TransferArgs,
    },

    /// Upload a local file as an object
    Upload {
        /// Object identifier
        #[arg(long)]
        object_id: String,

        /// File to upload
        #[arg(long)]
        file: PathBuf,

        #[command(flatten)]
        transfer: TransferArgs,
    },

    /// Inspect configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if e.is_cancelled() {
                eprintln!(
                    "{} transfer stopped by user",
                    style("cancelled:").yellow().bold()
                );
            } else {
                eprintln!("{} {}", style("error:").red().bold(), e);
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config_path = match cli.config {
        Some(path) => path,
        None => ConfigFile::default_path()?,
    };
    let config = ConfigFile::load(&config_path)?;

    match cli.command {
        Commands::Config(command) => commands::config::run(command, &config_path, &config),
        Commands::Download {
            object_id,
            output_dir,
            transfer,
        } => {
            let _guard = start_logging(&config, cli.verbose)?;
            let args = DownloadArgs {
                object_id,
                output_dir,
                transfer,
            };
            runtime()?.block_on(commands::download::run(args, &config))
        }
        Commands::Upload {
            object_id,
            file,
            transfer,
        } => {
            let _guard = start_logging(&config, cli.verbose)?;
            let args = UploadArgs {
                object_id,
                file,
                transfer,
            };
            runtime()?.block_on(commands::upload::run(args, &config))
        }
    }
}

fn start_logging(config: &ConfigFile, verbose: bool) -> Result<LoggingGuard, CliError> {
    Ok(init_logging(&LoggingConfig {
        level: Some(config.log_level.clone()),
        directory: config.log_directory.clone(),
        verbose,
    })?)
}

fn runtime() -> Result<tokio::runtime::Runtime, CliError> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_download() {
        let cli = Cli::parse_from([
            "objstore",
            "-v",
            "download",
            "--object-id",
            "abc",
            "--output-dir",
            "/tmp/out",
            "--parallel",
            "16",
        ]);

        assert!(cli.verbose);
        match cli.command {
            Commands::Download {
                object_id,
                output_dir,
                transfer,
            } => {
                assert_eq!(object_id, "abc");
                assert_eq!(output_dir, PathBuf::from("/tmp/out"));
                assert_eq!(transfer.parallel, Some(16));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_upload_with_unlimited_retries() {
        let cli = Cli::parse_from([
            "objstore",
            "upload",
            "--object-id",
            "abc",
            "--file",
            "reads.bam",
            "--retry-number",
            "-1",
        ]);

        match cli.command {
            Commands::Upload { transfer, .. } => assert_eq!(transfer.retry_number, Some(-1)),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_config_path_uses_flag() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("config.ini");
        let cli = Cli::parse_from([
            "objstore",
            "--config",
            path.to_str().unwrap(),
            "config",
            "path",
        ]);

        assert_eq!(cli.config, Some(path));
        assert!(run(cli).is_ok());
    }
}
