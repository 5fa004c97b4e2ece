//! Settings and plumbing shared by the transfer commands.

use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::info;

use objstore::{
    ConfigFile, HttpStorageProxy, ProgressReporter, RetryBudget, TransferProgress, TransferReport,
    TransportConfig,
};

use crate::error::CliError;

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}) {msg}";

/// Overrides for the configuration file, accepted by every transfer command.
#[derive(Debug, Clone, Default, Args)]
pub struct TransferArgs {
    /// Storage proxy base URL
    #[arg(long)]
    pub proxy_url: Option<String>,

    /// Parts transferred in parallel
    #[arg(long)]
    pub parallel: Option<usize>,

    /// Transfer-wide retry budget (negative for unlimited)
    #[arg(long, allow_negative_numbers = true)]
    pub retry_number: Option<i64>,

    /// Timeout for a single part in seconds
    #[arg(long)]
    pub part_timeout: Option<u64>,
}

impl TransferArgs {
    /// Engine settings: CLI takes precedence, then config.
    pub fn transport_config(&self, config: &ConfigFile) -> Result<TransportConfig, CliError> {
        let mut transport = config.transport.clone();

        if let Some(parallel) = self.parallel {
            if parallel == 0 {
                return Err(CliError::Config("--parallel must be at least 1".to_string()));
            }
            transport = transport.with_concurrency(parallel);
        }
        if let Some(retry_number) = self.retry_number {
            transport = transport.with_retry_budget(RetryBudget::from_retry_number(retry_number));
        }
        if let Some(secs) = self.part_timeout {
            transport = transport.with_part_timeout(Duration::from_secs(secs));
        }

        Ok(transport)
    }

    /// Proxy client for the configured URL.
    pub fn proxy(&self, config: &ConfigFile) -> Result<Arc<HttpStorageProxy>, CliError> {
        let url = self
            .proxy_url
            .clone()
            .or_else(|| config.proxy_url.clone())
            .ok_or_else(|| {
                CliError::Config(
                    "No storage proxy configured. \
                     Set url in the [proxy] section of config.ini or use --proxy-url"
                        .to_string(),
                )
            })?;

        Ok(Arc::new(HttpStorageProxy::new(url, config.proxy_timeout)?))
    }
}

/// Cancels `token` on Ctrl+C.
pub fn install_cancel_handler(token: CancellationToken) -> Result<(), CliError> {
    ctrlc::set_handler(move || {
        eprintln!();
        eprintln!("Received interrupt, stopping transfer...");
        token.cancel();
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))
}

/// Starts a progress bar that follows `progress` until the reporter stops.
pub fn start_progress_bar(progress: &TransferProgress) -> (ProgressBar, ProgressReporter) {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );

    let bar_clone = bar.clone();
    let reporter = ProgressReporter::start_default(
        progress.clone(),
        Box::new(move |snapshot| {
            bar_clone.set_length(snapshot.total_bytes);
            bar_clone.set_position(snapshot.bytes_transferred);
            bar_clone.set_message(format!(
                "{}/{} parts",
                snapshot.completed_parts, snapshot.total_parts
            ));
        }),
    );

    (bar, reporter)
}

/// Prints the summary of a finished transfer.
pub fn print_report(verb: &str, report: &TransferReport) {
    info!(
        object_id = %report.object_id,
        parts = report.parts_transferred,
        resumed = report.parts_resumed,
        retries = report.retries,
        "Transfer finished"
    );

    println!();
    println!("{} {}", verb, report.object_id);
    println!(
        "  Parts:     {} transferred, {} resumed",
        report.parts_transferred, report.parts_resumed
    );
    println!("  Bytes:     {}", report.bytes_transferred);
    println!("  Retries:   {}", report.retries);
    if report.refreshes > 0 {
        println!("  Refreshes: {}", report.refreshes);
    }
}
