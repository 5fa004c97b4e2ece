//! Download command.

use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

use objstore::{ConfigFile, ObjectDownloader, TransferProgress};

use super::common::{install_cancel_handler, print_report, start_progress_bar, TransferArgs};
use crate::error::CliError;

/// Arguments for the download command.
pub struct DownloadArgs {
    pub object_id: String,
    pub output_dir: PathBuf,
    pub transfer: TransferArgs,
}

/// Run the download command.
pub async fn run(args: DownloadArgs, config: &ConfigFile) -> Result<(), CliError> {
    let proxy = args.transfer.proxy(config)?;
    let transport = args.transfer.transport_config(config)?;

    let cancel = CancellationToken::new();
    install_cancel_handler(cancel.clone())?;

    let progress = TransferProgress::default();
    let downloader = ObjectDownloader::new(proxy)
        .with_config(transport)
        .with_progress(progress.clone())
        .with_cancellation(cancel);

    println!(
        "Downloading {} to {}",
        args.object_id,
        args.output_dir.display()
    );

    let (bar, reporter) = start_progress_bar(&progress);
    let result = downloader.download(&args.object_id, &args.output_dir).await;
    reporter.stop();

    match result {
        Ok(report) => {
            bar.finish();
            print_report("Downloaded", &report);
            println!(
                "  Saved to:  {}",
                ObjectDownloader::destination(&args.output_dir, &args.object_id).display()
            );
            Ok(())
        }
        Err(e) => {
            bar.abandon();
            Err(e.into())
        }
    }
}
