//! Upload command.

use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

use objstore::{ConfigFile, ObjectUploader, TransferProgress};

use super::common::{install_cancel_handler, print_report, start_progress_bar, TransferArgs};
use crate::error::CliError;

/// Arguments for the upload command.
pub struct UploadArgs {
    pub object_id: String,
    pub file: PathBuf,
    pub transfer: TransferArgs,
}

/// Run the upload command.
pub async fn run(args: UploadArgs, config: &ConfigFile) -> Result<(), CliError> {
    if !args.file.is_file() {
        return Err(CliError::Config(format!(
            "'{}' is not a file",
            args.file.display()
        )));
    }

    let proxy = args.transfer.proxy(config)?;
    let transport = args.transfer.transport_config(config)?;

    let cancel = CancellationToken::new();
    install_cancel_handler(cancel.clone())?;

    let progress = TransferProgress::default();
    let uploader = ObjectUploader::new(proxy)
        .with_config(transport)
        .with_progress(progress.clone())
        .with_cancellation(cancel);

    println!("Uploading {} as {}", args.file.display(), args.object_id);

    let (bar, reporter) = start_progress_bar(&progress);
    let result = uploader.upload(&args.object_id, &args.file).await;
    reporter.stop();

    match result {
        Ok(report) => {
            bar.finish();
            print_report("Uploaded", &report);
            Ok(())
        }
        Err(e) => {
            bar.abandon();
            Err(e.into())
        }
    }
}
