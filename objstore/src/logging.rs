//! Tracing subscriber setup.
//!
//! Logs go to stderr and, when a directory is configured, to
//! `<directory>/objstore.log` through a non-blocking writer. `RUST_LOG`
//! overrides the configured level.

use std::fs;
use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter used when neither `RUST_LOG` nor a level is configured.
pub const DEFAULT_LOG_FILTER: &str = "objstore=info";

/// Name of the log file inside the log directory.
pub const LOG_FILE_NAME: &str = "objstore.log";

/// Logging options.
#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    /// Level for the `objstore` target (`info`, `debug`, ...).
    pub level: Option<String>,
    /// Directory for the log file.
    pub directory: Option<PathBuf>,
    /// Forces `debug` regardless of `level`.
    pub verbose: bool,
}

/// Errors installing the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to create log directory {}: {source}", path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to install tracing subscriber: {0}")]
    Init(String),
}

/// Keeps the file writer alive. Hold it until the program exits or the
/// tail of the log may be lost.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Builds the filter from `RUST_LOG` or the configured level.
pub fn build_filter(config: &LoggingConfig) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let directive = if config.verbose {
        "objstore=debug".to_string()
    } else {
        match &config.level {
            Some(level) => format!("objstore={}", level),
            None => DEFAULT_LOG_FILTER.to_string(),
        }
    };

    EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Installs the global subscriber.
pub fn init_logging(config: &LoggingConfig) -> Result<LoggingGuard, LoggingError> {
    let filter = build_filter(config);

    let stderr_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_timer(LocalTime::rfc_3339())
        .with_target(false);

    let (file_layer, file_guard) = match &config.directory {
        Some(dir) => {
            fs::create_dir_all(dir).map_err(|source| LoggingError::Directory {
                path: dir.clone(),
                source,
            })?;
            let appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_timer(LocalTime::rfc_3339());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_from_level() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let filter = build_filter(&LoggingConfig {
            level: Some("warn".to_string()),
            ..Default::default()
        });
        assert_eq!(filter.to_string(), "objstore=warn");
    }

    #[test]
    fn test_verbose_overrides_level() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let filter = build_filter(&LoggingConfig {
            level: Some("error".to_string()),
            verbose: true,
            ..Default::default()
        });
        assert_eq!(filter.to_string(), "objstore=debug");
    }

    #[test]
    fn test_invalid_level_falls_back() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let filter = build_filter(&LoggingConfig {
            level: Some("loud".to_string()),
            ..Default::default()
        });
        assert_eq!(filter.to_string(), DEFAULT_LOG_FILTER);
    }
}
