//! Configuration for transfers and the configuration file.
//!
//! [`TransportConfig`] holds the knobs the engine reads. [`ConfigFile`] is the
//! on-disk INI representation at `~/.config/objstore/config.ini`:
//!
//! ```ini
//! [proxy]
//! url = https://storage.example.org
//! timeout = 30
//!
//! [transport]
//! parallel = 8
//! retry_number = 10
//! part_timeout = 300
//! local_retries = 3
//!
//! [logging]
//! directory = ~/.local/state/objstore
//! level = info
//! ```
//!
//! A negative `retry_number` means the retry budget is unlimited.
//!
//! `local_retries` is the attempt count of the default exponential backoff;
//! `1` disables local retries. A fixed-delay policy has no file form, so
//! [`ConfigFile::to_ini`] leaves the key out for it.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use crate::transport::{LocalRetryPolicy, RetryBudget};

/// Default number of parts in flight at once.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Default wall-clock limit for one part attempt (5 minutes).
pub const DEFAULT_PART_TIMEOUT_SECS: u64 = 300;

/// Default timeout for proxy requests.
pub const DEFAULT_PROXY_TIMEOUT_SECS: u64 = 30;

/// Default log level for the `objstore` target.
pub const DEFAULT_LOG_LEVEL: &str = "info";

const CONFIG_DIR_NAME: &str = "objstore";
const CONFIG_FILE_NAME: &str = "config.ini";

/// Engine settings for one transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportConfig {
    /// Maximum number of parts transferred concurrently.
    pub concurrency: usize,

    /// Transfer-wide bound on re-queued parts.
    pub retry_budget: RetryBudget,

    /// Retries a worker performs on its own before escalating.
    pub local_retry: LocalRetryPolicy,

    /// Wall-clock limit for a single part attempt.
    pub part_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            retry_budget: RetryBudget::default(),
            local_retry: LocalRetryPolicy::default(),
            part_timeout: Duration::from_secs(DEFAULT_PART_TIMEOUT_SECS),
        }
    }
}

impl TransportConfig {
    /// Set the number of concurrent parts (at least 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Set the retry budget.
    pub fn with_retry_budget(mut self, budget: RetryBudget) -> Self {
        self.retry_budget = budget;
        self
    }

    /// Set the local retry policy.
    pub fn with_local_retry(mut self, policy: LocalRetryPolicy) -> Self {
        self.local_retry = policy;
        self
    }

    /// Set the per-attempt timeout.
    pub fn with_part_timeout(mut self, timeout: Duration) -> Self {
        self.part_timeout = timeout;
        self
    }
}

/// Errors reading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read or parsed.
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },

    /// INI text could not be parsed.
    #[error("failed to parse config: {0}")]
    Parse(#[from] ini::ParseError),

    /// A value is present but malformed.
    #[error("invalid value for {section}.{key}: '{value}'")]
    InvalidValue {
        section: &'static str,
        key: &'static str,
        value: String,
    },

    /// The platform has no configuration directory.
    #[error("could not determine the user configuration directory")]
    NoConfigDir,
}

/// Settings loaded from `config.ini`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    /// Base URL of the storage proxy.
    pub proxy_url: Option<String>,

    /// Timeout for proxy requests.
    pub proxy_timeout: Duration,

    /// Engine settings.
    pub transport: TransportConfig,

    /// Directory for the log file. No file logging when unset.
    pub log_directory: Option<PathBuf>,

    /// Level for the `objstore` log target.
    pub log_level: String,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            proxy_url: None,
            proxy_timeout: Duration::from_secs(DEFAULT_PROXY_TIMEOUT_SECS),
            transport: TransportConfig::default(),
            log_directory: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl ConfigFile {
    /// Location of the configuration file for the current user.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Loads the user's configuration file, or defaults if it does not exist.
    pub fn load_default() -> Result<Self, ConfigError> {
        Self::load(&Self::default_path()?)
    }

    /// Loads `path`, or defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ini(&ini)
    }

    /// Parses configuration from INI text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Self::from_ini(&Ini::load_from_str(text)?)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        config.proxy_url = ini
            .get_from(Some("proxy"), "url")
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty());
        if let Some(secs) = parse_value::<u64>(ini, "proxy", "timeout")? {
            config.proxy_timeout = Duration::from_secs(secs);
        }

        if let Some(parallel) = parse_value::<usize>(ini, "transport", "parallel")? {
            if parallel == 0 {
                return Err(ConfigError::InvalidValue {
                    section: "transport",
                    key: "parallel",
                    value: parallel.to_string(),
                });
            }
            config.transport.concurrency = parallel;
        }
        if let Some(retry_number) = parse_value::<i64>(ini, "transport", "retry_number")? {
            config.transport.retry_budget = RetryBudget::from_retry_number(retry_number);
        }
        if let Some(secs) = parse_value::<u64>(ini, "transport", "part_timeout")? {
            config.transport.part_timeout = Duration::from_secs(secs);
        }
        if let Some(attempts) = parse_value::<u32>(ini, "transport", "local_retries")? {
            config.transport.local_retry = if attempts <= 1 {
                LocalRetryPolicy::None
            } else {
                LocalRetryPolicy::exponential(attempts)
            };
        }

        config.log_directory = ini
            .get_from(Some("logging"), "directory")
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(expand_tilde);
        if let Some(level) = ini.get_from(Some("logging"), "level") {
            config.log_level = level.trim().to_string();
        }

        Ok(config)
    }

    /// Renders the effective configuration as INI.
    pub fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();

        if let Some(url) = &self.proxy_url {
            ini.with_section(Some("proxy")).set("url", url.as_str());
        }
        ini.with_section(Some("proxy"))
            .set("timeout", self.proxy_timeout.as_secs().to_string());

        let retry_number = match self.transport.retry_budget {
            RetryBudget::Bounded(n) => n.to_string(),
            RetryBudget::Unlimited => "-1".to_string(),
        };
        ini.with_section(Some("transport"))
            .set("parallel", self.transport.concurrency.to_string())
            .set("retry_number", retry_number)
            .set(
                "part_timeout",
                self.transport.part_timeout.as_secs().to_string(),
            );
        match self.transport.local_retry {
            LocalRetryPolicy::ExponentialBackoff { max_attempts, .. } => {
                ini.with_section(Some("transport"))
                    .set("local_retries", max_attempts.max(1).to_string());
            }
            LocalRetryPolicy::None => {
                ini.with_section(Some("transport")).set("local_retries", "1");
            }
            LocalRetryPolicy::Fixed { .. } => {}
        }

        if let Some(dir) = &self.log_directory {
            ini.with_section(Some("logging"))
                .set("directory", dir.display().to_string());
        }
        ini.with_section(Some("logging"))
            .set("level", self.log_level.as_str());

        ini
    }
}

fn parse_value<T: FromStr>(
    ini: &Ini,
    section: &'static str,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match ini.get_from(Some(section), key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                section,
                key,
                value: raw.to_string(),
            }),
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
