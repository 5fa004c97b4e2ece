//! objstore - Multipart object transport for an S3-compatible object store
//!
//! Large genomic objects are moved as many byte-range parts in parallel.
//! Each part is fetched or stored through its own signed, time-limited URL
//! issued by a storage proxy. Expired URLs are refreshed, failed parts are
//! retried within a transfer-wide budget, and every failure is reported as
//! one aggregated error.
//!
//! # Modules
//!
//! - [`spec`]: parts, transfer specifications and HTTP byte ranges
//! - [`transport`]: the concurrent transfer engine and its builder
//! - [`proxy`]: the storage proxy interface and its REST client
//! - [`manager`]: whole-object download and upload orchestration
//! - [`progress`]: shared progress counters and periodic reporting
//! - [`journal`]: download resumption
//! - [`config`]: transfer settings and the INI configuration file
//! - [`logging`]: tracing subscriber setup

pub mod checksum;
pub mod config;
pub mod error;
pub mod journal;
pub mod local;
pub mod logging;
pub mod manager;
pub mod progress;
pub mod proxy;
pub mod spec;
pub mod transport;

pub use config::{ConfigError, ConfigFile, TransportConfig};
pub use error::{AbortReason, TransportError, TransportResult};
pub use manager::{ObjectDownloader, ObjectUploader};
pub use progress::{ProgressReporter, ProgressSnapshot, TransferProgress};
pub use proxy::{HttpStorageProxy, PartChecksum, ProxyError, StorageProxy};
pub use spec::{ByteRange, Part, TransferSpecification};
pub use transport::{
    EngineState, LocalRetryPolicy, RetryBudget, TransferReport, TransportBuilder, TransportEngine,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
