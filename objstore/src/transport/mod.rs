//! Concurrent multipart transfer.
//!
//! - [`policy`]: retry budget and local retry policy
//! - [`client`]: the HTTP exchange for one part
//! - [`worker`]: one part attempt with local retries
//! - [`engine`]: bounded concurrency, refresh and abort decisions
//! - [`builder`]: validated engine construction

pub mod builder;
pub mod client;
pub mod engine;
pub mod policy;
pub mod worker;

pub use builder::TransportBuilder;
pub use client::{BoxFuture, PartClient, PartError, ReqwestPartClient};
pub use engine::{EngineState, TransferReport, TransportEngine};
pub use policy::{LocalRetryPolicy, RetryBudget, DEFAULT_LOCAL_ATTEMPTS, DEFAULT_RETRY_NUMBER};
pub use worker::{FailureReason, PartOutcome, PartReceipt, PartWorker, TransferDirection};
