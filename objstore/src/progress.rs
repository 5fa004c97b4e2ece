//! Progress tracking for multipart transfers.
//!
//! [`TransferProgress`] is a cheap, cloneable handle over atomic counters.
//! The engine updates it on every successful part; display layers read it
//! through [`TransferProgress::snapshot`] at any cadence without blocking the
//! transfer. [`ProgressReporter`] polls a tracker from a dedicated thread and
//! hands snapshots to a callback.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Default interval between progress reports.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_millis(100);

/// Callback receiving periodic progress snapshots.
pub type ProgressCallback = Box<dyn Fn(ProgressSnapshot) + Send + Sync>;

/// Point-in-time view of a transfer's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressSnapshot {
    /// Parts fully transferred.
    pub completed_parts: u64,
    /// Parts in the specification.
    pub total_parts: u64,
    /// Bytes of completed parts.
    pub bytes_transferred: u64,
    /// Total object size.
    pub total_bytes: u64,
}

impl ProgressSnapshot {
    /// True once every part has completed.
    pub fn is_complete(&self) -> bool {
        self.total_parts > 0 && self.completed_parts == self.total_parts
    }

    /// Completion as a percentage of parts.
    pub fn percent(&self) -> f64 {
        if self.total_parts == 0 {
            return 0.0;
        }
        (self.completed_parts as f64 / self.total_parts as f64) * 100.0
    }
}

#[derive(Debug, Default)]
struct Counters {
    total_parts: AtomicU64,
    completed_parts: AtomicU64,
    total_bytes: AtomicU64,
    bytes_transferred: AtomicU64,
}

/// Shared completed/total counters for one transfer.
#[derive(Debug, Clone, Default)]
pub struct TransferProgress {
    inner: Arc<Counters>,
}

impl TransferProgress {
    /// Creates a tracker for the given totals.
    pub fn new(total_parts: u64, total_bytes: u64) -> Self {
        let progress = Self::default();
        progress.reset(total_parts, total_bytes);
        progress
    }

    /// Rebinds the tracker to new totals and clears completed counts.
    pub fn reset(&self, total_parts: u64, total_bytes: u64) {
        self.inner.total_parts.store(total_parts, Ordering::SeqCst);
        self.inner.total_bytes.store(total_bytes, Ordering::SeqCst);
        self.inner.completed_parts.store(0, Ordering::SeqCst);
        self.inner.bytes_transferred.store(0, Ordering::SeqCst);
    }

    /// Records one completed part of `bytes` bytes.
    ///
    /// Callers must invoke this at most once per part. The completed count
    /// never exceeds the total; returns false if the tracker was already full.
    pub fn record_completion(&self, bytes: u64) -> bool {
        let total = self.inner.total_parts.load(Ordering::SeqCst);
        let updated = self
            .inner
            .completed_parts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |done| {
                (done < total).then_some(done + 1)
            })
            .is_ok();

        if updated {
            self.inner
                .bytes_transferred
                .fetch_add(bytes, Ordering::SeqCst);
        }
        updated
    }

    /// Reads all counters without blocking writers.
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            completed_parts: self.inner.completed_parts.load(Ordering::SeqCst),
            total_parts: self.inner.total_parts.load(Ordering::SeqCst),
            bytes_transferred: self.inner.bytes_transferred.load(Ordering::SeqCst),
            total_bytes: self.inner.total_bytes.load(Ordering::SeqCst),
        }
    }
}

/// Polls a [`TransferProgress`] from a background thread.
///
/// Stops when [`stop`](Self::stop) is called or the reporter is dropped,
/// delivering one final snapshot.
pub struct ProgressReporter {
    handle: Option<JoinHandle<()>>,
    done: Arc<AtomicBool>,
}

impl ProgressReporter {
    /// Starts reporting at `interval`.
    pub fn start(progress: TransferProgress, callback: ProgressCallback, interval: Duration) -> Self {
        let done = Arc::new(AtomicBool::new(false));
        let done_clone = Arc::clone(&done);

        let handle = thread::spawn(move || {
            while !done_clone.load(Ordering::SeqCst) {
                callback(progress.snapshot());
                thread::sleep(interval);
            }

            // Final report
            callback(progress.snapshot());
        });

        Self {
            handle: Some(handle),
            done,
        }
    }

    /// Starts a reporter with the default 100ms interval.
    pub fn start_default(progress: TransferProgress, callback: ProgressCallback) -> Self {
        Self::start(progress, callback, DEFAULT_REPORT_INTERVAL)
    }

    /// Stops the reporter and waits for the final report.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.done.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.shutdown();
    }
}
