//! The transport engine.
//!
//! One engine moves one object. It owns a slot per part, dispatches at most
//! `concurrency` worker tasks at a time, and funnels every [`PartOutcome`]
//! through a single decision loop that applies the retry budget, refreshes
//! expired URLs, and decides when the transfer has completed or aborted.
//!
//! ```text
//!            ┌──────── queue of slots ────────┐
//!            ▼                                 │ re-queue
//!   dispatch (≤ concurrency) ──► worker task ──┤
//!                                   │ (slot, outcome)
//!                                   ▼
//!                          decision loop ──► progress / journal / refresh
//! ```

use std::collections::{BTreeSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::client::PartClient;
use super::policy::LocalRetryPolicy;
use super::worker::{FailureReason, PartOutcome, PartReceipt, PartWorker, TransferDirection};
use crate::config::TransportConfig;
use crate::error::{AbortReason, TransportError, TransportResult};
use crate::journal::PartJournal;
use crate::local::LocalFile;
use crate::progress::TransferProgress;
use crate::proxy::{PartChecksum, StorageProxy};
use crate::spec::{Part, TransferSpecification};

/// Lifecycle of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Built, not yet started.
    Idle,
    /// `send` or `receive` in progress.
    Running,
    /// Every part transferred.
    Completed,
    /// Stopped before every part transferred.
    Aborted,
}

/// Summary of a completed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub object_id: String,
    pub session_id: String,
    /// Parts moved over the network during this run.
    pub parts_transferred: usize,
    /// Parts found already valid on disk and skipped.
    pub parts_resumed: usize,
    /// Bytes moved over the network during this run.
    pub bytes_transferred: u64,
    /// Re-queues charged against the retry budget.
    pub retries: u64,
    /// Specification refreshes performed.
    pub refreshes: u64,
    /// Checksums of the parts moved during this run, by part number.
    pub part_checksums: Vec<PartChecksum>,
}

struct Slot {
    part: Part,
    done: bool,
    /// Refresh generation the current URL belongs to.
    generation: u64,
    mismatches: u32,
    /// Wait applied before the next dispatch.
    backoff: Option<Duration>,
    receipt: Option<PartReceipt>,
}

type WorkerMessage = (usize, u64, PartOutcome);

/// Consecutive failed refreshes after which the backoff stops growing.
const REFRESH_BACKOFF_STEPS: u32 = 8;

/// Wait before re-dispatching a part whose URL could not be refreshed.
fn refresh_backoff(consecutive_failures: u32) -> Duration {
    let step = consecutive_failures.clamp(1, REFRESH_BACKOFF_STEPS);
    LocalRetryPolicy::exponential(REFRESH_BACKOFF_STEPS + 1)
        .delay_for_attempt(step)
        .unwrap_or_default()
}

/// Moves one object as a set of concurrently transferred parts.
pub struct TransportEngine {
    proxy: Arc<dyn StorageProxy>,
    client: Arc<dyn PartClient>,
    progress: TransferProgress,
    specification: TransferSpecification,
    config: TransportConfig,
    cancel: CancellationToken,
    journal: Mutex<Option<PartJournal>>,
    state: Mutex<EngineState>,
}

impl TransportEngine {
    pub(crate) fn new(
        proxy: Arc<dyn StorageProxy>,
        client: Arc<dyn PartClient>,
        progress: TransferProgress,
        specification: TransferSpecification,
        config: TransportConfig,
        cancel: CancellationToken,
        journal: Option<PartJournal>,
    ) -> Self {
        Self {
            proxy,
            client,
            progress,
            specification,
            config,
            cancel,
            journal: Mutex::new(journal),
            state: Mutex::new(EngineState::Idle),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        *self.state.lock()
    }

    /// The specification this engine transfers.
    pub fn specification(&self) -> &TransferSpecification {
        &self.specification
    }

    /// Progress handle updated by this engine.
    pub fn progress(&self) -> &TransferProgress {
        &self.progress
    }

    /// Token that cancels this transfer.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Downloads the object into `path`.
    ///
    /// The file is created if missing and sized to the object. Existing
    /// contents are kept; with a journal attached, parts already valid on
    /// disk are not fetched again.
    pub async fn receive(&self, path: &Path) -> TransportResult<TransferReport> {
        self.begin()?;
        let result = self.run_receive(path).await;
        self.finish(&result);
        result
    }

    /// Uploads `path`, which must be exactly the specification's total size.
    pub async fn send(&self, path: &Path) -> TransportResult<TransferReport> {
        self.begin()?;
        let result = self.run_send(path).await;
        self.finish(&result);
        result
    }

    fn begin(&self) -> TransportResult<()> {
        let mut state = self.state.lock();
        if *state != EngineState::Idle {
            return Err(TransportError::AlreadyStarted);
        }
        *state = EngineState::Running;
        Ok(())
    }

    fn finish(&self, result: &TransportResult<TransferReport>) {
        *self.state.lock() = match result {
            Ok(_) => EngineState::Completed,
            Err(_) => EngineState::Aborted,
        };
    }

    async fn run_receive(&self, path: &Path) -> TransportResult<TransferReport> {
        self.specification.validate()?;
        let file = LocalFile::prepare_download(path, self.specification.total_size())?;

        let journal = self.journal.lock().take();
        let resumed = match &journal {
            Some(journal) => journal.verified_parts(&file, &self.specification).await?,
            None => BTreeSet::new(),
        };

        let report = self
            .execute(TransferDirection::Download, file.clone(), journal, resumed)
            .await?;

        file.sync_all()
            .await
            .map_err(|e| TransportError::io(file.path(), e))?;
        Ok(report)
    }

    async fn run_send(&self, path: &Path) -> TransportResult<TransferReport> {
        self.specification.validate()?;
        let file = LocalFile::open_upload(path, self.specification.total_size())?;
        self.execute(TransferDirection::Upload, file, None, BTreeSet::new())
            .await
    }

    async fn execute(
        &self,
        direction: TransferDirection,
        file: LocalFile,
        mut journal: Option<PartJournal>,
        resumed: BTreeSet<u32>,
    ) -> TransportResult<TransferReport> {
        let spec = &self.specification;
        let concurrency = self.config.concurrency.max(1);

        self.progress.reset(spec.len() as u64, spec.total_size());

        let mut slots: Vec<Slot> = spec
            .parts
            .iter()
            .map(|part| Slot {
                part: part.clone(),
                done: false,
                generation: 0,
                mismatches: 0,
                backoff: None,
                receipt: None,
            })
            .collect();

        let mut queue = VecDeque::with_capacity(slots.len());
        for (idx, slot) in slots.iter_mut().enumerate() {
            if resumed.contains(&slot.part.part_number) {
                slot.done = true;
                self.progress.record_completion(slot.part.part_size);
            } else {
                queue.push_back(idx);
            }
        }

        info!(
            object_id = %spec.object_id,
            direction = ?direction,
            parts = slots.len(),
            resumed = resumed.len(),
            total_bytes = spec.total_size(),
            concurrency,
            "Transfer started"
        );

        let worker = Arc::new(PartWorker::new(
            Arc::clone(&self.client),
            file,
            self.config.local_retry.clone(),
            self.config.part_timeout,
        ));
        let (tx, mut rx) = mpsc::channel::<WorkerMessage>(concurrency);

        let mut in_flight = 0usize;
        let mut generation = 0u64;
        let mut retries = 0u64;
        let mut refreshes = 0u64;
        let mut refresh_failures = 0u32;
        let mut abort: Option<AbortReason> = None;
        let mut failed_parts = BTreeSet::new();

        loop {
            while abort.is_none() && in_flight < concurrency {
                if self.cancel.is_cancelled() {
                    abort = Some(AbortReason::Cancelled);
                    break;
                }
                let Some(idx) = queue.pop_front() else {
                    break;
                };
                let backoff = slots[idx].backoff.take();
                self.dispatch(&worker, direction, idx, &slots[idx], backoff, &tx);
                in_flight += 1;
            }

            if in_flight == 0 {
                break;
            }

            let (idx, dispatched_generation, outcome) = tokio::select! {
                biased;

                _ = self.cancel.cancelled(), if abort.is_none() => {
                    warn!(object_id = %spec.object_id, in_flight, "Transfer cancelled, draining workers");
                    abort = Some(AbortReason::Cancelled);
                    continue;
                }

                message = rx.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };
            in_flight -= 1;

            let part_number = slots[idx].part.part_number;
            match outcome {
                PartOutcome::Success(receipt) => {
                    let slot = &mut slots[idx];
                    if slot.done {
                        continue;
                    }
                    slot.done = true;
                    self.progress.record_completion(receipt.bytes);

                    if let (Some(journal), Some(sha256)) = (journal.as_mut(), &receipt.sha256) {
                        if let Err(e) = journal.record(&slot.part, sha256.clone()).await {
                            warn!(part_number, error = %e, "Failed to update part journal");
                        }
                    }
                    slot.receipt = Some(receipt);
                }

                PartOutcome::Fatal(reason) => {
                    failed_parts.insert(part_number);
                    if abort.is_none() {
                        error!(part_number, error = %reason, "Part failed permanently");
                        abort = Some(AbortReason::Fatal {
                            part_number,
                            reason,
                        });
                    }
                }

                PartOutcome::Retryable(reason) => {
                    if abort.is_some() {
                        continue;
                    }

                    if matches!(reason, FailureReason::ChecksumMismatch { .. }) {
                        let slot = &mut slots[idx];
                        slot.mismatches += 1;
                        if slot.mismatches > 1 {
                            error!(part_number, error = %reason, "Checksum mismatch repeated");
                            failed_parts.insert(part_number);
                            abort = Some(AbortReason::Fatal {
                                part_number,
                                reason,
                            });
                            continue;
                        }
                    }

                    if !self.config.retry_budget.allows(retries) {
                        error!(part_number, retries, error = %reason, "Retry budget exhausted");
                        failed_parts.insert(part_number);
                        abort = Some(AbortReason::RetryBudgetExhausted { retries });
                        continue;
                    }

                    if reason == FailureReason::ExpiredUrl
                        && slots[idx].generation <= dispatched_generation
                    {
                        match self.refresh(&mut slots, generation + 1).await {
                            Ok(true) => {
                                generation += 1;
                                refreshes += 1;
                                refresh_failures = 0;
                            }
                            Ok(false) => {
                                refresh_failures += 1;
                                slots[idx].backoff = Some(refresh_backoff(refresh_failures));
                            }
                            Err(reason) => {
                                error!(part_number, reason = %reason, "Cannot refresh part URLs");
                                failed_parts.insert(part_number);
                                abort = Some(reason);
                                continue;
                            }
                        }
                    }

                    retries += 1;
                    warn!(
                        part_number,
                        retries,
                        budget = %self.config.retry_budget,
                        error = %reason,
                        "Re-queueing part"
                    );
                    queue.push_back(idx);
                }
            }
        }
        drop(tx);

        // A cancelled transfer never reports success, even if the drain
        // finished every remaining part.
        let incomplete = slots.iter().filter(|s| !s.done).count();
        if incomplete > 0 || abort.is_some() {
            let reason = abort.unwrap_or(AbortReason::Cancelled);
            error!(
                object_id = %spec.object_id,
                reason = %reason,
                incomplete,
                "Transfer aborted"
            );
            return Err(TransportError::Aborted {
                reason,
                failed_parts: failed_parts.into_iter().collect(),
                incomplete_parts: incomplete,
            });
        }

        let mut parts_transferred = 0;
        let mut bytes_transferred = 0;
        let mut part_checksums = Vec::new();
        for receipt in slots.iter().filter_map(|s| s.receipt.as_ref()) {
            parts_transferred += 1;
            bytes_transferred += receipt.bytes;
            part_checksums.push(PartChecksum {
                part_number: receipt.part_number,
                checksum: receipt.checksum.clone(),
            });
        }
        part_checksums.sort_by_key(|p| p.part_number);

        info!(
            object_id = %spec.object_id,
            parts_transferred,
            parts_resumed = resumed.len(),
            bytes_transferred,
            retries,
            refreshes,
            "Transfer completed"
        );

        Ok(TransferReport {
            object_id: spec.object_id.clone(),
            session_id: spec.session_id.clone(),
            parts_transferred,
            parts_resumed: resumed.len(),
            bytes_transferred,
            retries,
            refreshes,
            part_checksums,
        })
    }

    fn dispatch(
        &self,
        worker: &Arc<PartWorker>,
        direction: TransferDirection,
        idx: usize,
        slot: &Slot,
        backoff: Option<Duration>,
        tx: &mpsc::Sender<WorkerMessage>,
    ) {
        let worker = Arc::clone(worker);
        let part = slot.part.clone();
        let generation = slot.generation;
        let tx = tx.clone();
        let cancel = self.cancel.clone();

        debug!(part_number = part.part_number, offset = part.offset, ?backoff, "Dispatching part");
        tokio::spawn(async move {
            if let Some(delay) = backoff {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        let _ = tx
                            .send((idx, generation, PartOutcome::Retryable(FailureReason::ExpiredUrl)))
                            .await;
                        return;
                    }
                }
            }

            let outcome = AssertUnwindSafe(worker.run(direction, &part))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    PartOutcome::Fatal(FailureReason::Internal(format!(
                        "worker for part {} panicked",
                        part.part_number
                    )))
                });
            let _ = tx.send((idx, generation, outcome)).await;
        });
    }

    /// Fetches fresh URLs for every incomplete slot.
    ///
    /// Returns `Ok(false)` when the proxy failed transiently. The caller
    /// re-queues the part with a growing backoff and the next expiry retries
    /// the refresh.
    async fn refresh(&self, slots: &mut [Slot], generation: u64) -> Result<bool, AbortReason> {
        let spec = &self.specification;
        info!(object_id = %spec.object_id, session_id = %spec.session_id, "Refreshing expired part URLs");

        let fresh = match self
            .proxy
            .refresh_specification(&spec.object_id, &spec.session_id)
            .await
        {
            Ok(fresh) => fresh,
            Err(e) if e.is_retryable() => {
                warn!(error = %e, "Specification refresh failed, will retry");
                return Ok(false);
            }
            Err(e) => return Err(AbortReason::ProxyUnavailable(e.to_string())),
        };

        if fresh.len() != slots.len() {
            return Err(AbortReason::SpecificationChanged(format!(
                "expected {} parts, got {}",
                slots.len(),
                fresh.len()
            )));
        }

        let mut updated = Vec::with_capacity(slots.len());
        for slot in slots.iter() {
            let Some(part) = fresh.part(slot.part.part_number) else {
                return Err(AbortReason::SpecificationChanged(format!(
                    "part {} missing",
                    slot.part.part_number
                )));
            };
            if !slot.part.same_geometry(part) {
                return Err(AbortReason::SpecificationChanged(format!(
                    "part {} moved to offset {} size {}",
                    part.part_number, part.offset, part.part_size
                )));
            }
            updated.push(slot.part.with_url(part.url.clone()));
        }

        for (slot, part) in slots.iter_mut().zip(updated) {
            if !slot.done {
                slot.part = part;
                slot.generation = generation;
            }
        }
        Ok(true)
    }
}
