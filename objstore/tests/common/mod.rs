//! In-memory storage backend shared by the integration tests.
//!
//! [`MemoryStore`] plays both roles the engine talks to: the storage proxy
//! (issuing and refreshing specifications) and the object store behind the
//! signed URLs. URLs carry a generation number so tests can expire them.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use rand::Rng;

use objstore::checksum::md5_hex;
use objstore::proxy::{PartChecksum, ProxyError, ProxyResult, StorageProxy};
use objstore::transport::{BoxFuture, PartClient, PartError};
use objstore::{
    ByteRange, LocalRetryPolicy, Part, TransferProgress, TransferSpecification, TransportBuilder,
    TransportConfig, TransportEngine,
};

pub const OBJECT_ID: &str = "a82efa12-4c1e-5b6f-9d3a-7e0c2b1f4a55";
pub const SESSION_ID: &str = "upload-session-1";

/// Random object content.
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    rand::rng().fill(&mut buf[..]);
    buf
}

/// Engine settings that fail fast.
pub fn fast_config() -> TransportConfig {
    TransportConfig::default()
        .with_concurrency(4)
        .with_local_retry(LocalRetryPolicy::None)
        .with_part_timeout(Duration::from_secs(5))
}

/// Builds an engine wired to `store` for both proxy and part traffic.
pub fn engine_for(
    store: &Arc<MemoryStore>,
    spec: TransferSpecification,
    config: TransportConfig,
) -> TransportEngine {
    TransportBuilder::new()
        .proxy(store.clone())
        .client(store.clone())
        .progress(TransferProgress::default())
        .specification(spec)
        .config(config)
        .build()
        .unwrap()
}

#[derive(Debug, Clone)]
enum Injection<E> {
    Times(usize, E),
    Always(E),
}

impl<E: Clone> Injection<E> {
    /// The error to return for this request, if any.
    fn fire(&mut self) -> Option<E> {
        match self {
            Injection::Times(remaining, error) if *remaining > 0 => {
                *remaining -= 1;
                Some(error.clone())
            }
            Injection::Always(error) => Some(error.clone()),
            _ => None,
        }
    }
}

/// In-memory proxy and object store with failure injection.
pub struct MemoryStore {
    object: Vec<u8>,
    part_size: u64,
    generation: AtomicU64,
    valid_from: AtomicU64,
    expire_after: Mutex<Option<usize>>,
    successes: AtomicUsize,
    injections: Mutex<HashMap<u32, Injection<PartError>>>,
    corrupt: Mutex<HashSet<u32>>,
    stalled: Mutex<HashSet<u32>>,
    latency: Mutex<Option<Duration>>,
    calls: Mutex<HashMap<u32, usize>>,
    refresh_calls: AtomicUsize,
    refresh_error: Mutex<Option<Injection<ProxyError>>>,
    refreshed_part_size: Mutex<Option<u64>>,
    uploaded: Mutex<BTreeMap<u32, Vec<u8>>>,
    finalized: Mutex<Option<Vec<PartChecksum>>>,
    aborted: AtomicBool,
}

impl MemoryStore {
    /// A store holding `object`, split into parts of `part_size` bytes.
    pub fn new(object: Vec<u8>, part_size: u64) -> Arc<Self> {
        Arc::new(Self {
            object,
            part_size,
            generation: AtomicU64::new(0),
            valid_from: AtomicU64::new(0),
            expire_after: Mutex::new(None),
            successes: AtomicUsize::new(0),
            injections: Mutex::new(HashMap::new()),
            corrupt: Mutex::new(HashSet::new()),
            stalled: Mutex::new(HashSet::new()),
            latency: Mutex::new(None),
            calls: Mutex::new(HashMap::new()),
            refresh_calls: AtomicUsize::new(0),
            refresh_error: Mutex::new(None),
            refreshed_part_size: Mutex::new(None),
            uploaded: Mutex::new(BTreeMap::new()),
            finalized: Mutex::new(None),
            aborted: AtomicBool::new(false),
        })
    }

    pub fn object(&self) -> &[u8] {
        &self.object
    }

    /// Download plan at the current URL generation.
    pub fn download_spec(&self) -> TransferSpecification {
        self.plan(self.object.len() as u64, self.part_size, true)
    }

    /// Upload plan for `size` bytes.
    pub fn upload_spec(&self, size: u64) -> TransferSpecification {
        self.plan(size, self.part_size, false)
    }

    fn plan(&self, size: u64, part_size: u64, with_checksums: bool) -> TransferSpecification {
        let generation = self.generation.load(Ordering::SeqCst);
        let mut parts = Vec::new();
        let mut offset = 0u64;
        let mut part_number = 1u32;

        while offset < size {
            let len = part_size.min(size - offset);
            let url = format!("mem://{}/{}?g={}", OBJECT_ID, part_number, generation);
            let mut part = Part::new(part_number, offset, len, url);
            if with_checksums {
                let end = (offset + len) as usize;
                part = part.with_checksum(md5_hex(&self.object[offset as usize..end]));
            }
            parts.push(part);
            offset += len;
            part_number += 1;
        }

        TransferSpecification::new(OBJECT_ID, SESSION_ID, parts)
    }

    /// The first `times` requests for `part_number` fail with `error`.
    pub fn fail_times(&self, part_number: u32, times: usize, error: PartError) {
        self.injections
            .lock()
            .insert(part_number, Injection::Times(times, error));
    }

    /// Every request for `part_number` fails with `error`.
    pub fn fail_always(&self, part_number: u32, error: PartError) {
        self.injections
            .lock()
            .insert(part_number, Injection::Always(error));
    }

    /// Bytes served for (or ETags returned for) `part_number` are wrong.
    pub fn corrupt(&self, part_number: u32) {
        self.corrupt.lock().insert(part_number);
    }

    /// Requests for `part_number` never finish.
    pub fn stall(&self, part_number: u32) {
        self.stalled.lock().insert(part_number);
    }

    /// Every request takes at least `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    /// All URLs issued so far expire after `successes` successful requests.
    pub fn expire_after(&self, successes: usize) {
        *self.expire_after.lock() = Some(successes);
    }

    /// Every refresh fails with `error`.
    pub fn set_refresh_error(&self, error: ProxyError) {
        *self.refresh_error.lock() = Some(Injection::Always(error));
    }

    /// The next `times` refreshes fail with `error`.
    pub fn fail_refresh_times(&self, times: usize, error: ProxyError) {
        *self.refresh_error.lock() = Some(Injection::Times(times, error));
    }

    /// Refreshed plans split the object into parts of `part_size` bytes.
    pub fn reshape_on_refresh(&self, part_size: u64) {
        *self.refreshed_part_size.lock() = Some(part_size);
    }

    pub fn clear_failures(&self) {
        self.injections.lock().clear();
        self.corrupt.lock().clear();
        self.stalled.lock().clear();
    }

    pub fn calls_for(&self, part_number: u32) -> usize {
        self.calls.lock().get(&part_number).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Uploaded parts concatenated in part order.
    pub fn uploaded_object(&self) -> Vec<u8> {
        self.uploaded.lock().values().flatten().copied().collect()
    }

    pub fn finalized(&self) -> Option<Vec<PartChecksum>> {
        self.finalized.lock().clone()
    }

    pub fn was_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    fn parse_url(url: &str) -> (u32, u64) {
        let rest = url.rsplit('/').next().unwrap();
        let (part, generation) = rest.split_once("?g=").unwrap();
        (part.parse().unwrap(), generation.parse().unwrap())
    }

    fn admit(&self, url: &str) -> Result<u32, PartError> {
        let (part_number, generation) = Self::parse_url(url);
        *self.calls.lock().entry(part_number).or_default() += 1;

        if generation < self.valid_from.load(Ordering::SeqCst) {
            return Err(PartError::Expired);
        }

        match self
            .injections
            .lock()
            .get_mut(&part_number)
            .and_then(Injection::fire)
        {
            Some(error) => Err(error),
            None => Ok(part_number),
        }
    }

    /// Waits as a slow or stalled backend would.
    async fn delay(&self, part_number: u32) {
        let stalled = self.stalled.lock().contains(&part_number);
        if stalled {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn record_success(&self) {
        let done = self.successes.fetch_add(1, Ordering::SeqCst) + 1;
        let mut expire_after = self.expire_after.lock();
        if *expire_after == Some(done) {
            let next = self.generation.load(Ordering::SeqCst) + 1;
            self.valid_from.store(next, Ordering::SeqCst);
            *expire_after = None;
        }
    }
}

impl PartClient for MemoryStore {
    fn get_range<'a>(
        &'a self,
        url: &'a str,
        range: ByteRange,
    ) -> BoxFuture<'a, Result<Bytes, PartError>> {
        let admitted = self.admit(url);
        Box::pin(async move {
            let part_number = admitted?;
            self.delay(part_number).await;

            let mut body = self.object[range.start as usize..=range.end as usize].to_vec();
            if self.corrupt.lock().contains(&part_number) {
                body[0] ^= 0xff;
            }
            self.record_success();
            Ok(Bytes::from(body))
        })
    }

    fn put_part<'a>(
        &'a self,
        url: &'a str,
        body: Bytes,
    ) -> BoxFuture<'a, Result<Option<String>, PartError>> {
        let admitted = self.admit(url);
        Box::pin(async move {
            let part_number = admitted?;
            self.delay(part_number).await;

            let etag = if self.corrupt.lock().contains(&part_number) {
                md5_hex(b"something else")
            } else {
                md5_hex(&body)
            };
            self.uploaded.lock().insert(part_number, body.to_vec());
            self.record_success();
            Ok(Some(format!("\"{}\"", etag)))
        })
    }
}

impl StorageProxy for MemoryStore {
    fn get_download_specification<'a>(
        &'a self,
        object_id: &'a str,
    ) -> BoxFuture<'a, ProxyResult<TransferSpecification>> {
        Box::pin(async move {
            if object_id != OBJECT_ID {
                return Err(ProxyError::NotFound(object_id.to_string()));
            }
            Ok(self.download_spec())
        })
    }

    fn get_upload_specification<'a>(
        &'a self,
        _object_id: &'a str,
        file_size: u64,
    ) -> BoxFuture<'a, ProxyResult<TransferSpecification>> {
        Box::pin(async move { Ok(self.upload_spec(file_size)) })
    }

    fn refresh_specification<'a>(
        &'a self,
        _object_id: &'a str,
        _session_id: &'a str,
    ) -> BoxFuture<'a, ProxyResult<TransferSpecification>> {
        Box::pin(async move {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            let error = self.refresh_error.lock().as_mut().and_then(Injection::fire);
            if let Some(error) = error {
                return Err(error);
            }
            self.generation.fetch_add(1, Ordering::SeqCst);

            let part_size = *self.refreshed_part_size.lock();
            let part_size = part_size.unwrap_or(self.part_size);
            Ok(self.plan(self.object.len() as u64, part_size, true))
        })
    }

    fn finalize_upload<'a>(
        &'a self,
        _object_id: &'a str,
        _session_id: &'a str,
        parts: &'a [PartChecksum],
    ) -> BoxFuture<'a, ProxyResult<()>> {
        Box::pin(async move {
            *self.finalized.lock() = Some(parts.to_vec());
            Ok(())
        })
    }

    fn abort_upload<'a>(
        &'a self,
        _object_id: &'a str,
        _session_id: &'a str,
    ) -> BoxFuture<'a, ProxyResult<()>> {
        Box::pin(async move {
            self.aborted.store(true, Ordering::SeqCst);
            Ok(())
        })
    }
}
