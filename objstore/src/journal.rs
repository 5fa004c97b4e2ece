//! Resumption journal for downloads.
//!
//! A JSON Lines sidecar next to the destination file records the SHA-256 of
//! every part written so far. The first line names the object, every later
//! line is one completed part:
//!
//! ```text
//! {"objectId":"a82efa12"}
//! {"partNumber":1,"offset":0,"size":1024,"sha256":"..."}
//! ```
//!
//! Completed parts are appended, so recording costs one short write no matter
//! how many parts the object has. Opening the journal compacts it. On the
//! next attempt, parts whose bytes on disk still hash to the recorded digest
//! are skipped.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::checksum;
use crate::error::{TransportError, TransportResult};
use crate::local::LocalFile;
use crate::spec::{Part, TransferSpecification};

const JOURNAL_SUFFIX: &str = ".parts.jsonl";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JournalHeader {
    object_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JournalEntry {
    part_number: u32,
    offset: u64,
    size: u64,
    sha256: String,
}

/// Record of download parts already written to disk.
#[derive(Debug)]
pub struct PartJournal {
    path: PathBuf,
    object_id: String,
    parts: BTreeMap<u32, JournalEntry>,
}

impl PartJournal {
    /// Conventional journal location for `object_id` in `output_dir`.
    pub fn path_for(output_dir: &Path, object_id: &str) -> PathBuf {
        output_dir.join(format!("{}{}", object_id, JOURNAL_SUFFIX))
    }

    /// Loads and compacts the journal at `path`, or starts an empty one.
    ///
    /// A journal with an unreadable header or belonging to another object is
    /// discarded. A damaged line ends the readable part of the journal; the
    /// entries before it are kept.
    pub fn open(path: impl Into<PathBuf>, object_id: &str) -> TransportResult<Self> {
        let path = path.into();
        let parts = match fs::read_to_string(&path) {
            Ok(raw) => Self::parse(&path, &raw, object_id),
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(TransportError::io(path, e)),
        };

        let journal = Self {
            path,
            object_id: object_id.to_string(),
            parts,
        };
        journal.compact()?;

        debug!(path = %journal.path.display(), parts = journal.parts.len(), "Opened part journal");
        Ok(journal)
    }

    fn parse(path: &Path, raw: &str, object_id: &str) -> BTreeMap<u32, JournalEntry> {
        let mut parts = BTreeMap::new();
        let mut lines = raw.lines().filter(|line| !line.trim().is_empty());

        match lines.next().map(serde_json::from_str::<JournalHeader>) {
            Some(Ok(header)) if header.object_id == object_id => {}
            Some(Ok(header)) => {
                warn!(
                    path = %path.display(),
                    found = %header.object_id,
                    expected = object_id,
                    "Discarding journal for a different object"
                );
                return parts;
            }
            Some(Err(e)) => {
                warn!(path = %path.display(), error = %e, "Discarding unreadable journal");
                return parts;
            }
            None => return parts,
        }

        for line in lines {
            match serde_json::from_str::<JournalEntry>(line) {
                Ok(entry) => {
                    parts.insert(entry.part_number, entry);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Ignoring damaged journal tail");
                    break;
                }
            }
        }
        parts
    }

    /// Location of the journal file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of recorded parts.
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// True if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Records a completed part by appending one line to the journal.
    pub async fn record(&mut self, part: &Part, sha256: impl Into<String>) -> TransportResult<()> {
        let entry = JournalEntry {
            part_number: part.part_number,
            offset: part.offset,
            size: part.part_size,
            sha256: sha256.into(),
        };
        let mut line =
            serde_json::to_vec(&entry).map_err(|e| TransportError::Journal(e.to_string()))?;
        line.push(b'\n');
        self.parts.insert(entry.part_number, entry);

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .and_then(|mut file| file.write_all(&line))
                .map_err(|e| TransportError::io(&path, e))
        })
        .await
        .map_err(|e| TransportError::Journal(format!("journal writer failed: {}", e)))?
    }

    /// Parts of `spec` whose bytes in `file` still match the journal.
    pub async fn verified_parts(
        &self,
        file: &LocalFile,
        spec: &TransferSpecification,
    ) -> TransportResult<BTreeSet<u32>> {
        let mut verified = BTreeSet::new();

        for (part_number, entry) in &self.parts {
            let Some(part) = spec.part(*part_number) else {
                continue;
            };
            if part.offset != entry.offset || part.part_size != entry.size {
                continue;
            }
            if entry.offset.saturating_add(entry.size) > file.len() {
                continue;
            }

            let bytes = file
                .read_at(entry.offset, entry.size)
                .await
                .map_err(|e| TransportError::io(file.path(), e))?;
            if checksum::sha256_hex(&bytes) == entry.sha256 {
                verified.insert(*part_number);
            } else {
                debug!(part_number, "Journaled part no longer matches disk");
            }
        }

        Ok(verified)
    }

    /// Deletes the journal file.
    pub fn remove(self) -> TransportResult<()> {
        Self::discard(&self.path)
    }

    /// Deletes the journal at `path`, if any.
    pub fn discard(path: &Path) -> TransportResult<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TransportError::io(path, e)),
        }
    }

    /// Rewrites the journal as a header plus one line per part.
    fn compact(&self) -> TransportResult<()> {
        let encode = |e: serde_json::Error| TransportError::Journal(e.to_string());

        let mut out = serde_json::to_vec(&JournalHeader {
            object_id: self.object_id.clone(),
        })
        .map_err(encode)?;
        out.push(b'\n');
        for entry in self.parts.values() {
            out.extend(serde_json::to_vec(entry).map_err(encode)?);
            out.push(b'\n');
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, out).map_err(|e| TransportError::io(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| TransportError::io(&self.path, e))
    }
}
