//! Dispatch log: JSONL persistence and digests of scheduler dispatch traces.
//!
//! Two runs of the same scenario must dispatch the same items in the same
//! order at the same virtual times. [`trace_digest`] reduces a trace to a
//! SHA-256 hex string so that check is a string comparison.

#![deny(unsafe_code)]

use sha2::{Digest, Sha256};
use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use thiserror::Error;
use vtime_core::{DispatchObserver, DispatchRecord};

/// Errors emitted by the dispatch log.
#[derive(Debug, Error)]
pub enum DispatchLogError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialize: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Canonical JSON line for a record (no trailing newline).
pub fn to_jsonl_line(record: &DispatchRecord) -> Result<String, DispatchLogError> {
    Ok(serde_json::to_string(record)?)
}

/// SHA-256 over the canonical JSONL encoding of `records`, lowercase hex.
/// Equals the digest of a log file holding exactly these records.
pub fn trace_digest(records: &[DispatchRecord]) -> Result<String, DispatchLogError> {
    let mut hasher = Sha256::new();
    for rec in records {
        hasher.update(to_jsonl_line(rec)?.as_bytes());
        hasher.update(b"\n");
    }
    Ok(hex::encode(hasher.finalize()))
}

/// A simple JSONL-backed append-only dispatch log.
///
/// ```
/// use dispatch_log::{trace_digest, JsonlDispatchLog};
/// use vtime_core::DispatchRecord;
///
/// let path = tempfile::NamedTempFile::new().unwrap();
/// let log = JsonlDispatchLog::open(path.path()).unwrap();
///
/// let recs = [
///     DispatchRecord { seq: 1, entry: 2, due_ms: 5, clock_ms: 5 },
///     DispatchRecord { seq: 2, entry: 1, due_ms: 10, clock_ms: 10 },
/// ];
/// log.append_all(&recs).unwrap();
///
/// let back = log.read_all().unwrap();
/// assert_eq!(back, recs);
/// assert_eq!(trace_digest(&back).unwrap(), trace_digest(&recs).unwrap());
/// ```
#[derive(Debug, Clone)]
pub struct JsonlDispatchLog {
    path: String,
}

impl JsonlDispatchLog {
    /// Create or open a log at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DispatchLogError> {
        let p = path.as_ref();
        if !p.exists() {
            OpenOptions::new().create(true).write(true).truncate(true).open(p)?;
        }
        Ok(Self { path: p.to_string_lossy().into_owned() })
    }

    /// Append one record.
    pub fn append(&self, record: &DispatchRecord) -> Result<(), DispatchLogError> {
        self.append_all(std::slice::from_ref(record))
    }

    /// Append records in order with a single flush.
    pub fn append_all(&self, records: &[DispatchRecord]) -> Result<(), DispatchLogError> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        for rec in records {
            let line = to_jsonl_line(rec)?;
            file.write_all(line.as_bytes())?;
            file.write_all(b"\n")?;
        }
        file.flush()?;
        Ok(())
    }

    /// Read records with seq in [start, end) (half-open range).
    pub fn read_range(
        &self,
        start: u64,
        end: u64,
    ) -> Result<Vec<DispatchRecord>, DispatchLogError> {
        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);
        let mut out = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let rec: DispatchRecord = serde_json::from_str(&line)?;
            if rec.seq >= start && rec.seq < end {
                out.push(rec);
            }
        }
        Ok(out)
    }

    /// Every record in file order.
    pub fn read_all(&self) -> Result<Vec<DispatchRecord>, DispatchLogError> {
        self.read_range(0, u64::MAX)
    }
}

/// Observer that keeps every dispatch record in memory.
#[derive(Debug, Default)]
pub struct TraceRecorder {
    records: RefCell<Vec<DispatchRecord>>,
}

impl TraceRecorder {
    /// Recorder with no records.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the records seen so far.
    pub fn records(&self) -> Vec<DispatchRecord> {
        self.records.borrow().clone()
    }

    /// Drain the records seen so far.
    pub fn take(&self) -> Vec<DispatchRecord> {
        std::mem::take(&mut *self.records.borrow_mut())
    }

    /// [`trace_digest`] of the records seen so far.
    pub fn digest(&self) -> Result<String, DispatchLogError> {
        trace_digest(&self.records.borrow())
    }
}

impl DispatchObserver for TraceRecorder {
    fn on_dispatch(&self, record: &DispatchRecord) {
        self.records.borrow_mut().push(*record);
    }
}
