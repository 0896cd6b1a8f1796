//! AuditSink: append-only log of every alert transition
//!
//! Delivery failures never block a transition. `deliver` retries once and
//! then reports the loss through tracing.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::{error, warn};

use crate::types::AuditRecord;
use crate::DEFAULT_AUDIT_MEMORY_CAPACITY;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit log I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("audit record could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
}

/// Durable or telemetry destination for audit rows
pub trait AuditSink: Send + Sync {
    /// Append one row
    fn append(&self, record: &AuditRecord) -> Result<(), AuditError>;

    /// Rows for one entry, if this sink can be queried
    fn records_for(&self, _entry_id: &str) -> Option<Vec<AuditRecord>> {
        None
    }
}

/// Append with one retry. Returns whether the row landed.
pub fn deliver(sink: &dyn AuditSink, record: &AuditRecord) -> bool {
    match sink.append(record) {
        Ok(()) => true,
        Err(first) => {
            warn!(entry_id = %record.entry_id, error = %first, "audit append failed, retrying");
            match sink.append(record) {
                Ok(()) => true,
                Err(second) => {
                    error!(
                        entry_id = %record.entry_id,
                        from = %record.from,
                        to = %record.to,
                        error = %second,
                        "audit record lost after retry"
                    );
                    false
                }
            }
        }
    }
}

/// In-memory sink, queryable. Holds at most `capacity` rows; the oldest are
/// evicted first.
#[derive(Debug)]
pub struct MemoryAuditSink {
    capacity: usize,
    records: Mutex<VecDeque<AuditRecord>>,
    evicted: AtomicU64,
}

impl Default for MemoryAuditSink {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_AUDIT_MEMORY_CAPACITY)
    }
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A capacity of zero is treated as one
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            evicted: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Rows dropped to stay within capacity
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    /// Everything still held, oldest first
    pub fn records(&self) -> Vec<AuditRecord> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<AuditRecord>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AuditSink for MemoryAuditSink {
    fn append(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let mut records = self.lock();
        if records.len() >= self.capacity {
            records.pop_front();
            if self.evicted.fetch_add(1, Ordering::Relaxed) == 0 {
                warn!(
                    capacity = self.capacity,
                    "in-memory audit sink full, evicting oldest rows; set audit_log_path to keep them"
                );
            }
        }
        records.push_back(record.clone());
        Ok(())
    }

    fn records_for(&self, entry_id: &str) -> Option<Vec<AuditRecord>> {
        Some(self.lock().iter().filter(|r| r.entry_id == entry_id).cloned().collect())
    }
}

/// JSON-lines file sink, one record per line
#[derive(Debug)]
pub struct JsonlAuditSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlAuditSink {
    /// Open (or create) the log for appending
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| AuditError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| AuditError::Io { path: path.clone(), source })?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonlAuditSink {
    fn append(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let line = record.to_json_line()?;
        let mut file = self
            .file
            .lock()
            .map_err(|_| AuditError::Unavailable("audit file lock poisoned".to_string()))?;
        writeln!(file, "{}", line)
            .and_then(|_| file.flush())
            .map_err(|source| AuditError::Io {
                path: self.path.clone(),
                source,
            })
    }

    fn records_for(&self, entry_id: &str) -> Option<Vec<AuditRecord>> {
        let file = File::open(&self.path).ok()?;
        let records = BufReader::new(file)
            .lines()
            .map_while(Result::ok)
            .filter_map(|line| serde_json::from_str::<AuditRecord>(&line).ok())
            .filter(|r| r.entry_id == entry_id)
            .collect();
        Some(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AlertState, TriggerSource};
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn record(entry_id: &str) -> AuditRecord {
        let now = Utc::now();
        AuditRecord::archive(&AlertState::new(entry_id, TriggerSource::Journal, now), now)
    }

    /// Fails the first `failures` appends
    struct FlakySink {
        failures: usize,
        calls: AtomicUsize,
    }

    impl AuditSink for FlakySink {
        fn append(&self, _record: &AuditRecord) -> Result<(), AuditError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(AuditError::Unavailable("down".into()))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_deliver_retries_once() {
        let sink = FlakySink { failures: 1, calls: AtomicUsize::new(0) };
        assert!(deliver(&sink, &record("e1")));
        assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_deliver_gives_up_after_retry() {
        let sink = FlakySink { failures: 5, calls: AtomicUsize::new(0) };
        assert!(!deliver(&sink, &record("e1")));
        assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_memory_sink_filters_by_entry() {
        let sink = MemoryAuditSink::new();
        sink.append(&record("a")).unwrap();
        sink.append(&record("b")).unwrap();
        sink.append(&record("a")).unwrap();
        assert_eq!(sink.len(), 3);
        assert_eq!(sink.records_for("a").unwrap().len(), 2);
    }

    #[test]
    fn test_memory_sink_evicts_oldest_past_capacity() {
        let sink = MemoryAuditSink::with_capacity(3);
        for entry in ["a", "b", "c", "d", "e"] {
            sink.append(&record(entry)).unwrap();
        }
        assert_eq!(sink.len(), 3);
        assert_eq!(sink.evicted(), 2);
        let kept: Vec<_> = sink.records().into_iter().map(|r| r.entry_id).collect();
        assert_eq!(kept, vec!["c", "d", "e"]);
        assert_eq!(sink.records_for("a").unwrap().len(), 0);
    }

    #[test]
    fn test_memory_sink_default_capacity() {
        let sink = MemoryAuditSink::new();
        assert_eq!(sink.capacity(), DEFAULT_AUDIT_MEMORY_CAPACITY);
        assert_eq!(MemoryAuditSink::with_capacity(0).capacity(), 1);
    }

    #[test]
    fn test_jsonl_sink_appends_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("audit.jsonl");
        let sink = JsonlAuditSink::open(&path).unwrap();
        sink.append(&record("a")).unwrap();
        sink.append(&record("b")).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert_eq!(sink.records_for("b").unwrap().len(), 1);

        // Reopening appends rather than truncating
        let sink = JsonlAuditSink::open(&path).unwrap();
        sink.append(&record("a")).unwrap();
        assert_eq!(sink.records_for("a").unwrap().len(), 2);
    }
}
