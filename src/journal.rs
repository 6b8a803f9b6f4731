//! Append-only audit journal.
//!
//! Spec §4.6: every order submission, fill, guard rejection and lifecycle
//! transition is recorded as a single JSONL line. Writes are serialized
//! through a single writer so concurrent callers never interleave partial
//! lines; restore surfaces corrupt lines rather than discarding them
//! silently. Grounded on the teacher's `infrastructure/` persistence layer
//! idiom (append-only file, `#[async_trait]` surface) generalized from
//! SQLite to JSONL per the spec's data model.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use crate::error::{Result, TradingError};

/// A single journal entry: a monotonically recorded, timestamped fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub sequence: u64,
    pub timestamp_ms: i64,
    pub kind: String,
    pub payload: Value,
}

/// A line in the journal that failed to parse as a [`JournalEntry`].
#[derive(Debug, Clone)]
pub struct CorruptLine {
    pub line_number: usize,
    pub raw: String,
    pub reason: String,
}

/// The outcome of restoring a journal from disk: the entries that parsed,
/// plus any lines that did not.
#[derive(Debug, Clone, Default)]
pub struct RestoreReport {
    pub entries: Vec<JournalEntry>,
    pub corrupt: Vec<CorruptLine>,
}

#[async_trait]
pub trait Journal: Send + Sync {
    async fn record(&self, kind: &str, payload: Value) -> Result<JournalEntry>;

    async fn restore(&self) -> Result<RestoreReport>;

    /// Drain any pending writes and reject further `record` calls. Called
    /// once, from the lifecycle's `shutdown` transition (spec §5).
    async fn close(&self) -> Result<()>;
}

/// An in-memory journal, for tests and paper-trading sessions that should
/// not touch disk.
#[derive(Default)]
pub struct MemoryJournal {
    entries: Mutex<Vec<JournalEntry>>,
    next_sequence: Mutex<u64>,
    clock: Option<std::sync::Arc<dyn crate::clock::Clock>>,
    closed: std::sync::atomic::AtomicBool,
}

impl MemoryJournal {
    #[must_use]
    pub fn new(clock: std::sync::Arc<dyn crate::clock::Clock>) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            next_sequence: Mutex::new(1),
            clock: Some(clock),
            closed: std::sync::atomic::AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn entries(&self) -> Vec<JournalEntry> {
        self.entries.lock().clone()
    }
}

#[async_trait]
impl Journal for MemoryJournal {
    async fn record(&self, kind: &str, payload: Value) -> Result<JournalEntry> {
        if self.closed.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(TradingError::invalid_state("journal is closed"));
        }
        let mut seq = self.next_sequence.lock();
        let entry = JournalEntry {
            sequence: *seq,
            timestamp_ms: self.clock.as_ref().map_or(0, |c| c.now_ms()),
            kind: kind.to_string(),
            payload,
        };
        *seq += 1;
        self.entries.lock().push(entry.clone());
        Ok(entry)
    }

    async fn restore(&self) -> Result<RestoreReport> {
        Ok(RestoreReport { entries: self.entries(), corrupt: Vec::new() })
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }
}

/// A JSONL file journal. A single in-process writer lock serializes
/// concurrent `record` calls so lines are never interleaved; restoring
/// re-reads the whole file and surfaces any line that fails to parse as a
/// [`JournalEntry`] instead of silently dropping it.
pub struct FileJournal {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
    next_sequence: Mutex<u64>,
    clock: std::sync::Arc<dyn crate::clock::Clock>,
    closed: std::sync::atomic::AtomicBool,
}

impl FileJournal {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, clock: std::sync::Arc<dyn crate::clock::Clock>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
            next_sequence: Mutex::new(1),
            clock,
            closed: std::sync::atomic::AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parse_lines(raw: &str) -> RestoreReport {
        let mut report = RestoreReport::default();
        for (idx, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<JournalEntry>(line) {
                Ok(entry) => report.entries.push(entry),
                Err(e) => report.corrupt.push(CorruptLine {
                    line_number: idx + 1,
                    raw: line.to_string(),
                    reason: e.to_string(),
                }),
            }
        }
        report
    }
}

#[async_trait]
impl Journal for FileJournal {
    async fn record(&self, kind: &str, payload: Value) -> Result<JournalEntry> {
        if self.closed.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(TradingError::invalid_state("closed"));
        }
        let _guard = self.write_lock.lock().await;
        let sequence = {
            let mut seq = self.next_sequence.lock();
            let s = *seq;
            *seq += 1;
            s
        };
        let entry = JournalEntry {
            sequence,
            timestamp_ms: self.clock.now_ms(),
            kind: kind.to_string(),
            payload,
        };
        let line = serde_json::to_string(&entry)?;
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path).await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        Ok(entry)
    }

    async fn restore(&self) -> Result<RestoreReport> {
        let _guard = self.write_lock.lock().await;
        if !self.path.exists() {
            return Ok(RestoreReport::default());
        }
        let file = std::fs::File::open(&self.path)?;
        let mut raw = String::new();
        let mut reader = BufReader::new(file);
        let mut line = String::new();
        loop {
            line.clear();
            let n = reader.read_line(&mut line)?;
            if n == 0 {
                break;
            }
            raw.push_str(&line);
        }
        let report = Self::parse_lines(&raw);
        if let Some(max) = report.entries.iter().map(|e| e.sequence).max() {
            let mut seq = self.next_sequence.lock();
            *seq = (*seq).max(max + 1);
        }
        Ok(report)
    }

    /// Acquire the write lock (draining any writer already holding it),
    /// then mark the journal closed so further `record` calls reject with
    /// `"closed"`.
    async fn close(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.closed.store(true, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }
}
