//! Persistent error record: `backup_error_<epoch_ms>.log`, one line per
//! recorded error, plus the in-memory `error_count`/`retry_count`
//! counters the coordinator exposes.

use backup_core::{Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// One recorded error: code, message, and when it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    /// Milliseconds since the Unix epoch at which the error was recorded.
    pub timestamp_ms: u64,
    /// [`Error::code`] of the underlying error.
    pub code: i32,
    /// `Display` of the underlying error.
    pub message: String,
}

impl ErrorRecord {
    fn log_line(&self) -> String {
        format!("[{}] Error {}: {}\n", self.timestamp_ms, self.code, self.message)
    }
}

/// Coordinator-wide error counters, snapshot via [`ErrorLog::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorStats {
    /// Total number of errors recorded since the log was created.
    pub error_count: u64,
    /// Total number of retry attempts recorded since the log was created.
    pub retry_count: u64,
}

/// Appends error records to `backup_error_<epoch_ms>.log` under a
/// configured directory and keeps a bounded in-memory ring of the most
/// recent ones.
pub struct ErrorLog {
    store_path: PathBuf,
    enabled: bool,
    buffer: Mutex<VecDeque<ErrorRecord>>,
    buffer_size: usize,
    error_count: AtomicU64,
    retry_count: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl ErrorLog {
    /// Build an error log writing under `store_path` (created lazily,
    /// only if `enabled`) with an in-memory ring of `buffer_size`
    /// records.
    pub fn new(store_path: PathBuf, enabled: bool, buffer_size: usize) -> Self {
        ErrorLog {
            store_path,
            enabled,
            buffer: Mutex::new(VecDeque::with_capacity(buffer_size.max(1))),
            buffer_size: buffer_size.max(1),
            error_count: AtomicU64::new(0),
            retry_count: AtomicU64::new(0),
            last_error: Mutex::new(None),
        }
    }

    /// Record an error: bump `error_count`, remember it as `last_error`,
    /// push it into the in-memory ring, and (if enabled) append it to
    /// the epoch-stamped log file.
    pub fn record(&self, epoch_ms: u64, err: &Error) -> Result<()> {
        self.error_count.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock() = Some(err.to_string());

        let record = ErrorRecord {
            timestamp_ms: epoch_ms,
            code: err.code(),
            message: err.to_string(),
        };

        let mut buffer = self.buffer.lock();
        if buffer.len() >= self.buffer_size {
            buffer.pop_front();
        }
        buffer.push_back(record.clone());
        drop(buffer);

        if self.enabled {
            self.append_to_file(epoch_ms, &record)?;
        }
        Ok(())
    }

    /// Record one retry attempt (bumps `retry_count` only; not logged to
    /// the file, which records failures, not attempts).
    pub fn record_retry(&self) {
        self.retry_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Current counters.
    pub fn stats(&self) -> ErrorStats {
        ErrorStats {
            error_count: self.error_count.load(Ordering::Relaxed),
            retry_count: self.retry_count.load(Ordering::Relaxed),
        }
    }

    /// The most recently recorded error's message, if any.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    /// Clear `last_error` and the in-memory ring (counters are left
    /// untouched; they're cumulative).
    pub fn clear_error(&self) {
        *self.last_error.lock() = None;
        self.buffer.lock().clear();
    }

    /// The most recent records still held in memory, oldest first.
    pub fn recent_records(&self) -> Vec<ErrorRecord> {
        self.buffer.lock().iter().cloned().collect()
    }

    fn append_to_file(&self, epoch_ms: u64, record: &ErrorRecord) -> Result<()> {
        std::fs::create_dir_all(&self.store_path).map_err(|e| Error::FileIo(e.to_string()))?;
        let path = self.log_path(epoch_ms);
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::FileIo(e.to_string()))?;
        file.write_all(record.log_line().as_bytes())
            .map_err(|e| Error::FileIo(e.to_string()))?;
        Ok(())
    }

    fn log_path(&self, epoch_ms: u64) -> PathBuf {
        self.store_path.join(format!("backup_error_{epoch_ms}.log"))
    }
}

/// Where `epoch_ms`'s error log file would live under `store_path`, for
/// callers that want to locate it without going through [`ErrorLog`].
pub fn log_path_for(store_path: &Path, epoch_ms: u64) -> PathBuf {
    store_path.join(format!("backup_error_{epoch_ms}.log"))
}
