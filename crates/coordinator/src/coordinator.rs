//! The Backup Coordinator: ties cursor management, size estimation,
//! backup validation, retry, and the error log together over one
//! [`BitmapEngine`].

use backup_core::{CursorType, Error, IncrementalBlock, Result, Timestamp, WalOffset};
use backup_engine::BitmapEngine;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::config::CoordinatorConfig;
use crate::cursor::{CursorHandle, CursorManager};
use crate::error_log::{ErrorLog, ErrorStats};
use crate::retry::RetryPolicy;

/// `(blocks, bytes)` estimate for a WAL-offset range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeEstimate {
    /// Number of dirty blocks in range.
    pub blocks: u64,
    /// `blocks * config.estimated_block_size_bytes`.
    pub bytes: u64,
}

/// Cumulative backup counters, snapshot via [`BackupCoordinator::backup_stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BackupStats {
    /// Total blocks handed out across every `get_next_batch` call.
    pub blocks: u64,
    /// Total bytes handed out, `blocks * config.estimated_block_size_bytes`
    /// (payload bytes themselves are loaded lazily by the caller, see
    /// [`backup_core::IncrementalBlock`], so this mirrors `estimate_size`'s
    /// factor rather than summing `data_size`).
    pub bytes: u64,
    /// Wall-clock time spent inside `get_next_batch`, summed across calls.
    pub duration_ms: u64,
}

/// `AtomicU64`-backed accumulator for [`BackupStats`], same counter shape as
/// [`crate::error_log::ErrorLog`]'s `error_count`/`retry_count`.
#[derive(Debug, Default)]
struct BackupStatsCounters {
    blocks: AtomicU64,
    bytes: AtomicU64,
    duration_ms: AtomicU64,
}

impl BackupStatsCounters {
    fn record(&self, blocks: u64, bytes: u64, duration_ms: u64) {
        self.blocks.fetch_add(blocks, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
        self.duration_ms.fetch_add(duration_ms, Ordering::Relaxed);
    }

    fn snapshot(&self) -> BackupStats {
        BackupStats {
            blocks: self.blocks.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            duration_ms: self.duration_ms.load(Ordering::Relaxed),
        }
    }
}

/// Coordinates a backup over one [`BitmapEngine`].
pub struct BackupCoordinator {
    config: CoordinatorConfig,
    engine: Arc<BitmapEngine>,
    cursors: CursorManager,
    error_log: ErrorLog,
    retry_policy: RetryPolicy,
    backup_stats: BackupStatsCounters,
}

impl BackupCoordinator {
    /// Build a coordinator over `engine`.
    pub fn new(config: CoordinatorConfig, engine: Arc<BitmapEngine>) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::InvalidParam(e.to_string()))?;
        if config.enable_encryption {
            return Err(Error::InvalidParam(
                "enable_encryption is accepted for configuration but the cipher is not implemented".to_string(),
            ));
        }
        let error_log = ErrorLog::new(
            config.error_store_path.clone(),
            config.enable_error_logging,
            config.error_buffer_size,
        );
        let retry_policy = RetryPolicy::new(config.error_retry_max, config.error_retry_interval_s);
        Ok(BackupCoordinator {
            cursors: CursorManager::new(Arc::clone(&engine)),
            engine,
            error_log,
            retry_policy,
            backup_stats: BackupStatsCounters::default(),
            config,
        })
    }

    /// The coordinator's configuration.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Open a cursor over the given bounds.
    pub fn create_cursor(
        &self,
        cursor_type: CursorType,
        t_lo: Timestamp,
        t_hi: Timestamp,
        w_lo: WalOffset,
        w_hi: WalOffset,
    ) -> CursorHandle {
        self.cursors.create_cursor(cursor_type, t_lo, t_hi, w_lo, w_hi)
    }

    /// Fill the next batch from `cursor`, capped at
    /// `config.max_blocks_per_batch` regardless of the caller's `max`.
    ///
    /// Every block handed out here is folded into the cumulative counters
    /// [`BackupCoordinator::backup_stats`] reports.
    pub fn get_next_batch(&self, cursor: CursorHandle, max: usize) -> Result<Vec<IncrementalBlock>> {
        let capped = max.min(self.config.max_blocks_per_batch);
        let started = Instant::now();
        let batch = self.cursors.get_next_batch(cursor, capped)?;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let blocks = batch.len() as u64;
        self.backup_stats
            .record(blocks, blocks * self.config.estimated_block_size_bytes, elapsed_ms);
        Ok(batch)
    }

    /// Release a cursor.
    pub fn destroy_cursor(&self, cursor: CursorHandle) {
        self.cursors.destroy_cursor(cursor);
    }

    /// Estimate `(blocks, bytes)` for a WAL-offset range by multiplying
    /// the engine's dirty cardinality in range by
    /// `config.estimated_block_size_bytes`.
    pub fn estimate_size(&self, w_lo: WalOffset, w_hi: WalOffset) -> SizeEstimate {
        let blocks = self.engine.get_dirty_blocks_by_wal(w_lo, w_hi, usize::MAX).len() as u64;
        SizeEstimate {
            blocks,
            bytes: blocks * self.config.estimated_block_size_bytes,
        }
    }

    /// Validate that every block in `blocks` has engine metadata whose
    /// `wal_offset` falls in `[w_lo, w_hi]`.
    pub fn validate_backup(&self, w_lo: WalOffset, w_hi: WalOffset, blocks: &[IncrementalBlock]) -> Result<()> {
        for block in blocks {
            let meta = self
                .engine
                .get_metadata(block.block_id)
                .ok_or(Error::BlockNotFound)?;
            if meta.wal_offset < w_lo || meta.wal_offset > w_hi {
                return Err(Error::DataCorruption(format!(
                    "block {} wal_offset {} outside validated range [{}, {}]",
                    block.block_id.get(),
                    meta.wal_offset.get(),
                    w_lo.get(),
                    w_hi.get()
                )));
            }
        }
        Ok(())
    }

    /// Run `op`, retrying per `config.error_retry_max` /
    /// `error_retry_interval_s`, recording any terminal failure to the
    /// error log.
    pub fn run_with_retry<T>(&self, op: impl FnMut() -> Result<T>) -> Result<T> {
        let (result, attempts) = self.retry_policy.run(op);
        for _ in 0..attempts {
            self.error_log.record_retry();
        }
        if let Err(err) = &result {
            self.error_log.record(epoch_ms(), err).ok();
        }
        result
    }

    /// Current error/retry counters.
    pub fn error_stats(&self) -> ErrorStats {
        self.error_log.stats()
    }

    /// Cumulative blocks/bytes/duration handed out by `get_next_batch`
    /// since this coordinator was constructed.
    pub fn backup_stats(&self) -> BackupStats {
        self.backup_stats.snapshot()
    }

    /// Build the archive metadata header for a backup of `[w_lo, w_hi]`:
    /// an [`crate::archive::ArchiveHeader`] stamped with the current time
    /// and no commit/object identity (the caller, which has that context,
    /// is expected to fill it in before writing the header to disk).
    pub fn generate_metadata(&self, w_lo: WalOffset, w_hi: WalOffset) -> Result<Vec<u8>> {
        let header = crate::archive::ArchiveHeader {
            api_commit_id: String::new(),
            server_commit_id: String::new(),
            obj_name: format!("wal_{}_{}", w_lo.get(), w_hi.get()),
            timestamp_ms: epoch_ms(),
            vg_id: 0,
            file_seq: 0,
        };
        header.to_bytes()
    }

    /// The most recently recorded error's message, if any.
    pub fn last_error(&self) -> Option<String> {
        self.error_log.last_error()
    }

    /// Clear the last-error record (counters are cumulative and
    /// untouched).
    pub fn clear_error(&self) {
        self.error_log.clear_error()
    }
}

/// Milliseconds since the Unix epoch, for error-log file naming and
/// record timestamps.
pub fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use backup_core::{BlockId, BlockState};
    use tempfile::tempdir;

    fn ts(n: i64) -> Timestamp {
        Timestamp::new(n)
    }
    fn wal(n: u64) -> WalOffset {
        WalOffset::new(n)
    }
    fn id(n: u64) -> BlockId {
        BlockId::new(n)
    }

    fn coordinator_with_seed_data(dir: &std::path::Path) -> BackupCoordinator {
        let engine = Arc::new(BitmapEngine::with_defaults());
        for (i, w) in [(1001, 1000), (1002, 2000), (1003, 3000), (1004, 4000)] {
            engine.mark_dirty(id(i), wal(w), ts(w as i64)).unwrap();
        }
        let config = CoordinatorConfig::default()
            .with_error_store_path(dir.to_path_buf())
            .with_estimated_block_size_bytes(2048);
        BackupCoordinator::new(config, engine).unwrap()
    }

    #[test]
    fn estimate_size_multiplies_cardinality_by_configured_factor() {
        let dir = tempdir().unwrap();
        let coordinator = coordinator_with_seed_data(dir.path());
        let estimate = coordinator.estimate_size(wal(1500), wal(3500));
        assert_eq!(estimate.blocks, 2);
        assert_eq!(estimate.bytes, 2 * 2048);
    }

    #[test]
    fn validate_backup_accepts_in_range_blocks() {
        let dir = tempdir().unwrap();
        let coordinator = coordinator_with_seed_data(dir.path());
        let batch = IncrementalBlock {
            block_id: id(1002),
            wal_offset: wal(2000),
            timestamp: ts(2000),
            state: BlockState::Dirty,
            data: None,
            data_size: 0,
        };
        assert!(coordinator.validate_backup(wal(1500), wal(3500), &[batch]).is_ok());
    }

    #[test]
    fn validate_backup_rejects_out_of_range_wal_offset() {
        let dir = tempdir().unwrap();
        let coordinator = coordinator_with_seed_data(dir.path());
        let batch = IncrementalBlock {
            block_id: id(1001),
            wal_offset: wal(1000),
            timestamp: ts(1000),
            state: BlockState::Dirty,
            data: None,
            data_size: 0,
        };
        assert!(coordinator.validate_backup(wal(1500), wal(3500), &[batch]).is_err());
    }

    #[test]
    fn enable_encryption_without_cipher_support_is_rejected_at_construction() {
        let dir = tempdir().unwrap();
        let engine = Arc::new(BitmapEngine::with_defaults());
        let config = CoordinatorConfig::default()
            .with_error_store_path(dir.path().to_path_buf())
            .with_encryption(vec![0u8; 32]);
        assert!(BackupCoordinator::new(config, engine).is_err());
    }

    #[test]
    fn run_with_retry_exhaustion_updates_error_stats() {
        let dir = tempdir().unwrap();
        let engine = Arc::new(BitmapEngine::with_defaults());
        let config = CoordinatorConfig::default()
            .with_error_store_path(dir.path().to_path_buf())
            .with_retry_policy(3, 0);
        let coordinator = BackupCoordinator::new(config, engine).unwrap();

        let result = coordinator.run_with_retry(|| Err::<(), _>(Error::Network("down".to_string())));
        assert!(matches!(result, Err(Error::RetryExhausted { attempts: 3, .. })));
        assert_eq!(coordinator.error_stats().retry_count, 3);
        assert_eq!(coordinator.error_stats().error_count, 1);
        assert!(coordinator.last_error().is_some());
    }

    #[test]
    fn get_next_batch_accumulates_backup_stats() {
        let dir = tempdir().unwrap();
        let coordinator = coordinator_with_seed_data(dir.path());
        let cursor = coordinator.create_cursor(CursorType::Wal, ts(0), ts(i64::MAX), wal(0), wal(10_000));
        let batch = coordinator.get_next_batch(cursor, 10).unwrap();
        coordinator.destroy_cursor(cursor);

        let stats = coordinator.backup_stats();
        assert_eq!(stats.blocks, batch.len() as u64);
        assert_eq!(stats.bytes, batch.len() as u64 * 2048);
    }

    #[test]
    fn generate_metadata_produces_a_parseable_archive_header() {
        let dir = tempdir().unwrap();
        let coordinator = coordinator_with_seed_data(dir.path());
        let bytes = coordinator.generate_metadata(wal(1000), wal(4000)).unwrap();
        let (header, consumed) = crate::archive::ArchiveHeader::from_bytes(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(header.obj_name, "wal_1000_4000");
    }

    #[test]
    fn cursor_lifecycle_through_the_coordinator() {
        let dir = tempdir().unwrap();
        let coordinator = coordinator_with_seed_data(dir.path());
        let cursor = coordinator.create_cursor(CursorType::Wal, ts(0), ts(i64::MAX), wal(0), wal(10_000));
        let batch = coordinator.get_next_batch(cursor, 10).unwrap();
        assert_eq!(batch.len(), 4);
        coordinator.destroy_cursor(cursor);
        assert!(coordinator.get_next_batch(cursor, 10).is_err());
    }
}
