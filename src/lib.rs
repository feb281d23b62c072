//! # backupcore
//!
//! An incremental-backup acceleration engine for a time-series database:
//! a dirty/new/deleted bitmap over block ids, fed by an event interceptor
//! that drains a bounded ring buffer, read by a coordinator that hands
//! out paginated cursors and writes the archive file format.
//!
//! [`BackupEngine`] wires the workspace's crates into a single entry
//! point: construct one, register it as a storage-engine event source
//! (or call `on_block_*` directly), then drive a backup through
//! [`BackupEngine::coordinator`].
//!
//! ```no_run
//! use backupcore::{BackupEngine, CursorType, Timestamp, WalOffset};
//!
//! let engine = BackupEngine::with_defaults()?;
//! engine.start()?;
//!
//! engine.on_block_dirty(1, 1000, 1_700_000_000_000);
//! # std::thread::sleep(std::time::Duration::from_millis(200));
//!
//! let cursor = engine.coordinator().create_cursor(
//!     CursorType::Wal,
//!     Timestamp::new(0),
//!     Timestamp::new(i64::MAX),
//!     WalOffset::new(0),
//!     WalOffset::new(u64::MAX),
//! );
//! let batch = engine.coordinator().get_next_batch(cursor, 100)?;
//! engine.coordinator().destroy_cursor(cursor);
//! # Ok::<(), backupcore::Error>(())
//! ```

#![warn(missing_docs)]

use std::sync::Arc;

pub use backup_core::{
    BlockId, BlockMetadata, BlockState, CursorType, Error, Event, EventKind, IncrementalBlock,
    Result, Timestamp, WalOffset,
};
pub use backup_coordinator::{BackupCoordinator, CoordinatorConfig};
pub use backup_engine::{BitmapEngine, EngineConfig};
pub use backup_interceptor::{EventInterceptor, FlushPolicy, InterceptorConfig, SourceRegistry, StorageEngineSource};

/// Configuration for all three layers a [`BackupEngine`] wires together.
#[derive(Debug, Clone, Default)]
pub struct BackupEngineConfig {
    /// Bitmap engine configuration.
    pub engine: EngineConfig,
    /// Event interceptor configuration.
    pub interceptor: InterceptorConfig,
    /// Backup coordinator configuration.
    pub coordinator: CoordinatorConfig,
}

/// The top-level entry point: one [`BitmapEngine`], one
/// [`EventInterceptor`] draining events into it, and one
/// [`BackupCoordinator`] reading it back out.
pub struct BackupEngine {
    engine: Arc<BitmapEngine>,
    interceptor: Arc<EventInterceptor>,
    coordinator: BackupCoordinator,
}

impl BackupEngine {
    /// Build a `BackupEngine` from `config`. Does not start the
    /// interceptor's worker threads; call [`BackupEngine::start`] for that.
    pub fn new(config: BackupEngineConfig) -> Result<Self> {
        let engine = Arc::new(BitmapEngine::new(config.engine));
        let interceptor = Arc::new(EventInterceptor::init(config.interceptor, Arc::clone(&engine))?);
        let coordinator = BackupCoordinator::new(config.coordinator, Arc::clone(&engine))?;
        Ok(BackupEngine {
            engine,
            interceptor,
            coordinator,
        })
    }

    /// Build a `BackupEngine` with every layer's default configuration.
    pub fn with_defaults() -> Result<Self> {
        Self::new(BackupEngineConfig::default())
    }

    /// Start the interceptor's worker threads. Idempotent.
    pub fn start(&self) -> Result<()> {
        self.interceptor.start()
    }

    /// Stop the interceptor's worker threads, draining any events already
    /// enqueued first. Idempotent.
    pub fn stop(&self) -> Result<()> {
        self.interceptor.stop()
    }

    /// The underlying bitmap engine, for direct state queries.
    pub fn engine(&self) -> &Arc<BitmapEngine> {
        &self.engine
    }

    /// The event interceptor, for direct access to its stats or ring
    /// buffer.
    pub fn interceptor(&self) -> &Arc<EventInterceptor> {
        &self.interceptor
    }

    /// The backup coordinator, for cursors, size estimates, and backup
    /// validation.
    pub fn coordinator(&self) -> &BackupCoordinator {
        &self.coordinator
    }

    /// Record a block as dirty. Shorthand for
    /// `interceptor().on_block_create` style calls using raw scalars
    /// instead of [`BlockId`]/[`WalOffset`]/[`Timestamp`] newtypes.
    pub fn on_block_dirty(&self, block_id: u64, wal_offset: u64, timestamp: i64) {
        self.interceptor.on_block_update(
            BlockId::new(block_id),
            WalOffset::new(wal_offset),
            Timestamp::new(timestamp),
        );
    }

    /// Record a block as newly created.
    pub fn on_block_new(&self, block_id: u64, wal_offset: u64, timestamp: i64) {
        self.interceptor.on_block_create(
            BlockId::new(block_id),
            WalOffset::new(wal_offset),
            Timestamp::new(timestamp),
        );
    }

    /// Record a block as deleted.
    pub fn on_block_deleted(&self, block_id: u64, wal_offset: u64, timestamp: i64) {
        self.interceptor.on_block_delete(
            BlockId::new(block_id),
            WalOffset::new(wal_offset),
            Timestamp::new(timestamp),
        );
    }

    /// Record a block as flushed (cleared, per the interceptor's
    /// configured [`FlushPolicy`]).
    pub fn on_block_flushed(&self, block_id: u64, wal_offset: u64, timestamp: i64) {
        self.interceptor.on_block_flush(
            BlockId::new(block_id),
            WalOffset::new(wal_offset),
            Timestamp::new(timestamp),
        );
    }
}

impl Drop for BackupEngine {
    fn drop(&mut self) {
        let _ = self.interceptor.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_engine_starts_and_stops_cleanly() {
        let engine = BackupEngine::with_defaults().unwrap();
        engine.start().unwrap();
        engine.stop().unwrap();
    }

    #[test]
    fn dirty_block_is_visible_through_the_coordinator_after_drain() {
        let engine = BackupEngine::with_defaults().unwrap();
        engine.start().unwrap();
        engine.on_block_dirty(7, 500, 1000);

        // Give the interceptor's worker a moment to drain the ring buffer.
        std::thread::sleep(std::time::Duration::from_millis(200));

        let cursor = engine.coordinator().create_cursor(
            CursorType::Wal,
            Timestamp::new(0),
            Timestamp::new(i64::MAX),
            WalOffset::new(0),
            WalOffset::new(10_000),
        );
        let batch = engine.coordinator().get_next_batch(cursor, 10).unwrap();
        engine.coordinator().destroy_cursor(cursor);

        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].block_id.get(), 7);
        engine.stop().unwrap();
    }
}
