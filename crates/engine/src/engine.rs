//! The Bitmap Engine: per-block state machine plus dual range index.

use backup_bitmap::Bitmap;
use backup_core::{BlockId, BlockMetadata, BlockState, Error, Result, Timestamp, WalOffset};
use backup_index::SkipList;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::config::EngineConfig;

/// Snapshot of engine-wide counters, as of the moment the read lock was
/// held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    /// Total number of blocks with a metadata record (dirty + new + deleted).
    pub total_blocks: u64,
    /// Number of blocks in the `Dirty` state.
    pub dirty: u64,
    /// Number of blocks in the `New` state.
    pub new: u64,
    /// Number of blocks in the `Deleted` state.
    pub deleted: u64,
}

struct EngineState {
    dirty: Bitmap,
    new_blocks: Bitmap,
    deleted: Bitmap,
    metadata: FxHashMap<BlockId, BlockMetadata>,
    time_index: SkipList,
    wal_index: SkipList,
}

impl EngineState {
    fn new() -> Self {
        EngineState {
            dirty: Bitmap::new(),
            new_blocks: Bitmap::new(),
            deleted: Bitmap::new(),
            metadata: FxHashMap::default(),
            time_index: SkipList::new(),
            wal_index: SkipList::new(),
        }
    }

    fn bitmap_for_mut(&mut self, state: BlockState) -> Option<&mut Bitmap> {
        match state {
            BlockState::Dirty => Some(&mut self.dirty),
            BlockState::New => Some(&mut self.new_blocks),
            BlockState::Deleted => Some(&mut self.deleted),
            BlockState::Clean => None,
        }
    }

    fn current_state(&self, id: BlockId) -> BlockState {
        self.metadata.get(&id).map(|m| m.state).unwrap_or(BlockState::Clean)
    }

    fn post_to_index(index: &mut SkipList, key: i64, id: BlockId) {
        match index.find_mut(key) {
            Some(bitmap) => {
                bitmap.add(id);
            }
            None => {
                let mut bitmap = Bitmap::new();
                bitmap.add(id);
                index.insert(key, bitmap);
            }
        }
    }

    fn mark(&mut self, id: BlockId, wal: WalOffset, ts: Timestamp, target: BlockState) -> Result<()> {
        let current = self.current_state(id);
        if !current.can_transition_to(target) {
            return Err(Error::InvalidStateTransition(current.explain_forbidden(target)));
        }

        if let Some(bitmap) = self.bitmap_for_mut(current) {
            bitmap.remove(id);
        }
        if let Some(bitmap) = self.bitmap_for_mut(target) {
            bitmap.add(id);
        }

        self.metadata.insert(
            id,
            BlockMetadata {
                block_id: id,
                wal_offset: wal,
                timestamp: ts,
                state: target,
            },
        );

        Self::post_to_index(&mut self.time_index, ts.get(), id);
        Self::post_to_index(&mut self.wal_index, wal.get() as i64, id);

        Ok(())
    }

    fn clear(&mut self, id: BlockId) -> Result<()> {
        let current = self.current_state(id);
        if current == BlockState::Deleted {
            return Err(Error::InvalidStateTransition(
                "DELETED is terminal".to_string(),
            ));
        }
        if let Some(bitmap) = self.bitmap_for_mut(current) {
            bitmap.remove(id);
        }
        self.metadata.remove(&id);
        Ok(())
    }

    fn range_by_time(&self, t_lo: Timestamp, t_hi: Timestamp, max: usize) -> Vec<BlockId> {
        let mut union = Bitmap::new();
        self.time_index
            .for_each(t_lo.get(), t_hi.get(), false, |_, bitmap| {
                union.union_with(bitmap);
            });
        union.intersect_with(&self.dirty);
        union.to_array(max)
    }

    fn range_by_wal(&self, w_lo: WalOffset, w_hi: WalOffset, max: usize) -> Vec<BlockId> {
        let mut union = Bitmap::new();
        self.wal_index
            .for_each(w_lo.get() as i64, w_hi.get() as i64, false, |_, bitmap| {
                union.union_with(bitmap);
            });
        union.intersect_with(&self.dirty);
        union.to_array(max)
    }

    fn memory_bytes(&self) -> usize {
        self.dirty.memory_bytes()
            + self.new_blocks.memory_bytes()
            + self.deleted.memory_bytes()
            + self.time_index.memory_bytes()
            + self.wal_index.memory_bytes()
            + self.metadata.len() * std::mem::size_of::<BlockMetadata>()
    }
}

/// Owns the three state bitmaps (dirty/new/deleted), the per-block
/// metadata map, and the two ordered indices (by timestamp, by WAL
/// offset). All mutation and query operations are serialized through a
/// single `RwLock` (see the module-level docs on concurrency in the
/// workspace README).
pub struct BitmapEngine {
    state: RwLock<EngineState>,
    config: EngineConfig,
}

impl BitmapEngine {
    /// Create an engine with the given configuration.
    pub fn new(config: EngineConfig) -> Self {
        BitmapEngine {
            state: RwLock::new(EngineState::new()),
            config,
        }
    }

    /// Create an engine with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(EngineConfig::default())
    }

    /// The engine's configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Mark `id` dirty (was modified) as of `(wal, ts)`.
    pub fn mark_dirty(&self, id: BlockId, wal: WalOffset, ts: Timestamp) -> Result<()> {
        trace!(block_id = id.get(), wal = wal.get(), "mark_dirty");
        self.state.write().mark(id, wal, ts, BlockState::Dirty)
    }

    /// Mark `id` new (was created) as of `(wal, ts)`.
    pub fn mark_new(&self, id: BlockId, wal: WalOffset, ts: Timestamp) -> Result<()> {
        trace!(block_id = id.get(), wal = wal.get(), "mark_new");
        self.state.write().mark(id, wal, ts, BlockState::New)
    }

    /// Mark `id` deleted (was removed) as of `(wal, ts)`.
    pub fn mark_deleted(&self, id: BlockId, wal: WalOffset, ts: Timestamp) -> Result<()> {
        trace!(block_id = id.get(), wal = wal.get(), "mark_deleted");
        self.state.write().mark(id, wal, ts, BlockState::Deleted)
    }

    /// Transition `id` to `Clean`, erasing its metadata. Not permitted
    /// from `Deleted`.
    pub fn clear_block(&self, id: BlockId) -> Result<()> {
        trace!(block_id = id.get(), "clear_block");
        self.state.write().clear(id)
    }

    /// Read `id`'s metadata, if it has any (a block with no record is
    /// implicitly `Clean`).
    pub fn get_metadata(&self, id: BlockId) -> Option<BlockMetadata> {
        self.state.read().metadata.get(&id).copied()
    }

    /// Read `id`'s current state (`Clean` if it has no metadata record).
    pub fn get_state(&self, id: BlockId) -> BlockState {
        self.state.read().current_state(id)
    }

    /// Ids with `Dirty` state whose most recent timestamp posting falls
    /// in `[t_lo, t_hi]`, ascending, truncated to `max`.
    pub fn get_dirty_blocks_by_time(&self, t_lo: Timestamp, t_hi: Timestamp, max: usize) -> Vec<BlockId> {
        self.state.read().range_by_time(t_lo, t_hi, max)
    }

    /// Ids with `Dirty` state whose most recent WAL-offset posting falls
    /// in `[w_lo, w_hi]`, ascending, truncated to `max`.
    pub fn get_dirty_blocks_by_wal(&self, w_lo: WalOffset, w_hi: WalOffset, max: usize) -> Vec<BlockId> {
        self.state.read().range_by_wal(w_lo, w_hi, max)
    }

    /// Snapshot of engine-wide counters.
    pub fn get_stats(&self) -> EngineStats {
        let state = self.state.read();
        EngineStats {
            total_blocks: state.metadata.len() as u64,
            dirty: state.dirty.cardinality(),
            new: state.new_blocks.cardinality(),
            deleted: state.deleted.cardinality(),
        }
    }

    /// Approximate heap footprint of every bitmap and index the engine
    /// owns, for [`EngineConfig::memory_limit_mb`] accounting.
    pub fn memory_bytes(&self) -> usize {
        self.state.read().memory_bytes()
    }

    /// Log a warning if [`BitmapEngine::memory_bytes`] exceeds
    /// `memory_limit_mb`. Returns whether it did. Called periodically by
    /// [`crate::monitor::spawn_memory_monitor`] when
    /// `memory_monitor_enabled` is set; harmless to call directly.
    pub fn check_memory_pressure(&self) -> bool {
        let limit = self.config.memory_limit_mb * 1024 * 1024;
        let used = self.memory_bytes();
        if used > limit {
            tracing::warn!(used_bytes = used, limit_bytes = limit, "engine memory usage over limit");
            true
        } else {
            false
        }
    }
}
