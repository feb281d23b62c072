//! Cursor lifecycle: `create_cursor` / `get_next_batch` / `destroy_cursor`.
//!
//! A cursor carries no pointers into the engine, only immutable range
//! bounds plus scalar progress counters, per the spec's shared-resource
//! policy. It re-issues its range query on every batch and resumes by
//! offset, so it stays correct (if not maximally efficient) under the
//! engine's eventually-consistent, no-snapshot read model.

use backup_core::{BlockId, CursorType, IncrementalBlock, Result, Timestamp, WalOffset};
use backup_engine::BitmapEngine;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Opaque cursor handle returned by [`CursorManager::create_cursor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CursorHandle(u64);

struct CursorState {
    cursor_type: CursorType,
    t_lo: Timestamp,
    t_hi: Timestamp,
    w_lo: WalOffset,
    w_hi: WalOffset,
    consumed: usize,
    has_more: bool,
}

/// Manages the set of live cursors against one [`BitmapEngine`].
pub struct CursorManager {
    engine: Arc<BitmapEngine>,
    next_id: AtomicU64,
    cursors: Mutex<HashMap<u64, CursorState>>,
}

impl CursorManager {
    /// Build a manager over `engine`.
    pub fn new(engine: Arc<BitmapEngine>) -> Self {
        CursorManager {
            engine,
            next_id: AtomicU64::new(1),
            cursors: Mutex::new(HashMap::new()),
        }
    }

    /// Open a new cursor over the given bounds. `has_more` starts `true`.
    pub fn create_cursor(
        &self,
        cursor_type: CursorType,
        t_lo: Timestamp,
        t_hi: Timestamp,
        w_lo: WalOffset,
        w_hi: WalOffset,
    ) -> CursorHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.cursors.lock().insert(
            id,
            CursorState {
                cursor_type,
                t_lo,
                t_hi,
                w_lo,
                w_hi,
                consumed: 0,
                has_more: true,
            },
        );
        CursorHandle(id)
    }

    /// Fill up to `max` [`IncrementalBlock`]s from `cursor`'s range,
    /// resuming from where the previous call left off.
    ///
    /// Returns `BlockNotFound` if `cursor` is unknown (already destroyed
    /// or never created).
    pub fn get_next_batch(&self, cursor: CursorHandle, max: usize) -> Result<Vec<IncrementalBlock>> {
        let mut cursors = self.cursors.lock();
        let state = cursors
            .get_mut(&cursor.0)
            .ok_or(backup_core::Error::BlockNotFound)?;

        if !state.has_more || max == 0 {
            return Ok(Vec::new());
        }

        let all_ids = self.full_range(state);
        let total = all_ids.len();
        let start = state.consumed.min(total);
        let end = (start + max).min(total);
        let batch_ids = &all_ids[start..end];

        let blocks: Vec<IncrementalBlock> = batch_ids
            .iter()
            .filter_map(|&id| {
                self.engine.get_metadata(id).map(|meta| IncrementalBlock {
                    block_id: meta.block_id,
                    wal_offset: meta.wal_offset,
                    timestamp: meta.timestamp,
                    state: meta.state,
                    data: None,
                    data_size: 0,
                })
            })
            .collect();

        state.consumed = end;
        state.has_more = end < total;

        Ok(blocks)
    }

    /// Release a cursor. A no-op if it's already gone.
    pub fn destroy_cursor(&self, cursor: CursorHandle) {
        self.cursors.lock().remove(&cursor.0);
    }

    /// Whether `cursor` still has unreturned data, if it exists at all.
    pub fn has_more(&self, cursor: CursorHandle) -> Option<bool> {
        self.cursors.lock().get(&cursor.0).map(|s| s.has_more)
    }

    fn full_range(&self, state: &CursorState) -> Vec<BlockId> {
        match state.cursor_type {
            CursorType::Time => self.engine.get_dirty_blocks_by_time(state.t_lo, state.t_hi, usize::MAX),
            CursorType::Wal => self.engine.get_dirty_blocks_by_wal(state.w_lo, state.w_hi, usize::MAX),
            CursorType::Hybrid => {
                let by_time = self.engine.get_dirty_blocks_by_time(state.t_lo, state.t_hi, usize::MAX);
                let by_wal = self.engine.get_dirty_blocks_by_wal(state.w_lo, state.w_hi, usize::MAX);
                sorted_intersection(&by_time, &by_wal)
            }
        }
    }
}

/// Intersection of two already-ascending id slices.
fn sorted_intersection(a: &[BlockId], b: &[BlockId]) -> Vec<BlockId> {
    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use backup_core::WalOffset as Wal;

    fn id(n: u64) -> BlockId {
        BlockId::new(n)
    }
    fn wal(n: u64) -> Wal {
        Wal::new(n)
    }
    fn ts(n: i64) -> Timestamp {
        Timestamp::new(n)
    }

    fn engine_with_seed_scenario_2() -> Arc<BitmapEngine> {
        let engine = Arc::new(BitmapEngine::with_defaults());
        for (i, w) in [(1001, 1000), (1002, 2000), (1003, 3000), (1004, 4000)] {
            engine.mark_dirty(id(i), wal(w), ts(w as i64)).unwrap();
        }
        engine
    }

    #[test]
    fn wal_cursor_range_query_seed_scenario() {
        let engine = engine_with_seed_scenario_2();
        let mgr = CursorManager::new(Arc::clone(&engine));
        let cursor = mgr.create_cursor(CursorType::Wal, ts(0), ts(i64::MAX), wal(1500), wal(3500));
        let batch = mgr.get_next_batch(cursor, 10).unwrap();
        let ids: Vec<u64> = batch.iter().map(|b| b.block_id.get()).collect();
        assert_eq!(ids, vec![1002, 1003]);
        assert_eq!(mgr.has_more(cursor), Some(false));
    }

    #[test]
    fn pagination_resumes_across_calls() {
        let engine = Arc::new(BitmapEngine::with_defaults());
        for i in 0..10u64 {
            engine.mark_dirty(id(i), wal(i), ts(i as i64)).unwrap();
        }
        let mgr = CursorManager::new(Arc::clone(&engine));
        let cursor = mgr.create_cursor(CursorType::Wal, ts(0), ts(i64::MAX), wal(0), wal(9));

        let first = mgr.get_next_batch(cursor, 4).unwrap();
        assert_eq!(first.len(), 4);
        assert_eq!(mgr.has_more(cursor), Some(true));

        let second = mgr.get_next_batch(cursor, 4).unwrap();
        assert_eq!(second.len(), 4);
        assert_eq!(mgr.has_more(cursor), Some(true));

        let third = mgr.get_next_batch(cursor, 4).unwrap();
        assert_eq!(third.len(), 2);
        assert_eq!(mgr.has_more(cursor), Some(false));

        let fourth = mgr.get_next_batch(cursor, 4).unwrap();
        assert!(fourth.is_empty());
    }

    #[test]
    fn destroy_cursor_then_get_next_batch_fails() {
        let engine = Arc::new(BitmapEngine::with_defaults());
        let mgr = CursorManager::new(engine);
        let cursor = mgr.create_cursor(CursorType::Time, ts(0), ts(100), wal(0), wal(100));
        mgr.destroy_cursor(cursor);
        assert!(mgr.get_next_batch(cursor, 10).is_err());
    }

    #[test]
    fn hybrid_cursor_returns_intersection() {
        let engine = Arc::new(BitmapEngine::with_defaults());
        // id 1: wal=100 ts=9000 (in wal range, out of time range)
        // id 2: wal=9000 ts=100 (out of wal range, in time range)
        // id 3: wal=100 ts=100 (in both ranges)
        engine.mark_dirty(id(1), wal(100), ts(9000)).unwrap();
        engine.mark_dirty(id(2), wal(9000), ts(100)).unwrap();
        engine.mark_dirty(id(3), wal(100), ts(100)).unwrap();

        let mgr = CursorManager::new(Arc::clone(&engine));
        let cursor = mgr.create_cursor(CursorType::Hybrid, ts(0), ts(1000), wal(0), wal(1000));
        let batch = mgr.get_next_batch(cursor, 10).unwrap();
        let ids: Vec<u64> = batch.iter().map(|b| b.block_id.get()).collect();
        assert_eq!(ids, vec![3]);
    }
}
