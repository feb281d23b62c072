//! Core identifiers and the block state machine.

use serde::{Deserialize, Serialize};

/// A 64-bit block identifier.
///
/// The block-id space is potentially ten-billion-element; callers should
/// not assume density or small cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockId(pub u64);

impl BlockId {
    /// Wrap a raw id.
    pub fn new(id: u64) -> Self {
        BlockId(id)
    }

    /// The raw id.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for BlockId {
    fn from(id: u64) -> Self {
        BlockId(id)
    }
}

/// Byte position in the host database's write-ahead log at which a block
/// mutation was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WalOffset(pub u64);

impl WalOffset {
    /// Wrap a raw offset.
    pub fn new(offset: u64) -> Self {
        WalOffset(offset)
    }

    /// The raw offset.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for WalOffset {
    fn from(offset: u64) -> Self {
        WalOffset(offset)
    }
}

/// Wall-clock timestamp in nanoseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Wrap a raw nanosecond timestamp.
    pub fn new(ns: i64) -> Self {
        Timestamp(ns)
    }

    /// The raw nanosecond value.
    pub fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for Timestamp {
    fn from(ns: i64) -> Self {
        Timestamp(ns)
    }
}

/// The lifecycle state of a tracked block.
///
/// A block with no metadata record is implicitly `Clean`. See the state
/// transition matrix on [`BlockState::can_transition_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockState {
    /// Unmodified since the last backup checkpoint.
    Clean,
    /// Modified since the last backup checkpoint.
    Dirty,
    /// Created since the last backup checkpoint.
    New,
    /// Removed since the last backup checkpoint. Terminal.
    Deleted,
}

impl BlockState {
    /// Whether a transition from `self` to `target` is permitted.
    ///
    /// ```text
    /// from \ to   CLEAN  DIRTY  NEW  DELETED
    /// CLEAN         -      Y     Y      Y
    /// DIRTY         Y      -     N      Y
    /// NEW           N      Y     -      Y
    /// DELETED       N      N     N      -
    /// ```
    pub fn can_transition_to(self, target: BlockState) -> bool {
        use BlockState::*;
        match (self, target) {
            (Clean, Clean) => false,
            (Clean, _) => true,
            (Dirty, Dirty) => false,
            (Dirty, New) => false,
            (Dirty, Clean) | (Dirty, Deleted) => true,
            (New, New) => false,
            (New, Clean) => false,
            (New, Dirty) | (New, Deleted) => true,
            (Deleted, _) => false,
        }
    }

    /// Human-readable explanation of why `self -> target` is forbidden.
    ///
    /// Only meaningful when [`can_transition_to`](Self::can_transition_to)
    /// returns `false`.
    pub fn explain_forbidden(self, target: BlockState) -> String {
        use BlockState::*;
        match (self, target) {
            (Deleted, _) => "DELETED is terminal".to_string(),
            (Dirty, New) => "DIRTY cannot become NEW without first clearing".to_string(),
            (New, Clean) => "NEW cannot become CLEAN directly, clear it instead".to_string(),
            (Clean, Clean) | (Dirty, Dirty) | (New, New) => {
                "state is already at the target state".to_string()
            }
            _ => format!("{self:?} -> {target:?} is not a defined transition"),
        }
    }
}

/// Per-block metadata record.
///
/// A block with no `BlockMetadata` is implicitly [`BlockState::Clean`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockMetadata {
    /// The block this record describes.
    pub block_id: BlockId,
    /// WAL offset of the mutation that produced the current state.
    pub wal_offset: WalOffset,
    /// Timestamp of the mutation that produced the current state.
    pub timestamp: Timestamp,
    /// Current lifecycle state.
    pub state: BlockState,
}

/// The kind of mutation a storage-engine event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// A new block was created.
    Create,
    /// An existing block was modified.
    Update,
    /// A block was durably flushed (semantics are a policy knob, see
    /// `backup-interceptor::FlushPolicy`).
    Flush,
    /// A block was removed.
    Delete,
}

/// A mutation notification produced by the storage engine.
///
/// Owned by the ring buffer from enqueue to dequeue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    /// The kind of mutation.
    pub kind: EventKind,
    /// The affected block.
    pub block_id: BlockId,
    /// WAL offset at which the mutation was recorded.
    pub wal_offset: WalOffset,
    /// Wall-clock timestamp of the mutation.
    pub timestamp: Timestamp,
}

/// Which index (or combination) a [`crate::types::IncrementalBlock`]-emitting cursor
/// walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CursorType {
    /// Walk `time_index` over `[t_lo, t_hi]`.
    Time,
    /// Walk `wal_index` over `[w_lo, w_hi]`.
    Wal,
    /// Intersection of both ranges.
    Hybrid,
}

/// A cursor-emitted record. `data` is left absent by the bitmap engine's
/// cursors (metadata only); callers load payload bytes lazily from the
/// storage engine using `block_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncrementalBlock {
    /// The block this record describes.
    pub block_id: BlockId,
    /// WAL offset of the mutation that produced the current state.
    pub wal_offset: WalOffset,
    /// Timestamp of the mutation that produced the current state.
    pub timestamp: Timestamp,
    /// Lifecycle state as of the read.
    pub state: BlockState,
    /// Payload bytes, if the caller eagerly attached them.
    pub data: Option<Vec<u8>>,
    /// Size of `data` in bytes, whether or not `data` is populated (a
    /// caller that defers loading still wants to know how big the block
    /// is for batching/estimation purposes).
    pub data_size: u64,
}
