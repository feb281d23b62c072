//! The Bitmap Engine — the heart of the backup acceleration system.
//!
//! Owns three state bitmaps (dirty/new/deleted), a block-id to metadata
//! map, and two ordered indices (by timestamp, by WAL offset). Enforces
//! the block state transition matrix and answers range queries. See
//! [`BitmapEngine`].

#![warn(missing_docs)]

mod config;
mod engine;
mod monitor;

pub use config::{EngineConfig, EngineConfigError};
pub use engine::{BitmapEngine, EngineStats};
pub use monitor::{spawn_memory_monitor, MemoryMonitorHandle};
