//! Bitmap engine configuration.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration for a [`crate::BitmapEngine`].
///
/// Mirrors the `max_blocks`, `memory_limit_mb`, `persistence_enabled`,
/// `persistence_path`, `lru_cleanup_threshold_pct`, and
/// `memory_monitor_enabled` keys listed for the engine component.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Soft cap on the number of tracked blocks. Not enforced by eviction
    /// today; consulted by the (optional) memory monitor for logging.
    pub max_blocks: usize,
    /// Heap budget, in megabytes, before the memory monitor logs a
    /// warning.
    pub memory_limit_mb: usize,
    /// Whether the engine should persist a snapshot of its indices to
    /// `persistence_path` on checkpoint. Accepted as configuration but the
    /// snapshot format itself is out of this crate's scope — the backup
    /// coordinator's archive format in `backup-coordinator` is the
    /// durable artifact this engine feeds.
    pub persistence_enabled: bool,
    /// Directory for the (currently unimplemented) persistence snapshot.
    pub persistence_path: Option<PathBuf>,
    /// Percentage of `memory_limit_mb` at which an LRU-style cleanup pass
    /// would be considered. No eviction policy is implemented today since
    /// the spec does not define one; the knob is accepted for forward
    /// compatibility.
    pub lru_cleanup_threshold_pct: u8,
    /// Whether to run the background memory monitor thread.
    pub memory_monitor_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_blocks: 10_000_000_000,
            memory_limit_mb: 4096,
            persistence_enabled: false,
            persistence_path: None,
            lru_cleanup_threshold_pct: 80,
            memory_monitor_enabled: false,
        }
    }
}

impl EngineConfig {
    /// Set `max_blocks`.
    pub fn with_max_blocks(mut self, max_blocks: usize) -> Self {
        self.max_blocks = max_blocks;
        self
    }

    /// Set `memory_limit_mb`.
    pub fn with_memory_limit_mb(mut self, mb: usize) -> Self {
        self.memory_limit_mb = mb;
        self
    }

    /// Enable persistence with the given snapshot directory.
    pub fn with_persistence(mut self, path: PathBuf) -> Self {
        self.persistence_enabled = true;
        self.persistence_path = Some(path);
        self
    }

    /// Set `lru_cleanup_threshold_pct`.
    pub fn with_lru_cleanup_threshold_pct(mut self, pct: u8) -> Self {
        self.lru_cleanup_threshold_pct = pct;
        self
    }

    /// Enable or disable the background memory monitor.
    pub fn with_memory_monitor_enabled(mut self, enabled: bool) -> Self {
        self.memory_monitor_enabled = enabled;
        self
    }

    /// Validate internal consistency.
    pub fn validate(&self) -> Result<(), EngineConfigError> {
        if self.max_blocks == 0 {
            return Err(EngineConfigError::InvalidMaxBlocks);
        }
        if self.lru_cleanup_threshold_pct > 100 {
            return Err(EngineConfigError::InvalidThreshold(
                self.lru_cleanup_threshold_pct,
            ));
        }
        if self.persistence_enabled && self.persistence_path.is_none() {
            return Err(EngineConfigError::MissingPersistencePath);
        }
        Ok(())
    }
}

/// Errors from [`EngineConfig::validate`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineConfigError {
    /// `max_blocks` was zero.
    #[error("max_blocks must be non-zero")]
    InvalidMaxBlocks,
    /// `lru_cleanup_threshold_pct` exceeded 100.
    #[error("lru_cleanup_threshold_pct {0} exceeds 100")]
    InvalidThreshold(u8),
    /// `persistence_enabled` was set without a path.
    #[error("persistence_enabled requires persistence_path")]
    MissingPersistencePath,
}
