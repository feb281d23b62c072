//! The Backup Coordinator — cursor management, batched reads, the
//! backup archive file format, size estimation, backup validation,
//! retry with backoff, and the persistent error log.
//!
//! [`plugin`] additionally hosts the backup-driver plugin API: a safe
//! [`plugin::BackupPlugin`] plus a C-ABI shim for hosts that load this
//! as a plugin rather than linking it as a Rust crate.

#![warn(missing_docs)]

mod archive;
mod config;
mod coordinator;
mod cursor;
mod error_log;
pub mod plugin;
mod retry;

pub use archive::{compress_payload, decompress_payload, ArchiveBlock, ArchiveHeader, ARCHIVE_MAGIC, ARCHIVE_VERSION};
pub use config::{CompressionLevel, CoordinatorConfig, CoordinatorConfigError};
pub use coordinator::{epoch_ms, BackupCoordinator, BackupStats, SizeEstimate};
pub use cursor::CursorHandle;
pub use error_log::{ErrorLog, ErrorRecord, ErrorStats};
pub use retry::RetryPolicy;
