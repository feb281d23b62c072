//! Unified error taxonomy for the backup acceleration engine.
//!
//! Every fallible API in the workspace returns [`Result<T>`]. Numeric codes
//! are stable for on-the-wire/log purposes; see [`Error::code`].

use thiserror::Error;

/// Result type alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by every crate in the workspace.
///
/// See [`Error::is_retryable`] for which kinds the backup coordinator's
/// retry loop will re-attempt.
#[derive(Debug, Error)]
pub enum Error {
    /// Null pointer, out-of-range id, or otherwise malformed argument.
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// API called before the owning component was initialized.
    #[error("component not initialized")]
    NotInitialized,

    /// Allocation failure.
    #[error("out of memory")]
    OutOfMemory,

    /// File open/read/write/stat failure.
    #[error("file I/O error: {0}")]
    FileIo(String),

    /// Connection or transport failure.
    #[error("network error: {0}")]
    Network(String),

    /// Operation exceeded its deadline.
    #[error("operation timed out")]
    Timeout,

    /// CRC mismatch, bad header magic, or other corrupt on-disk data.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// The OS refused the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// No space left on the target filesystem.
    #[error("disk full")]
    DiskFull,

    /// Transport dropped mid-stream.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// A retry loop exhausted `max_retries` without success.
    #[error("retries exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Display of the last underlying error.
        last_error: String,
    },

    /// A state transition forbidden by the block state matrix.
    #[error("invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// A block id has no metadata record.
    #[error("block not found")]
    BlockNotFound,
}

impl Error {
    /// A stable numeric code for this error kind, for wire/log purposes.
    ///
    /// Negative values signal failure, matching the calling convention of
    /// the backup-driver plugin API in `backup-coordinator::plugin`.
    pub fn code(&self) -> i32 {
        match self {
            Error::InvalidParam(_) => -1,
            Error::NotInitialized => -2,
            Error::OutOfMemory => -3,
            Error::FileIo(_) => -4,
            Error::Network(_) => -5,
            Error::Timeout => -6,
            Error::DataCorruption(_) => -7,
            Error::PermissionDenied(_) => -8,
            Error::DiskFull => -9,
            Error::ConnectionLost(_) => -10,
            Error::RetryExhausted { .. } => -11,
            Error::InvalidStateTransition(_) => -12,
            Error::BlockNotFound => -13,
        }
    }

    /// Whether the backup coordinator's retry loop should re-attempt an
    /// operation that failed with this error.
    ///
    /// Per spec: `Network`, `Timeout`, `ConnectionLost`, `FileIo` are
    /// retryable; everything else is not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Network(_) | Error::Timeout | Error::ConnectionLost(_) | Error::FileIo(_)
        )
    }
}
