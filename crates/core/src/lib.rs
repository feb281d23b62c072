//! Shared types and error taxonomy for the backup acceleration engine.
//!
//! This crate defines the foundational vocabulary used throughout the
//! workspace:
//! - [`BlockId`], [`WalOffset`], [`Timestamp`]: newtypes over the scalar
//!   identifiers a block carries, so callers can't transpose a WAL offset
//!   and a timestamp at a call site.
//! - [`BlockState`], [`BlockMetadata`]: the per-block state machine.
//! - [`Event`], [`EventKind`]: mutation notifications from the storage
//!   engine.
//! - [`error::Error`]: the unified error type every other crate returns.

#![warn(missing_docs)]

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{
    BlockId, BlockMetadata, BlockState, CursorType, Event, EventKind, IncrementalBlock, Timestamp,
    WalOffset,
};
