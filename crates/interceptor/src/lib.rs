//! The Event Interceptor — decouples the storage engine's hot path from
//! bitmap engine maintenance.
//!
//! Producers call the non-blocking `on_block_*` submission methods on
//! [`EventInterceptor`]; a configurable pool of worker threads drains a
//! bounded ring buffer and applies each event to a [`BitmapEngine`].
//! [`registry`] lets a concrete storage engine plug itself in by name
//! without this crate depending on it directly.

#![warn(missing_docs)]

mod config;
mod interceptor;
pub mod registry;

pub use config::{InterceptorConfig, InterceptorConfigError};
pub use interceptor::{EventInterceptor, FlushPolicy, InterceptorStats};
pub use registry::{NoopSource, SourceRegistry, StorageEngineSource};
