//! The storage-engine source registry.
//!
//! Mirrors how the host database would plug a concrete storage engine's
//! hook points into the interceptor without this crate depending on any
//! particular engine crate: implementations of [`StorageEngineSource`]
//! are registered by name, and [`SourceRegistry::get`] hands back either
//! the registered implementation or a [`NoopSource`] whose
//! `is_supported` reports `false`.

use backup_core::{Error, Event, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// The hook points a concrete storage engine must expose for the
/// interceptor to attach to.
///
/// Implementations are expected to be cheap to clone-share (hence
/// `Arc<dyn StorageEngineSource>` at the registry boundary) and safe to
/// call from any thread.
pub trait StorageEngineSource: Send + Sync {
    /// One-time setup, given an opaque engine-specific configuration
    /// blob (e.g. a connection string or config file path).
    fn init(&self, config: &str) -> Result<()>;

    /// Install whatever hook (trigger, middleware, callback table entry)
    /// the concrete engine uses to notify of block mutations.
    fn install_interception(&self) -> Result<()>;

    /// Remove the hook installed by `install_interception`.
    fn uninstall_interception(&self) -> Result<()>;

    /// Manually inject an event, bypassing the installed hook. Mainly
    /// useful for engines that can't hook themselves and are driven
    /// externally, and for tests.
    fn trigger_event(&self, event: Event) -> Result<()>;

    /// `(events_seen, events_dropped)` as tracked by the source itself,
    /// if it tracks anything; zero otherwise.
    fn get_stats(&self) -> (u64, u64);

    /// Whether this source is usable in the current process (e.g. the
    /// target engine's shared library is loaded).
    fn is_supported(&self) -> bool;

    /// A human-readable engine name, for logging.
    fn get_engine_name(&self) -> &str;
}

/// The default source: always present, never supported. Returned by
/// [`SourceRegistry::get`] for unregistered names instead of `None`, so
/// callers can always call `is_supported` without matching on an
/// `Option` first.
pub struct NoopSource;

impl StorageEngineSource for NoopSource {
    fn init(&self, _config: &str) -> Result<()> {
        Ok(())
    }

    fn install_interception(&self) -> Result<()> {
        Err(Error::NotInitialized)
    }

    fn uninstall_interception(&self) -> Result<()> {
        Ok(())
    }

    fn trigger_event(&self, _event: Event) -> Result<()> {
        Err(Error::NotInitialized)
    }

    fn get_stats(&self) -> (u64, u64) {
        (0, 0)
    }

    fn is_supported(&self) -> bool {
        false
    }

    fn get_engine_name(&self) -> &str {
        "noop"
    }
}

/// A process-wide, name-keyed table of [`StorageEngineSource`]
/// implementations, guarded by a single mutex.
pub struct SourceRegistry {
    sources: Mutex<HashMap<String, Arc<dyn StorageEngineSource>>>,
}

impl SourceRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        SourceRegistry {
            sources: Mutex::new(HashMap::new()),
        }
    }

    /// Register (or replace) the source for `name`.
    pub fn register(&self, name: impl Into<String>, source: Arc<dyn StorageEngineSource>) {
        self.sources.lock().insert(name.into(), source);
    }

    /// Remove the source registered for `name`, if any.
    pub fn unregister(&self, name: &str) {
        self.sources.lock().remove(name);
    }

    /// The source registered for `name`, or a [`NoopSource`] if none is.
    pub fn get(&self, name: &str) -> Arc<dyn StorageEngineSource> {
        self.sources
            .lock()
            .get(name)
            .cloned()
            .unwrap_or_else(|| Arc::new(NoopSource))
    }

    /// Names currently registered.
    pub fn registered_names(&self) -> Vec<String> {
        self.sources.lock().keys().cloned().collect()
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeSource {
        name: &'static str,
    }

    impl StorageEngineSource for FakeSource {
        fn init(&self, _config: &str) -> Result<()> {
            Ok(())
        }
        fn install_interception(&self) -> Result<()> {
            Ok(())
        }
        fn uninstall_interception(&self) -> Result<()> {
            Ok(())
        }
        fn trigger_event(&self, _event: Event) -> Result<()> {
            Ok(())
        }
        fn get_stats(&self) -> (u64, u64) {
            (1, 0)
        }
        fn is_supported(&self) -> bool {
            true
        }
        fn get_engine_name(&self) -> &str {
            self.name
        }
    }

    #[test]
    fn unregistered_name_returns_noop() {
        let registry = SourceRegistry::new();
        let source = registry.get("timeseries-db");
        assert!(!source.is_supported());
        assert_eq!(source.get_engine_name(), "noop");
    }

    #[test]
    fn registered_source_is_returned() {
        let registry = SourceRegistry::new();
        registry.register("timeseries-db", Arc::new(FakeSource { name: "timeseries-db" }));
        let source = registry.get("timeseries-db");
        assert!(source.is_supported());
        assert_eq!(source.get_engine_name(), "timeseries-db");
    }

    #[test]
    fn unregister_falls_back_to_noop() {
        let registry = SourceRegistry::new();
        registry.register("x", Arc::new(FakeSource { name: "x" }));
        registry.unregister("x");
        assert!(!registry.get("x").is_supported());
    }

    #[test]
    fn registered_names_lists_current_entries() {
        let registry = SourceRegistry::new();
        registry.register("a", Arc::new(FakeSource { name: "a" }));
        registry.register("b", Arc::new(FakeSource { name: "b" }));
        let mut names = registry.registered_names();
        names.sort();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }
}
