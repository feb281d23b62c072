//! Interceptor lifecycle and registry integration tests.

use backup_core::{BlockId, BlockState, Timestamp, WalOffset};
use backup_engine::BitmapEngine;
use backup_interceptor::{EventInterceptor, InterceptorConfig, NoopSource, SourceRegistry, StorageEngineSource};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn full_lifecycle_drains_mixed_event_stream() {
    let engine = Arc::new(BitmapEngine::with_defaults());
    let interceptor = Arc::new(
        EventInterceptor::init(InterceptorConfig::default().with_callback_threads(3), Arc::clone(&engine)).unwrap(),
    );
    interceptor.start().unwrap();

    for i in 0..300u64 {
        interceptor.on_block_create(BlockId::new(i), WalOffset::new(i), Timestamp::new(i as i64));
    }
    for i in 0..150u64 {
        interceptor.on_block_update(BlockId::new(i), WalOffset::new(i + 1), Timestamp::new((i + 1) as i64));
    }
    for i in 250..300u64 {
        interceptor.on_block_delete(BlockId::new(i), WalOffset::new(i + 2), Timestamp::new((i + 2) as i64));
    }

    interceptor.stop().unwrap();

    // [0, 150) went CREATE then UPDATE -> Dirty
    for i in 0..150u64 {
        assert_eq!(engine.get_state(BlockId::new(i)), BlockState::Dirty);
    }
    // [150, 250) only saw CREATE -> New
    for i in 150..250u64 {
        assert_eq!(engine.get_state(BlockId::new(i)), BlockState::New);
    }
    // [250, 300) saw CREATE then DELETE -> Deleted
    for i in 250..300u64 {
        assert_eq!(engine.get_state(BlockId::new(i)), BlockState::Deleted);
    }

    let stats = interceptor.stats();
    assert_eq!(stats.events_processed + stats.events_rejected + stats.events_dropped, 600);
}

#[test]
fn disabled_interceptor_never_starts_workers_or_enqueues() {
    let engine = Arc::new(BitmapEngine::with_defaults());
    let interceptor = Arc::new(
        EventInterceptor::init(InterceptorConfig::default().with_enabled(false), Arc::clone(&engine)).unwrap(),
    );
    interceptor.start().unwrap();
    interceptor.on_block_create(BlockId::new(1), WalOffset::new(1), Timestamp::new(1));
    std::thread::sleep(Duration::from_millis(50));
    interceptor.stop().unwrap();

    assert_eq!(engine.get_state(BlockId::new(1)), BlockState::Clean);
    let stats = interceptor.stats();
    assert_eq!(stats.events_processed, 0);
    assert_eq!(stats.events_dropped, 0);
}

#[test]
fn unregistered_engine_name_yields_unsupported_noop_source() {
    let registry = SourceRegistry::new();
    let source = registry.get("some-timeseries-db");
    assert!(!source.is_supported());
    assert!(source.trigger_event(backup_core::Event {
        kind: backup_core::EventKind::Create,
        block_id: BlockId::new(1),
        wal_offset: WalOffset::new(1),
        timestamp: Timestamp::new(1),
    })
    .is_err());
}

struct CountingSource {
    name: String,
}

impl StorageEngineSource for CountingSource {
    fn init(&self, _config: &str) -> backup_core::Result<()> {
        Ok(())
    }
    fn install_interception(&self) -> backup_core::Result<()> {
        Ok(())
    }
    fn uninstall_interception(&self) -> backup_core::Result<()> {
        Ok(())
    }
    fn trigger_event(&self, _event: backup_core::Event) -> backup_core::Result<()> {
        Ok(())
    }
    fn get_stats(&self) -> (u64, u64) {
        (0, 0)
    }
    fn is_supported(&self) -> bool {
        true
    }
    fn get_engine_name(&self) -> &str {
        &self.name
    }
}

#[test]
fn registry_round_trips_a_registered_source() {
    let registry = SourceRegistry::new();
    registry.register(
        "my-engine",
        Arc::new(CountingSource {
            name: "my-engine".to_string(),
        }),
    );
    let source = registry.get("my-engine");
    assert!(source.is_supported());
    assert_eq!(source.get_engine_name(), "my-engine");

    registry.unregister("my-engine");
    let noop: Arc<dyn StorageEngineSource> = Arc::new(NoopSource);
    assert_eq!(registry.get("my-engine").get_engine_name(), noop.get_engine_name());
}
