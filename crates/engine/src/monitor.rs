//! Optional background memory-pressure monitor.
//!
//! Purely observational: logs via `tracing::warn!` when the engine's
//! estimated footprint crosses `EngineConfig::memory_limit_mb`. No
//! eviction or backpressure is applied — the spec defines no eviction
//! policy, so none is invented here.

use crate::engine::BitmapEngine;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// A handle to a running memory monitor thread.
pub struct MemoryMonitorHandle {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl MemoryMonitorHandle {
    /// Stop the monitor thread and wait for it to exit.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for MemoryMonitorHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}

/// Spawn a thread that calls [`BitmapEngine::check_memory_pressure`]
/// every `interval`, for as long as the returned handle is alive (or
/// until [`MemoryMonitorHandle::stop`] is called).
///
/// Only meaningful when `engine.config().memory_monitor_enabled` is set;
/// callers are expected to check that before spawning.
pub fn spawn_memory_monitor(engine: Arc<BitmapEngine>, interval: Duration) -> MemoryMonitorHandle {
    let stop = Arc::new(AtomicBool::new(false));
    let stop_clone = Arc::clone(&stop);
    let join = std::thread::spawn(move || {
        while !stop_clone.load(Ordering::Acquire) {
            engine.check_memory_pressure();
            std::thread::sleep(interval);
        }
    });
    MemoryMonitorHandle {
        stop,
        join: Some(join),
    }
}
