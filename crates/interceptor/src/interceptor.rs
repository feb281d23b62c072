//! The event interceptor itself: lifecycle, submission, and the worker
//! pool that drains the ring buffer into the bitmap engine.

use backup_core::{Event, EventKind, Result};
use backup_engine::BitmapEngine;
use backup_ringbuffer::{DequeueOutcome, RingBuffer, TryEnqueueError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, trace, warn};

use crate::config::InterceptorConfig;

/// How a `Flush` event is applied to the bitmap engine.
///
/// A flush always counts toward [`InterceptorStats::events_processed`]
/// or `events_rejected`; this only controls whether it also clears the
/// block's tracked state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushPolicy {
    /// A flush transitions the block back to `Clean` (calls
    /// `BitmapEngine::clear_block`). The default: a flushed block has
    /// nothing left for the next backup to pick up.
    #[default]
    ClearOnFlush,
    /// A flush is recorded as seen but does not touch engine state.
    /// Useful when the host database's notion of "flushed" doesn't
    /// imply "nothing left to back up" (e.g. flush-to-cache, not
    /// flush-to-durable-storage).
    HintOnly,
}

/// Point-in-time counters for an [`EventInterceptor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterceptorStats {
    /// Events successfully applied to the bitmap engine.
    pub events_processed: u64,
    /// Events dropped at submission time because the ring buffer was full.
    pub events_dropped: u64,
    /// Events dequeued but rejected by the bitmap engine (e.g. an
    /// invalid state transition).
    pub events_rejected: u64,
}

const STATE_NOT_STARTED: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_STOPPED: u8 = 2;

/// Decouples the storage engine's hot path from bitmap engine
/// maintenance: producers call `on_block_*` (non-blocking, drop-on-full)
/// and a worker pool drains the ring buffer, applying each event to the
/// [`BitmapEngine`] and then invoking the registered callback, if any.
pub struct EventInterceptor {
    config: InterceptorConfig,
    ring: Arc<RingBuffer>,
    engine: Arc<BitmapEngine>,
    callback: Option<Arc<dyn Fn(Event) + Send + Sync>>,
    flush_policy: FlushPolicy,
    state: AtomicU8,
    workers: Mutex<Vec<JoinHandle<()>>>,
    events_processed: AtomicU64,
    events_dropped: AtomicU64,
    events_rejected: AtomicU64,
    shutting_down: Arc<AtomicBool>,
}

impl EventInterceptor {
    /// Build an interceptor bound to `engine`. Does not spawn workers;
    /// call [`EventInterceptor::start`] for that.
    pub fn init(config: InterceptorConfig, engine: Arc<BitmapEngine>) -> Result<Self> {
        config
            .validate()
            .map_err(|e| backup_core::Error::InvalidParam(e.to_string()))?;
        Ok(EventInterceptor {
            ring: Arc::new(RingBuffer::new(config.event_buffer_size)),
            config,
            engine,
            callback: None,
            flush_policy: FlushPolicy::default(),
            state: AtomicU8::new(STATE_NOT_STARTED),
            workers: Mutex::new(Vec::new()),
            events_processed: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            events_rejected: AtomicU64::new(0),
            shutting_down: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Register a callback invoked (from a worker thread) after each
    /// event has been applied to the engine. Must be called before
    /// [`EventInterceptor::start`].
    pub fn with_callback(mut self, callback: impl Fn(Event) + Send + Sync + 'static) -> Self {
        self.callback = Some(Arc::new(callback));
        self
    }

    /// Set the flush policy. Must be called before
    /// [`EventInterceptor::start`].
    pub fn with_flush_policy(mut self, policy: FlushPolicy) -> Self {
        self.flush_policy = policy;
        self
    }

    /// Spawn `config.callback_threads` worker threads draining the ring
    /// buffer. A no-op if `config.enabled` is `false` or the interceptor
    /// is already running.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        if !self.config.enabled {
            debug!("interceptor disabled, not starting workers");
            return Ok(());
        }
        if self
            .state
            .compare_exchange(STATE_NOT_STARTED, STATE_RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        let mut workers = self.workers.lock();
        for worker_id in 0..self.config.callback_threads {
            let this = Arc::clone(self);
            workers.push(std::thread::spawn(move || this.worker_loop(worker_id)));
        }
        Ok(())
    }

    /// Signal shutdown, drain remaining events, and join every worker
    /// thread. Idempotent.
    pub fn stop(&self) -> Result<()> {
        if self
            .state
            .compare_exchange(STATE_RUNNING, STATE_STOPPED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }
        self.shutting_down.store(true, Ordering::Release);
        self.ring.shutdown();
        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
        Ok(())
    }

    /// Consume the interceptor, stopping it first. Equivalent to
    /// `stop()` followed by dropping the value; provided as an explicit
    /// lifecycle step matching `init`/`start`/`stop`/`destroy`.
    pub fn destroy(self) -> Result<()> {
        self.stop()
    }

    /// Submit a block-creation event. Non-blocking; drops and counts the
    /// event if the ring buffer is full or shut down.
    pub fn on_block_create(&self, id: backup_core::BlockId, wal: backup_core::WalOffset, ts: backup_core::Timestamp) {
        self.submit(Event {
            kind: EventKind::Create,
            block_id: id,
            wal_offset: wal,
            timestamp: ts,
        });
    }

    /// Submit a block-update event.
    pub fn on_block_update(&self, id: backup_core::BlockId, wal: backup_core::WalOffset, ts: backup_core::Timestamp) {
        self.submit(Event {
            kind: EventKind::Update,
            block_id: id,
            wal_offset: wal,
            timestamp: ts,
        });
    }

    /// Submit a block-flush event.
    pub fn on_block_flush(&self, id: backup_core::BlockId, wal: backup_core::WalOffset, ts: backup_core::Timestamp) {
        self.submit(Event {
            kind: EventKind::Flush,
            block_id: id,
            wal_offset: wal,
            timestamp: ts,
        });
    }

    /// Submit a block-deletion event.
    pub fn on_block_delete(&self, id: backup_core::BlockId, wal: backup_core::WalOffset, ts: backup_core::Timestamp) {
        self.submit(Event {
            kind: EventKind::Delete,
            block_id: id,
            wal_offset: wal,
            timestamp: ts,
        });
    }

    /// Snapshot of the interceptor's counters.
    pub fn stats(&self) -> InterceptorStats {
        InterceptorStats {
            events_processed: self.events_processed.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            events_rejected: self.events_rejected.load(Ordering::Relaxed),
        }
    }

    /// The underlying ring buffer, mainly for tests and diagnostics.
    pub fn ring_buffer(&self) -> &Arc<RingBuffer> {
        &self.ring
    }

    fn submit(&self, event: Event) {
        if !self.config.enabled {
            return;
        }
        if let Err(TryEnqueueError::Full) | Err(TryEnqueueError::Shutdown) = self.ring.try_enqueue(event) {
            self.events_dropped.fetch_add(1, Ordering::Relaxed);
            warn!(?event.kind, block_id = event.block_id.get(), "interceptor ring buffer full or shut down, event dropped");
        }
    }

    fn worker_loop(self: Arc<Self>, worker_id: usize) {
        trace!(worker_id, "interceptor worker starting");
        loop {
            match self.ring.dequeue_blocking(Duration::from_secs(1)) {
                DequeueOutcome::Ok(event) => self.apply(event),
                DequeueOutcome::Timeout => continue,
                DequeueOutcome::Shutdown => break,
            }
        }
        trace!(worker_id, "interceptor worker exiting");
    }

    fn apply(&self, event: Event) {
        let result = match event.kind {
            EventKind::Create => self.engine.mark_new(event.block_id, event.wal_offset, event.timestamp),
            EventKind::Update => self.engine.mark_dirty(event.block_id, event.wal_offset, event.timestamp),
            EventKind::Delete => self.engine.mark_deleted(event.block_id, event.wal_offset, event.timestamp),
            EventKind::Flush => match self.flush_policy {
                FlushPolicy::ClearOnFlush => self.engine.clear_block(event.block_id),
                FlushPolicy::HintOnly => Ok(()),
            },
        };

        match result {
            Ok(()) => {
                self.events_processed.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                self.events_rejected.fetch_add(1, Ordering::Relaxed);
                trace!(block_id = event.block_id.get(), %err, "interceptor event rejected by engine");
            }
        }

        if let Some(callback) = &self.callback {
            callback(event);
        }
    }
}

impl Drop for EventInterceptor {
    fn drop(&mut self) {
        if self.state.load(Ordering::Acquire) == STATE_RUNNING {
            self.shutting_down.store(true, Ordering::Release);
            self.ring.shutdown();
            let mut workers = self.workers.lock();
            for handle in workers.drain(..) {
                let _ = handle.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backup_core::{BlockId, Timestamp, WalOffset};
    use backup_engine::EngineConfig;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn engine() -> Arc<BitmapEngine> {
        Arc::new(BitmapEngine::new(EngineConfig::default()))
    }

    #[test]
    fn create_update_delete_are_applied_to_engine() {
        let eng = engine();
        let interceptor = Arc::new(
            EventInterceptor::init(InterceptorConfig::default().with_callback_threads(1), Arc::clone(&eng)).unwrap(),
        );
        interceptor.start().unwrap();

        interceptor.on_block_create(BlockId::new(1), WalOffset::new(1), Timestamp::new(1));
        interceptor.on_block_update(BlockId::new(2), WalOffset::new(2), Timestamp::new(2));

        // give the worker time to drain
        std::thread::sleep(Duration::from_millis(100));
        interceptor.stop().unwrap();

        assert_eq!(eng.get_state(BlockId::new(1)), backup_core::BlockState::New);
        assert_eq!(eng.get_state(BlockId::new(2)), backup_core::BlockState::Dirty);
        assert_eq!(interceptor.stats().events_processed, 2);
    }

    #[test]
    fn flush_clear_on_flush_transitions_block_to_clean() {
        let eng = engine();
        eng.mark_dirty(BlockId::new(5), WalOffset::new(1), Timestamp::new(1)).unwrap();
        let interceptor = Arc::new(
            EventInterceptor::init(InterceptorConfig::default().with_callback_threads(1), Arc::clone(&eng))
                .unwrap()
                .with_flush_policy(FlushPolicy::ClearOnFlush),
        );
        interceptor.start().unwrap();
        interceptor.on_block_flush(BlockId::new(5), WalOffset::new(2), Timestamp::new(2));
        std::thread::sleep(Duration::from_millis(100));
        interceptor.stop().unwrap();

        assert_eq!(eng.get_state(BlockId::new(5)), backup_core::BlockState::Clean);
    }

    #[test]
    fn flush_hint_only_leaves_state_untouched() {
        let eng = engine();
        eng.mark_dirty(BlockId::new(5), WalOffset::new(1), Timestamp::new(1)).unwrap();
        let interceptor = Arc::new(
            EventInterceptor::init(InterceptorConfig::default().with_callback_threads(1), Arc::clone(&eng))
                .unwrap()
                .with_flush_policy(FlushPolicy::HintOnly),
        );
        interceptor.start().unwrap();
        interceptor.on_block_flush(BlockId::new(5), WalOffset::new(2), Timestamp::new(2));
        std::thread::sleep(Duration::from_millis(100));
        interceptor.stop().unwrap();

        assert_eq!(eng.get_state(BlockId::new(5)), backup_core::BlockState::Dirty);
    }

    #[test]
    fn overflow_events_are_counted_as_dropped_not_lost_silently() {
        let eng = engine();
        let interceptor = Arc::new(
            EventInterceptor::init(InterceptorConfig::default().with_event_buffer_size(2), Arc::clone(&eng)).unwrap(),
        );
        // deliberately never started: nothing drains the ring buffer, so
        // it fills after 2 events and everything past that is dropped.
        for i in 0..10u64 {
            interceptor.on_block_create(BlockId::new(i), WalOffset::new(i), Timestamp::new(i as i64));
        }
        assert_eq!(interceptor.stats().events_dropped, 8);
    }

    #[test]
    fn stop_is_idempotent() {
        let eng = engine();
        let interceptor =
            Arc::new(EventInterceptor::init(InterceptorConfig::default().with_callback_threads(1), eng).unwrap());
        interceptor.start().unwrap();
        interceptor.stop().unwrap();
        interceptor.stop().unwrap();
    }

    #[test]
    fn shutdown_drains_before_exit_counter_invariant() {
        let eng = engine();
        let interceptor = Arc::new(
            EventInterceptor::init(InterceptorConfig::default().with_event_buffer_size(1000).with_callback_threads(2), eng)
                .unwrap(),
        );
        interceptor.start().unwrap();
        let enqueued = 500u64;
        for i in 0..enqueued {
            interceptor.on_block_create(BlockId::new(i), WalOffset::new(i), Timestamp::new(i as i64));
        }
        interceptor.stop().unwrap();

        let stats = interceptor.stats();
        assert_eq!(stats.events_processed + stats.events_rejected + stats.events_dropped, enqueued);
    }

    #[test]
    fn callback_is_invoked_after_engine_state_is_applied() {
        let eng = engine();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        let interceptor = Arc::new(
            EventInterceptor::init(InterceptorConfig::default().with_callback_threads(1), Arc::clone(&eng))
                .unwrap()
                .with_callback(move |_event| {
                    seen_clone.fetch_add(1, Ordering::SeqCst);
                }),
        );
        interceptor.start().unwrap();
        interceptor.on_block_create(BlockId::new(1), WalOffset::new(1), Timestamp::new(1));
        std::thread::sleep(Duration::from_millis(100));
        interceptor.stop().unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(eng.get_state(BlockId::new(1)), backup_core::BlockState::New);
    }
}
