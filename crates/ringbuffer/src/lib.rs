//! A bounded, blocking, multi-producer/multi-consumer queue of events.
//!
//! Backed by a `parking_lot::Mutex<VecDeque<Event>>` guarded by two
//! condition variables (`not_empty`, `not_full`) — the same
//! mutex-plus-condvar idiom `backup-engine`'s sibling crates use for their
//! own queues, generalized here from an unbounded priority queue to a
//! bounded FIFO that can report back-pressure.
//!
//! Independently thread-safe; does not take the bitmap engine's lock.

#![warn(missing_docs)]

use backup_core::Event;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Outcome of a non-blocking enqueue attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryEnqueueError {
    /// The queue is at capacity.
    Full,
    /// [`RingBuffer::shutdown`] has already been called.
    Shutdown,
}

/// Outcome of a blocking enqueue attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The event was accepted.
    Ok,
    /// No space became available before the timeout elapsed.
    Timeout,
    /// The buffer was shut down while waiting (or already shut down).
    Shutdown,
}

/// Outcome of a blocking dequeue attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DequeueOutcome {
    /// An event was dequeued.
    Ok(Event),
    /// No event became available before the timeout elapsed.
    Timeout,
    /// The buffer has been shut down and is now empty.
    Shutdown,
}

/// A point-in-time snapshot of ring buffer occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingBufferStats {
    /// Number of events currently queued.
    pub len: usize,
    /// Fixed capacity.
    pub capacity: usize,
    /// The highest `len` ever observed.
    pub high_water_mark: usize,
}

struct Inner {
    queue: Mutex<VecDeque<Event>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
    shutdown: AtomicBool,
    high_water_mark: AtomicUsize,
}

/// A bounded FIFO of [`Event`]s, safe to share across producer and
/// consumer threads via `Arc<RingBuffer>`.
pub struct RingBuffer {
    inner: Inner,
}

impl RingBuffer {
    /// Create a ring buffer with a fixed `capacity`.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        RingBuffer {
            inner: Inner {
                queue: Mutex::new(VecDeque::with_capacity(capacity)),
                not_empty: Condvar::new(),
                not_full: Condvar::new(),
                capacity,
                shutdown: AtomicBool::new(false),
                high_water_mark: AtomicUsize::new(0),
            },
        }
    }

    /// Non-blocking enqueue. Never blocks the caller.
    pub fn try_enqueue(&self, event: Event) -> Result<(), TryEnqueueError> {
        if self.inner.shutdown.load(Ordering::Acquire) {
            return Err(TryEnqueueError::Shutdown);
        }
        let mut queue = self.inner.queue.lock();
        if queue.len() >= self.inner.capacity {
            return Err(TryEnqueueError::Full);
        }
        queue.push_back(event);
        self.record_high_water(queue.len());
        drop(queue);
        self.inner.not_empty.notify_one();
        Ok(())
    }

    /// Blocking enqueue, waiting up to `timeout` for space to free up.
    pub fn enqueue_blocking(&self, event: Event, timeout: Duration) -> EnqueueOutcome {
        if self.inner.shutdown.load(Ordering::Acquire) {
            return EnqueueOutcome::Shutdown;
        }
        let deadline = Instant::now() + timeout;
        let mut queue = self.inner.queue.lock();
        loop {
            if self.inner.shutdown.load(Ordering::Acquire) {
                return EnqueueOutcome::Shutdown;
            }
            if queue.len() < self.inner.capacity {
                queue.push_back(event);
                self.record_high_water(queue.len());
                drop(queue);
                self.inner.not_empty.notify_one();
                return EnqueueOutcome::Ok;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return EnqueueOutcome::Timeout;
            }
            let timed_out = self.inner.not_full.wait_for(&mut queue, remaining).timed_out();
            if timed_out && queue.len() >= self.inner.capacity {
                return EnqueueOutcome::Timeout;
            }
        }
    }

    /// Blocking dequeue, waiting up to `timeout` for an event to arrive.
    ///
    /// After [`RingBuffer::shutdown`] has been called, this keeps
    /// returning queued events until the queue is empty, then returns
    /// [`DequeueOutcome::Shutdown`] forever after.
    pub fn dequeue_blocking(&self, timeout: Duration) -> DequeueOutcome {
        let deadline = Instant::now() + timeout;
        let mut queue = self.inner.queue.lock();
        loop {
            if let Some(event) = queue.pop_front() {
                drop(queue);
                self.inner.not_full.notify_one();
                return DequeueOutcome::Ok(event);
            }
            if self.inner.shutdown.load(Ordering::Acquire) {
                return DequeueOutcome::Shutdown;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return DequeueOutcome::Timeout;
            }
            let timed_out = self.inner.not_empty.wait_for(&mut queue, remaining).timed_out();
            if timed_out && queue.is_empty() && !self.inner.shutdown.load(Ordering::Acquire) {
                return DequeueOutcome::Timeout;
            }
        }
    }

    /// Non-blocking dequeue, for graceful-drain loops after shutdown.
    pub fn try_dequeue(&self) -> Option<Event> {
        let mut queue = self.inner.queue.lock();
        let event = queue.pop_front();
        if event.is_some() {
            drop(queue);
            self.inner.not_full.notify_one();
        }
        event
    }

    /// Signal shutdown and wake every blocked producer and consumer.
    ///
    /// Idempotent. Queued events are not discarded — callers should keep
    /// draining with [`RingBuffer::try_dequeue`] or
    /// [`RingBuffer::dequeue_blocking`] until they return empty/shutdown.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        self.inner.not_empty.notify_all();
        self.inner.not_full.notify_all();
    }

    /// Whether [`RingBuffer::shutdown`] has been called.
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }

    /// Current occupancy snapshot.
    pub fn stats(&self) -> RingBufferStats {
        let queue = self.inner.queue.lock();
        RingBufferStats {
            len: queue.len(),
            capacity: self.inner.capacity,
            high_water_mark: self.inner.high_water_mark.load(Ordering::Relaxed),
        }
    }

    fn record_high_water(&self, len: usize) {
        let mut current = self.inner.high_water_mark.load(Ordering::Relaxed);
        while len > current {
            match self.inner.high_water_mark.compare_exchange_weak(
                current,
                len,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
    }
}
