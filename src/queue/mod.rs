// Bounded multi-producer ingestion queue
//
// Producers never block: a full queue is reported immediately and nothing is
// buffered beyond capacity. Arrival sequence numbers are assigned under the
// same lock that appends, so sequence order always equals FIFO order.

use crate::error::{BridgeError, BridgeResult};
use crate::event::{Sequenced, UpdateEvent};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

struct QueueInner {
    buffer: VecDeque<Sequenced>,
    next_seq: u64,
}

/// Queue counters for status queries
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QueueStats {
    pub depth: usize,
    pub capacity: usize,
    pub enqueued: u64,
    pub dropped: u64,
}

pub struct IngestQueue {
    capacity: usize,
    inner: Mutex<QueueInner>,
    closed: AtomicBool,
    enqueued: AtomicU64,
    dropped: AtomicU64,
}

impl IngestQueue {
    /// Create a queue holding at most `capacity` events (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(QueueInner {
                buffer: VecDeque::with_capacity(capacity),
                next_seq: 1,
            }),
            closed: AtomicBool::new(false),
            enqueued: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Append an event; returns its arrival sequence number.
    ///
    /// Fails with `Overflow` when full and `Lifecycle` once closed. Never waits.
    pub fn enqueue(&self, event: UpdateEvent) -> BridgeResult<u64> {
        if self.closed.load(Ordering::Acquire) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return Err(BridgeError::Lifecycle(
                "ingestion queue closed for shutdown".to_string(),
            ));
        }

        let mut inner = self.lock();
        if inner.buffer.len() >= self.capacity {
            drop(inner);
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return Err(BridgeError::Overflow {
                capacity: self.capacity,
            });
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.buffer.push_back(Sequenced { seq, event });
        drop(inner);

        self.enqueued.fetch_add(1, Ordering::Relaxed);
        Ok(seq)
    }

    /// Validate an event's shape, then enqueue it
    pub fn submit(&self, event: UpdateEvent) -> BridgeResult<u64> {
        event.validate()?;
        self.enqueue(event)
    }

    /// Remove up to `limit` events in arrival order. Never waits.
    pub fn drain_up_to(&self, limit: usize) -> Vec<Sequenced> {
        let mut inner = self.lock();
        let n = limit.min(inner.buffer.len());
        inner.buffer.drain(..n).collect()
    }

    /// Stop accepting new events; buffered events remain drainable
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            depth: self.len(),
            capacity: self.capacity,
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
