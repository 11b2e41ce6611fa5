use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// Result of one broadcast
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastOutcome {
    pub delivered: usize,
    /// Viewers whose queue was full; they miss this frame only
    pub lagged: usize,
    /// Viewers whose connection had gone away
    pub removed: usize,
}

/// Registry of connected viewers, each with a bounded outgoing queue.
pub struct ViewerHub {
    viewers: DashMap<Uuid, mpsc::Sender<Arc<str>>>,
    buffer: usize,
    frames_dropped: AtomicU64,
}

impl ViewerHub {
    pub fn new(buffer: usize) -> Self {
        Self {
            viewers: DashMap::new(),
            buffer: buffer.max(1),
            frames_dropped: AtomicU64::new(0),
        }
    }

    pub fn register(&self) -> (Uuid, mpsc::Receiver<Arc<str>>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.buffer);
        self.viewers.insert(id, tx);
        info!(viewer = %id, viewers = self.viewers.len(), "Viewer registered");
        (id, rx)
    }

    pub fn unregister(&self, id: &Uuid) -> bool {
        let removed = self.viewers.remove(id).is_some();
        if removed {
            info!(viewer = %id, viewers = self.viewers.len(), "Viewer unregistered");
        }
        removed
    }

    /// Offer a frame to every viewer without waiting on any of them
    pub fn broadcast(&self, frame: Arc<str>) -> BroadcastOutcome {
        let mut outcome = BroadcastOutcome::default();
        let mut closed = Vec::new();

        for entry in self.viewers.iter() {
            match entry.value().try_send(frame.clone()) {
                Ok(()) => outcome.delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(viewer = %entry.key(), "Viewer queue full, frame dropped");
                    outcome.lagged += 1;
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(*entry.key()),
            }
        }

        // Removal happens after iteration; the map shard locks are released
        for id in closed {
            if self.unregister(&id) {
                outcome.removed += 1;
            }
        }

        self.frames_dropped
            .fetch_add(outcome.lagged as u64, Ordering::Relaxed);
        outcome
    }

    /// Drop every viewer queue, ending all viewer tasks
    pub fn clear(&self) {
        self.viewers.clear();
    }

    pub fn len(&self) -> usize {
        self.viewers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.viewers.is_empty()
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }
}
