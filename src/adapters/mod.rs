//! Transport adapters.
//!
//! Each adapter converts the canonical [`Snapshot`] to its own wire shape and
//! owns its connection state. Inbound traffic never touches the store
//! directly: adapters with an ingress side push typed events through an
//! [`Ingress`] handle into the ingestion queue.

use crate::error::{BridgeError, BridgeResult, ErrorReporter};
use crate::event::{Command, UpdateEvent};
use crate::queue::IngestQueue;
use crate::state::Snapshot;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub mod live_channel;
pub mod push_socket;
pub mod telemetry;
pub mod topic_bus;

pub use live_channel::LiveChannelAdapter;
pub use push_socket::PushSocketAdapter;
pub use telemetry::TelemetryAdapter;
pub use topic_bus::TopicBusAdapter;

/// Outbound side of a transport.
///
/// `publish` is called from a spawned task per tick, so a slow
/// implementation only delays itself.
#[async_trait]
pub trait TransportAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// Open the transport. Failure leaves the adapter disconnected; the
    /// scheduler retries later.
    async fn connect(&self) -> BridgeResult<()>;

    /// Release the transport. Called exactly once at shutdown.
    async fn disconnect(&self);

    async fn publish(&self, snapshot: Arc<Snapshot>) -> BridgeResult<()>;

    fn is_connected(&self) -> bool;

    /// Adapter-specific detail for status queries
    fn status(&self) -> Option<serde_json::Value> {
        None
    }
}

/// Inbound side for transports that carry control commands
pub trait CommandSource {
    /// Parse a raw command payload and enqueue it.
    ///
    /// Returns the arrival sequence number assigned by the queue.
    fn receive_command(&self, payload: &[u8]) -> BridgeResult<u64>;
}

/// Producer handle onto the ingestion queue.
///
/// Rejections are reported through the shared reporter before being
/// returned, so producer loops can simply move on.
#[derive(Clone)]
pub struct Ingress {
    queue: Arc<IngestQueue>,
    reporter: Arc<ErrorReporter>,
}

impl Ingress {
    pub fn new(queue: Arc<IngestQueue>, reporter: Arc<ErrorReporter>) -> Self {
        Self { queue, reporter }
    }

    pub fn push(&self, event: UpdateEvent) -> BridgeResult<u64> {
        let label = event.label();
        match self.queue.submit(event) {
            Ok(seq) => {
                debug!(seq = seq, kind = label, "Event enqueued");
                Ok(seq)
            }
            Err(e) => {
                self.reporter.report(&e);
                Err(e)
            }
        }
    }

    /// Decode a `{type, parameters}` payload and enqueue it as a command
    pub fn push_command(&self, payload: &[u8]) -> BridgeResult<u64> {
        let command = Command::from_json(payload).map_err(|e| {
            let err = BridgeError::from(e);
            self.reporter.report(&err);
            err
        })?;
        self.push(UpdateEvent::Command(command))
    }

    pub fn reporter(&self) -> &Arc<ErrorReporter> {
        &self.reporter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::event::StatePatch;

    #[test]
    fn test_push_reports_overflow() {
        let queue = Arc::new(IngestQueue::new(1));
        let reporter = Arc::new(ErrorReporter::new());
        let ingress = Ingress::new(queue.clone(), reporter.clone());

        ingress
            .push(UpdateEvent::state("a1", StatePatch::position([1.0, 2.0, 3.0])))
            .unwrap();
        let err = ingress
            .push(UpdateEvent::state("a1", StatePatch::position([4.0, 5.0, 6.0])))
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Overflow);
        assert_eq!(reporter.count(ErrorKind::Overflow), 1);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_push_command_rejects_garbage() {
        let queue = Arc::new(IngestQueue::new(8));
        let reporter = Arc::new(ErrorReporter::new());
        let ingress = Ingress::new(queue.clone(), reporter.clone());

        assert!(ingress.push_command(b"not json").is_err());
        assert_eq!(reporter.count(ErrorKind::MalformedUpdate), 1);
        assert!(queue.is_empty());

        ingress
            .push_command(br#"{"type":"start_simulation","parameters":{}}"#)
            .unwrap();
        assert_eq!(queue.len(), 1);
    }
}
