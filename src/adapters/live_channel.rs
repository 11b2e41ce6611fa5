//! Live push channel to remote viewers over WebSocket.

use super::TransportAdapter;
use crate::config::LiveConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::state::Snapshot;
use crate::viewer::{create_viewer_router, encode_frame, ViewerHub};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const SERVER_STOP_TIMEOUT: Duration = Duration::from_secs(2);

struct Server {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

pub struct LiveChannelAdapter {
    config: LiveConfig,
    hub: Arc<ViewerHub>,
    server: Mutex<Option<Server>>,
    connected: Arc<AtomicBool>,
}

impl LiveChannelAdapter {
    pub fn new(config: LiveConfig) -> Self {
        let hub = Arc::new(ViewerHub::new(config.viewer_buffer));
        Self {
            config,
            hub,
            server: Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn hub(&self) -> Arc<ViewerHub> {
        self.hub.clone()
    }

    pub fn viewer_count(&self) -> usize {
        self.hub.len()
    }

    /// Address the server is listening on, once connected
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .map(|s| s.addr)
    }
}

#[async_trait]
impl TransportAdapter for LiveChannelAdapter {
    fn name(&self) -> &str {
        "live_channel"
    }

    async fn connect(&self) -> BridgeResult<()> {
        if self.is_connected() {
            return Ok(());
        }

        let listener = TcpListener::bind(&self.config.bind)
            .await
            .map_err(|e| BridgeError::connectivity(self.name(), format!("bind {}: {}", self.config.bind, e)))?;
        let addr = listener
            .local_addr()
            .map_err(|e| BridgeError::connectivity(self.name(), e))?;

        let app = create_viewer_router(self.hub.clone());
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let connected = self.connected.clone();

        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                error!(error = %e, "Live channel server failed");
            }
            connected.store(false, Ordering::SeqCst);
        });

        info!(addr = %addr, "Live channel listening on ws://{}/api/ws", addr);
        *self
            .server
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Server {
            addr,
            shutdown: shutdown_tx,
            handle,
        });
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let server = self
            .server
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        // Dropping the queues ends every viewer task
        self.hub.clear();

        if let Some(Server {
            shutdown,
            mut handle,
            ..
        }) = server
        {
            let _ = shutdown.send(());
            if tokio::time::timeout(SERVER_STOP_TIMEOUT, &mut handle)
                .await
                .is_err()
            {
                warn!("Live channel server did not stop in time, aborting");
                handle.abort();
            }
        }
        info!("Live channel closed");
    }

    async fn publish(&self, snapshot: Arc<Snapshot>) -> BridgeResult<()> {
        if self.hub.is_empty() {
            return Ok(());
        }
        let frame = encode_frame(&snapshot)?;
        let outcome = self.hub.broadcast(frame);
        debug!(
            tick = snapshot.tick,
            delivered = outcome.delivered,
            lagged = outcome.lagged,
            removed = outcome.removed,
            "Live frame broadcast"
        );
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn status(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "viewers": self.viewer_count(),
            "frames_dropped": self.hub.frames_dropped(),
        }))
    }
}
