//! Low-latency push socket: one datagram per tick per target, no
//! acknowledgement.

use super::TransportAdapter;
use crate::config::PushConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::event::Vec3;
use crate::state::Snapshot;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

#[derive(Debug, Serialize)]
pub struct PushEnvelope<'a> {
    pub topic: &'a str,
    /// Unix seconds
    pub timestamp: f64,
    pub data: PushData<'a>,
}

#[derive(Debug, Serialize)]
pub struct PushData<'a> {
    pub timestamp: f64,
    pub drone_count: usize,
    pub positions: BTreeMap<&'a str, Vec3>,
}

/// Build the envelope for a snapshot, or `None` when there is nothing to send
pub fn build_envelope<'a>(topic: &'a str, snapshot: &'a Snapshot) -> Option<PushEnvelope<'a>> {
    if snapshot.agents.is_empty() {
        return None;
    }
    let timestamp = snapshot.created_at.timestamp_micros() as f64 / 1e6;
    let positions = snapshot
        .agents
        .iter()
        .map(|(id, state)| (id.as_str(), state.position))
        .collect();

    Some(PushEnvelope {
        topic,
        timestamp,
        data: PushData {
            timestamp,
            drone_count: snapshot.agent_count(),
            positions,
        },
    })
}

struct Bound {
    socket: Arc<UdpSocket>,
    targets: Arc<[SocketAddr]>,
}

pub struct PushSocketAdapter {
    config: PushConfig,
    bound: Mutex<Option<Bound>>,
    connected: AtomicBool,
    sent: AtomicU64,
}

impl PushSocketAdapter {
    pub fn new(config: PushConfig) -> Self {
        Self {
            config,
            bound: Mutex::new(None),
            connected: AtomicBool::new(false),
            sent: AtomicU64::new(0),
        }
    }

    /// Datagrams sent since start
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    fn current(&self) -> Option<(Arc<UdpSocket>, Arc<[SocketAddr]>)> {
        self.bound
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .map(|b| (b.socket.clone(), b.targets.clone()))
    }

    async fn resolve_targets(&self) -> Vec<SocketAddr> {
        let mut resolved = Vec::with_capacity(self.config.targets.len());
        for target in &self.config.targets {
            match tokio::net::lookup_host(target.as_str()).await {
                Ok(mut addrs) => {
                    if let Some(addr) = addrs.next() {
                        resolved.push(addr);
                    }
                }
                Err(e) => warn!(target = %target, error = %e, "Cannot resolve push target"),
            }
        }
        resolved
    }
}

#[async_trait]
impl TransportAdapter for PushSocketAdapter {
    fn name(&self) -> &str {
        "push_socket"
    }

    async fn connect(&self) -> BridgeResult<()> {
        let targets = self.resolve_targets().await;
        if targets.is_empty() {
            return Err(BridgeError::connectivity(self.name(), "no resolvable targets"));
        }

        let socket = UdpSocket::bind(&self.config.bind)
            .await
            .map_err(|e| BridgeError::connectivity(self.name(), format!("bind {}: {}", self.config.bind, e)))?;

        info!(bind = %self.config.bind, targets = targets.len(), "Push socket ready");
        *self
            .bound
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Bound {
            socket: Arc::new(socket),
            targets: targets.into(),
        });
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.bound
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        info!(sent = self.sent(), "Push socket closed");
    }

    async fn publish(&self, snapshot: Arc<Snapshot>) -> BridgeResult<()> {
        let Some(envelope) = build_envelope(&self.config.topic, &snapshot) else {
            return Ok(());
        };
        let (socket, targets) = self
            .current()
            .ok_or_else(|| BridgeError::connectivity(self.name(), "not connected"))?;

        let payload = serde_json::to_vec(&envelope)
            .map_err(|e| BridgeError::Collaborator(format!("encode push envelope: {}", e)))?;

        let mut failures = 0;
        for target in targets.iter() {
            match socket.send_to(&payload, target).await {
                Ok(_) => {
                    self.sent.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    debug!(target = %target, error = %e, "Push send failed");
                    failures += 1;
                }
            }
        }

        if failures == targets.len() {
            return Err(BridgeError::connectivity(
                self.name(),
                format!("all {} targets unreachable", failures),
            ));
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
