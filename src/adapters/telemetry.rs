//! Telemetry endpoint: decoded vehicle records in, mission dispatch out.
//!
//! Each UDP datagram carries one already-decoded record as JSON. Unit
//! conversion to the canonical state happens here, before the queue.

use super::{Ingress, TransportAdapter};
use crate::config::TelemetryConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::event::{StatePatch, UpdateEvent};
use crate::mission::{target_system_for, MissionRegistry};
use crate::state::Snapshot;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const MAX_DATAGRAM: usize = 65_536;
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// `sensors_enabled` bit carrying the armed flag
const ARMED_FLAG: u32 = 0x8000_0000;

/// One decoded telemetry record
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "msg", rename_all = "snake_case")]
pub enum TelemetryRecord {
    GlobalPosition {
        source_system: u8,
        lat_e7: i32,
        lon_e7: i32,
        alt_mm: i32,
        #[serde(default)]
        vx_cms: i16,
        #[serde(default)]
        vy_cms: i16,
        #[serde(default)]
        vz_cms: i16,
    },
    Attitude {
        source_system: u8,
        roll: f64,
        pitch: f64,
        yaw: f64,
    },
    SysStatus {
        source_system: u8,
        voltage_battery_mv: u16,
        sensors_enabled: u32,
    },
    Heartbeat {
        source_system: u8,
        mode: String,
        #[serde(default)]
        gps_fix: Option<i32>,
    },
}

impl TelemetryRecord {
    pub fn source_system(&self) -> u8 {
        match self {
            TelemetryRecord::GlobalPosition { source_system, .. }
            | TelemetryRecord::Attitude { source_system, .. }
            | TelemetryRecord::SysStatus { source_system, .. }
            | TelemetryRecord::Heartbeat { source_system, .. } => *source_system,
        }
    }

    pub fn agent_id(&self) -> String {
        agent_id_for(self.source_system())
    }

    /// Convert wire units into a sparse state patch
    pub fn to_patch(&self) -> StatePatch {
        match self {
            TelemetryRecord::GlobalPosition {
                lat_e7,
                lon_e7,
                alt_mm,
                vx_cms,
                vy_cms,
                vz_cms,
                ..
            } => StatePatch {
                position: Some([
                    *lat_e7 as f64 / 1e7,
                    *lon_e7 as f64 / 1e7,
                    *alt_mm as f64 / 1000.0,
                ]),
                velocity: Some([
                    *vx_cms as f64 / 100.0,
                    *vy_cms as f64 / 100.0,
                    *vz_cms as f64 / 100.0,
                ]),
                ..StatePatch::default()
            },
            TelemetryRecord::Attitude {
                roll, pitch, yaw, ..
            } => StatePatch {
                attitude: Some([*roll, *pitch, *yaw]),
                ..StatePatch::default()
            },
            TelemetryRecord::SysStatus {
                voltage_battery_mv,
                sensors_enabled,
                ..
            } => StatePatch {
                battery_voltage: Some(*voltage_battery_mv as f64 / 1000.0),
                armed: Some(sensors_enabled & ARMED_FLAG != 0),
                ..StatePatch::default()
            },
            TelemetryRecord::Heartbeat { mode, gps_fix, .. } => StatePatch {
                flight_mode: Some(mode.clone()),
                gps_fix: *gps_fix,
                ..StatePatch::default()
            },
        }
    }

    pub fn into_event(self) -> UpdateEvent {
        UpdateEvent::state(self.agent_id(), self.to_patch())
    }
}

pub fn agent_id_for(source_system: u8) -> String {
    format!("mavlink_{}", source_system)
}

/// Telemetry transport adapter
pub struct TelemetryAdapter {
    config: TelemetryConfig,
    ingress: Ingress,
    missions: Arc<MissionRegistry>,
    socket: Mutex<Option<Arc<UdpSocket>>>,
    receiver: Mutex<Option<JoinHandle<()>>>,
    connected: AtomicBool,
    /// Last address each vehicle sent from
    peers: Arc<DashMap<u8, SocketAddr>>,
    /// Mission revision last dispatched per agent
    dispatched: Mutex<HashMap<String, u64>>,
}

impl TelemetryAdapter {
    pub fn new(config: TelemetryConfig, ingress: Ingress, missions: Arc<MissionRegistry>) -> Self {
        Self {
            config,
            ingress,
            missions,
            socket: Mutex::new(None),
            receiver: Mutex::new(None),
            connected: AtomicBool::new(false),
            peers: Arc::new(DashMap::new()),
            dispatched: Mutex::new(HashMap::new()),
        }
    }

    /// Address the socket is bound to, once connected
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.current_socket().and_then(|s| s.local_addr().ok())
    }

    fn current_socket(&self) -> Option<Arc<UdpSocket>> {
        self.socket
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Decode one datagram and enqueue it. Failures are reported by the
    /// ingress and returned.
    pub fn receive_record(&self, payload: &[u8]) -> BridgeResult<u64> {
        let record = parse_record(&self.ingress, payload)?;
        self.ingress.push(record.into_event())
    }

    async fn destination_for(&self, agent_id: &str) -> Option<SocketAddr> {
        if let Some(addr) = &self.config.vehicle_addr {
            return match tokio::net::lookup_host(addr.as_str()).await {
                Ok(mut addrs) => addrs.next(),
                Err(e) => {
                    warn!(addr = %addr, error = %e, "Cannot resolve vehicle address");
                    None
                }
            };
        }
        self.peers
            .get(&target_system_for(agent_id))
            .map(|entry| *entry.value())
    }

    /// Send clear/count/item frames for every mission whose revision moved.
    async fn dispatch_pending_missions(&self, socket: &UdpSocket) -> BridgeResult<usize> {
        let pending: Vec<(String, u64)> = {
            let dispatched = self
                .dispatched
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            self.missions
                .revisions()
                .into_iter()
                .filter(|(agent, rev)| dispatched.get(agent) != Some(rev))
                .collect()
        };

        let mut sent = 0;
        for (agent_id, revision) in pending {
            let Some(mission) = self.missions.get_mission(&agent_id) else {
                continue;
            };
            let Some(dest) = self.destination_for(&agent_id).await else {
                debug!(agent_id = %agent_id, "No known address for vehicle, mission dispatch deferred");
                continue;
            };

            for frame in mission.dispatch_frames() {
                let bytes = serde_json::to_vec(&frame)
                    .map_err(|e| BridgeError::Collaborator(format!("encode dispatch frame: {}", e)))?;
                socket
                    .send_to(&bytes, dest)
                    .await
                    .map_err(|e| BridgeError::connectivity(self.name(), e))?;
            }

            info!(
                agent_id = %agent_id,
                revision = revision,
                waypoints = mission.waypoints.len(),
                dest = %dest,
                "Mission dispatched"
            );
            self.dispatched
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .insert(agent_id, revision);
            sent += 1;
        }
        Ok(sent)
    }
}

/// Decode one datagram, reporting it as malformed if it does not parse
fn parse_record(ingress: &Ingress, payload: &[u8]) -> BridgeResult<TelemetryRecord> {
    serde_json::from_slice(payload).map_err(|e| {
        let err = BridgeError::malformed(format!("telemetry record: {}", e));
        ingress.reporter().report(&err);
        err
    })
}

async fn receive_loop(socket: Arc<UdpSocket>, ingress: Ingress, peers: Arc<DashMap<u8, SocketAddr>>) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, from)) => {
                // Rejections are already reported by the ingress
                if let Ok(record) = parse_record(&ingress, &buf[..len]) {
                    peers.insert(record.source_system(), from);
                    let _ = ingress.push(record.into_event());
                }
            }
            Err(e) => {
                warn!(error = %e, "Telemetry socket receive failed");
                ingress
                    .reporter()
                    .report(&BridgeError::connectivity("telemetry", e));
                tokio::time::sleep(RECV_ERROR_BACKOFF).await;
            }
        }
    }
}

#[async_trait]
impl TransportAdapter for TelemetryAdapter {
    fn name(&self) -> &str {
        "telemetry"
    }

    async fn connect(&self) -> BridgeResult<()> {
        if self.is_connected() {
            return Ok(());
        }

        let socket = UdpSocket::bind(&self.config.bind)
            .await
            .map_err(|e| BridgeError::connectivity(self.name(), format!("bind {}: {}", self.config.bind, e)))?;
        let socket = Arc::new(socket);

        let handle = tokio::spawn(receive_loop(
            socket.clone(),
            self.ingress.clone(),
            self.peers.clone(),
        ));

        info!(bind = %self.config.bind, "Telemetry endpoint listening");
        *self
            .socket
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(socket);
        if let Some(old) = self
            .receiver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .replace(handle)
        {
            old.abort();
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(handle) = self
            .receiver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            handle.abort();
        }
        self.socket
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        info!("Telemetry endpoint closed");
    }

    async fn publish(&self, snapshot: Arc<Snapshot>) -> BridgeResult<()> {
        let socket = self
            .current_socket()
            .ok_or_else(|| BridgeError::connectivity(self.name(), "not connected"))?;

        let sent = self.dispatch_pending_missions(&socket).await?;
        if sent > 0 {
            debug!(tick = snapshot.tick, missions = sent, "Telemetry publish dispatched missions");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
