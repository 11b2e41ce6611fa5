// Mission registry: per-agent ordered waypoint lists and dispatch bookkeeping

use crate::error::BridgeResult;
use crate::event::{validate_agent_id, validate_waypoints, Waypoint};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

#[cfg(test)]
mod tests;

/// MAV_FRAME_GLOBAL_RELATIVE_ALT
pub const FRAME_GLOBAL_RELATIVE_ALT: u8 = 3;

/// Component id addressed by mission dispatch
pub const DEFAULT_TARGET_COMPONENT: u8 = 1;

/// A complete mission for one agent. Replaced wholesale, never edited.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Mission {
    pub agent_id: String,
    /// Registry-wide revision; increases on every replacement
    pub revision: u64,
    /// Ordered by `sequence`
    pub waypoints: Vec<Waypoint>,
    pub updated_at: DateTime<Utc>,
}

/// Wire-shaped messages that upload a mission over the telemetry link
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "msg", rename_all = "snake_case")]
pub enum DispatchFrame {
    MissionClearAll {
        target_system: u8,
        target_component: u8,
    },
    MissionCount {
        target_system: u8,
        target_component: u8,
        count: u16,
    },
    MissionItem {
        target_system: u8,
        target_component: u8,
        seq: u16,
        frame: u8,
        command: u16,
        current: u8,
        autocontinue: u8,
        param1: f64,
        param2: f64,
        param3: f64,
        param4: f64,
        x: f64,
        y: f64,
        z: f64,
    },
}

/// Telemetry system id addressed for an agent: the numeric suffix after
/// the last `_` (`mavlink_3` -> 3), otherwise 1.
pub fn target_system_for(agent_id: &str) -> u8 {
    agent_id
        .rsplit_once('_')
        .and_then(|(_, suffix)| suffix.parse::<u8>().ok())
        .unwrap_or(1)
}

impl Mission {
    /// Derive the clear / count / item frame sequence for this mission
    pub fn dispatch_frames(&self) -> Vec<DispatchFrame> {
        let target_system = target_system_for(&self.agent_id);
        let target_component = DEFAULT_TARGET_COMPONENT;

        let mut frames = Vec::with_capacity(self.waypoints.len() + 2);
        frames.push(DispatchFrame::MissionClearAll {
            target_system,
            target_component,
        });
        frames.push(DispatchFrame::MissionCount {
            target_system,
            target_component,
            count: u16::try_from(self.waypoints.len()).unwrap_or(u16::MAX),
        });
        frames.extend(self.waypoints.iter().map(|wp| DispatchFrame::MissionItem {
            target_system,
            target_component,
            seq: wp.sequence,
            frame: FRAME_GLOBAL_RELATIVE_ALT,
            command: wp.command,
            current: 0,
            autocontinue: u8::from(wp.autocontinue),
            param1: wp.param1,
            param2: wp.param2,
            param3: wp.param3,
            param4: wp.param4,
            x: wp.lat,
            y: wp.lon,
            z: wp.alt,
        }));
        frames
    }
}

pub struct MissionRegistry {
    missions: DashMap<String, Arc<Mission>>,
    revision: AtomicU64,
}

impl MissionRegistry {
    pub fn new() -> Self {
        Self {
            missions: DashMap::new(),
            revision: AtomicU64::new(0),
        }
    }

    /// Validate and atomically replace the mission for `agent_id`.
    ///
    /// Waypoints are stored ordered by sequence index. Returns the new
    /// revision.
    pub fn set_mission(&self, agent_id: &str, mut waypoints: Vec<Waypoint>) -> BridgeResult<u64> {
        validate_agent_id(agent_id)?;
        validate_waypoints(&waypoints)?;

        waypoints.sort_by_key(|wp| wp.sequence);

        let revision = self.revision.fetch_add(1, Ordering::Relaxed) + 1;
        let count = waypoints.len();
        let mission = Arc::new(Mission {
            agent_id: agent_id.to_string(),
            revision,
            waypoints,
            updated_at: Utc::now(),
        });

        self.missions.insert(agent_id.to_string(), mission);

        info!(agent_id = %agent_id, waypoints = count, revision = revision, "Mission replaced");

        Ok(revision)
    }

    pub fn get_mission(&self, agent_id: &str) -> Option<Arc<Mission>> {
        self.missions.get(agent_id).map(|m| Arc::clone(m.value()))
    }

    /// Current `(agent_id, revision)` pairs
    pub fn revisions(&self) -> Vec<(String, u64)> {
        self.missions
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().revision))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.missions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.missions.is_empty()
    }
}

impl Default for MissionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
