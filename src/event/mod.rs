use serde::{Deserialize, Serialize};

mod command;
mod validation;
#[cfg(test)]
mod tests;

pub use command::{Command, RawCommand};
pub use validation::{
    validate_agent_id, validate_patch, validate_waypoints, ValidationError, MAX_MISSION_ITEMS,
};

/// Three floating-point coordinates (position, velocity or roll/pitch/yaw).
///
/// The frame is defined by the producer; the core never reinterprets it.
pub type Vec3 = [f64; 3];

/// Sparse set of agent fields carried by a state update.
///
/// `None` means "not present in this update" and leaves the stored field
/// untouched when merged.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StatePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Vec3>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<Vec3>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attitude: Option<Vec3>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_voltage: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flight_mode: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub armed: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gps_fix: Option<i32>,
}

impl StatePatch {
    pub fn position(position: Vec3) -> Self {
        Self {
            position: Some(position),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_none()
            && self.velocity.is_none()
            && self.attitude.is_none()
            && self.battery_voltage.is_none()
            && self.flight_mode.is_none()
            && self.armed.is_none()
            && self.gps_fix.is_none()
    }
}

fn default_waypoint_command() -> u16 {
    // MAV_CMD_NAV_WAYPOINT
    16
}

fn default_autocontinue() -> bool {
    true
}

/// One mission item for an agent
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    /// Traversal order, unique within a mission
    pub sequence: u16,
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
    #[serde(default = "default_waypoint_command")]
    pub command: u16,
    #[serde(default)]
    pub param1: f64,
    #[serde(default)]
    pub param2: f64,
    #[serde(default)]
    pub param3: f64,
    #[serde(default)]
    pub param4: f64,
    #[serde(default = "default_autocontinue")]
    pub autocontinue: bool,
}

impl Waypoint {
    /// Plain navigation waypoint with default command and parameters
    pub fn new(sequence: u16, lat: f64, lon: f64, alt: f64) -> Self {
        Self {
            sequence,
            lat,
            lon,
            alt,
            command: default_waypoint_command(),
            param1: 0.0,
            param2: 0.0,
            param3: 0.0,
            param4: 0.0,
            autocontinue: default_autocontinue(),
        }
    }
}

/// Typed update flowing through the ingestion queue.
///
/// Immutable once enqueued.
#[derive(Clone, Debug, PartialEq)]
pub enum UpdateEvent {
    StateUpdate { agent_id: String, patch: StatePatch },
    MissionUpdate { agent_id: String, waypoints: Vec<Waypoint> },
    Command(Command),
}

impl UpdateEvent {
    pub fn state(agent_id: impl Into<String>, patch: StatePatch) -> Self {
        UpdateEvent::StateUpdate {
            agent_id: agent_id.into(),
            patch,
        }
    }

    pub fn mission(agent_id: impl Into<String>, waypoints: Vec<Waypoint>) -> Self {
        UpdateEvent::MissionUpdate {
            agent_id: agent_id.into(),
            waypoints,
        }
    }

    /// Short label used in logs
    pub fn label(&self) -> &'static str {
        match self {
            UpdateEvent::StateUpdate { .. } => "state_update",
            UpdateEvent::MissionUpdate { .. } => "mission_update",
            UpdateEvent::Command(_) => "command",
        }
    }

    /// Minimal shape validation applied before an event is enqueued.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            UpdateEvent::StateUpdate { agent_id, patch } => {
                validate_agent_id(agent_id)?;
                validate_patch(patch)
            }
            UpdateEvent::MissionUpdate {
                agent_id,
                waypoints,
            } => {
                validate_agent_id(agent_id)?;
                validate_waypoints(waypoints)
            }
            UpdateEvent::Command(_) => Ok(()),
        }
    }
}

/// An event stamped with its arrival sequence number
#[derive(Clone, Debug, PartialEq)]
pub struct Sequenced {
    pub seq: u64,
    pub event: UpdateEvent,
}
