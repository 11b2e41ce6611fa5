use crate::error::{BridgeError, BridgeResult};
use crate::event::Vec3;
use crate::state::Snapshot;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Server → viewer: one frame per tick
#[derive(Debug, Serialize)]
pub struct LiveFrame<'a> {
    /// Unix seconds
    pub timestamp: f64,
    pub drone_states: BTreeMap<&'a str, DroneState<'a>>,
    pub simulation: SimulationStatus,
}

#[derive(Debug, Serialize)]
pub struct DroneState<'a> {
    pub position: Vec3,
    pub velocity: Vec3,
    pub attitude: Vec3,
    pub battery_voltage: f64,
    pub flight_mode: &'a str,
    pub armed: bool,
}

#[derive(Debug, Serialize)]
pub struct SimulationStatus {
    pub current_time: f64,
    pub is_playing: bool,
    pub drone_count: usize,
}

impl<'a> From<&'a Snapshot> for LiveFrame<'a> {
    fn from(snapshot: &'a Snapshot) -> Self {
        let drone_states = snapshot
            .agents
            .iter()
            .map(|(id, agent)| {
                (
                    id.as_str(),
                    DroneState {
                        position: agent.position,
                        velocity: agent.velocity,
                        attitude: agent.attitude,
                        battery_voltage: agent.battery_voltage,
                        flight_mode: &agent.flight_mode,
                        armed: agent.armed,
                    },
                )
            })
            .collect();

        Self {
            timestamp: snapshot.created_at.timestamp_micros() as f64 / 1e6,
            drone_states,
            simulation: SimulationStatus {
                current_time: snapshot.simulation.current_time,
                is_playing: snapshot.simulation.running,
                drone_count: snapshot.agent_count(),
            },
        }
    }
}

/// Serialise a snapshot once for every viewer
pub fn encode_frame(snapshot: &Snapshot) -> BridgeResult<Arc<str>> {
    serde_json::to_string(&LiveFrame::from(snapshot))
        .map(Arc::from)
        .map_err(|e| BridgeError::Collaborator(format!("encode live frame: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::StatePatch;
    use crate::state::AgentStore;

    #[test]
    fn test_frame_shape() {
        let store = AgentStore::new();
        store.merge(
            "a1",
            1,
            &StatePatch {
                position: Some([1.0, 2.0, 3.0]),
                flight_mode: Some("AUTO".to_string()),
                armed: Some(true),
                ..StatePatch::default()
            },
        );
        let snapshot = store.snapshot(7, 12.5, true);

        let frame = encode_frame(&snapshot).unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();

        assert_eq!(value["drone_states"]["a1"]["position"], serde_json::json!([1.0, 2.0, 3.0]));
        assert_eq!(value["drone_states"]["a1"]["flight_mode"], "AUTO");
        assert_eq!(value["drone_states"]["a1"]["armed"], true);
        assert_eq!(value["drone_states"]["a1"]["battery_voltage"], 0.0);
        assert_eq!(value["simulation"]["current_time"], 12.5);
        assert_eq!(value["simulation"]["is_playing"], true);
        assert_eq!(value["simulation"]["drone_count"], 1);
        assert!(value["timestamp"].as_f64().unwrap() > 0.0);
    }
}
