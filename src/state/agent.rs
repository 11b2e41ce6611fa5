use crate::event::{StatePatch, Vec3};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Arrival sequence of the last write to each field
#[derive(Clone, Debug, Default, PartialEq)]
struct FieldClocks {
    position: Option<u64>,
    velocity: Option<u64>,
    attitude: Option<u64>,
    battery_voltage: Option<u64>,
    flight_mode: Option<u64>,
    armed: Option<u64>,
    gps_fix: Option<u64>,
}

/// Authoritative state of one agent
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    /// Producer-assigned, globally unique identifier
    pub id: String,

    pub position: Vec3,
    pub velocity: Vec3,
    /// Roll, pitch, yaw
    pub attitude: Vec3,
    pub battery_voltage: f64,
    pub flight_mode: String,
    pub armed: bool,
    pub gps_fix: i32,

    /// Time of the most recent merge (never moves backwards)
    pub last_updated: DateTime<Utc>,

    /// Arrival sequence of the most recent merge
    pub last_sequence: u64,

    #[serde(skip)]
    clocks: FieldClocks,
}

impl AgentState {
    /// Fresh agent with every field at its default
    pub fn new(id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            position: [0.0; 3],
            velocity: [0.0; 3],
            attitude: [0.0; 3],
            battery_voltage: 0.0,
            flight_mode: "UNKNOWN".to_string(),
            armed: false,
            gps_fix: 0,
            last_updated: now,
            last_sequence: 0,
            clocks: FieldClocks::default(),
        }
    }

    /// Merge a sparse update.
    ///
    /// Each present field wins only if `seq` is newer than the sequence of
    /// the field's last write. Sequences are unique per event, so re-applying
    /// the same update writes nothing and an older update never overwrites a
    /// newer one. Absent fields are left
    /// untouched. Returns true if any field was written.
    pub fn apply(&mut self, seq: u64, patch: &StatePatch, now: DateTime<Utc>) -> bool {
        let clocks = &mut self.clocks;
        let mut written = false;

        written |= write_field(&mut self.position, &mut clocks.position, &patch.position, seq);
        written |= write_field(&mut self.velocity, &mut clocks.velocity, &patch.velocity, seq);
        written |= write_field(&mut self.attitude, &mut clocks.attitude, &patch.attitude, seq);
        written |= write_field(
            &mut self.battery_voltage,
            &mut clocks.battery_voltage,
            &patch.battery_voltage,
            seq,
        );
        written |= write_field(
            &mut self.flight_mode,
            &mut clocks.flight_mode,
            &patch.flight_mode,
            seq,
        );
        written |= write_field(&mut self.armed, &mut clocks.armed, &patch.armed, seq);
        written |= write_field(&mut self.gps_fix, &mut clocks.gps_fix, &patch.gps_fix, seq);

        if written {
            self.last_sequence = self.last_sequence.max(seq);
            if now > self.last_updated {
                self.last_updated = now;
            }
        }

        written
    }
}

fn write_field<T: Clone>(
    slot: &mut T,
    clock: &mut Option<u64>,
    incoming: &Option<T>,
    seq: u64,
) -> bool {
    match incoming {
        Some(value) if clock.map_or(true, |last| seq > last) => {
            *slot = value.clone();
            *clock = Some(seq);
            true
        }
        _ => false,
    }
}
