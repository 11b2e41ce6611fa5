use crate::state::AgentState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Aggregate simulation metadata carried by every snapshot
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SimulationMeta {
    /// Simulation clock (seconds) as last reported by the collaborator
    pub current_time: f64,
    pub running: bool,
    pub agent_count: usize,
}

/// Immutable point-in-time copy of every agent plus simulation metadata.
///
/// Built once per tick and shared across adapters behind an `Arc`.
#[derive(Clone, Debug, Serialize)]
pub struct Snapshot {
    /// Tick number that produced this snapshot (0 = before first tick)
    pub tick: u64,

    pub created_at: DateTime<Utc>,

    pub simulation: SimulationMeta,

    /// All agents keyed by id
    pub agents: BTreeMap<String, AgentState>,
}

impl Snapshot {
    pub fn new(
        tick: u64,
        agents: BTreeMap<String, AgentState>,
        current_time: f64,
        running: bool,
    ) -> Self {
        Self {
            tick,
            created_at: Utc::now(),
            simulation: SimulationMeta {
                current_time,
                running,
                agent_count: agents.len(),
            },
            agents,
        }
    }

    /// Snapshot with no agents, published before the first tick
    pub fn empty() -> Self {
        Self::new(0, BTreeMap::new(), 0.0, false)
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    pub fn get(&self, agent_id: &str) -> Option<&AgentState> {
        self.agents.get(agent_id)
    }
}
