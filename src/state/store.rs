use crate::event::StatePatch;
use crate::state::{AgentState, Snapshot};
use chrono::Utc;
use dashmap::DashMap;
use std::collections::BTreeMap;
use tracing::debug;

/// Result of a single merge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// First update for this id; agent created
    Created,
    /// At least one field written
    Updated,
    /// Every present field was older than what is stored
    Stale,
}

/// Authoritative in-memory table of per-agent state.
///
/// Only the tick path writes (single-writer discipline); readers may run
/// concurrently. Each merge holds the entry's shard lock for the duration of
/// the field copy only, so a reader never sees half of an update.
pub struct AgentStore {
    agents: DashMap<String, AgentState>,
}

impl AgentStore {
    pub fn new() -> Self {
        Self {
            agents: DashMap::new(),
        }
    }

    /// Upsert: create the agent on first update, then sparse-merge the patch.
    pub fn merge(&self, agent_id: &str, seq: u64, patch: &StatePatch) -> MergeOutcome {
        let now = Utc::now();
        let mut created = false;

        let mut agent = self.agents.entry(agent_id.to_string()).or_insert_with(|| {
            created = true;
            AgentState::new(agent_id, now)
        });

        let written = agent.apply(seq, patch, now);

        debug!(agent_id = %agent_id, seq = seq, created = created, "Merged state update");

        match (created, written) {
            (true, _) => MergeOutcome::Created,
            (false, true) => MergeOutcome::Updated,
            (false, false) => MergeOutcome::Stale,
        }
    }

    /// Get agent by ID
    pub fn get(&self, agent_id: &str) -> Option<AgentState> {
        self.agents.get(agent_id).map(|a| a.clone())
    }

    /// Copy of every agent, keyed by id
    pub fn states(&self) -> BTreeMap<String, AgentState> {
        self.agents
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Build an immutable snapshot with the given simulation metadata
    pub fn snapshot(&self, tick: u64, current_time: f64, running: bool) -> Snapshot {
        Snapshot::new(tick, self.states(), current_time, running)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl Default for AgentStore {
    fn default() -> Self {
        Self::new()
    }
}
