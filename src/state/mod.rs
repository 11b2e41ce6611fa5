// Agent state store: per-agent records, sparse merge, snapshots

mod agent;
mod snapshot;
mod store;

pub use agent::AgentState;
pub use snapshot::{SimulationMeta, Snapshot};
pub use store::{AgentStore, MergeOutcome};
