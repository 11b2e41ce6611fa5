//! Simulation collaborator seam.
//!
//! The bridge never computes the simulation itself. It pushes merged agent
//! state to a collaborator, reads back the simulation clock, and forwards
//! control verbs. Calls may be slow or hang; callers bound them with a timeout.

use crate::error::BridgeResult;
use crate::state::AgentState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

mod local;
mod remote;

pub use local::LocalSimulation;
pub use remote::RemoteSimulation;

/// What the collaborator reports after a sync
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    /// Simulation clock in seconds
    pub current_time: f64,
    pub running: bool,
}

/// External simulation engine interface.
///
/// Failures are returned as [`BridgeError`](crate::error::BridgeError), never
/// panics. Implementations must be cheap to share across tasks.
#[async_trait]
pub trait SimulationCollaborator: Send + Sync {
    /// Short name used in logs and stats
    fn name(&self) -> &str;

    async fn connect(&self) -> BridgeResult<()>;

    async fn disconnect(&self);

    fn is_connected(&self) -> bool;

    /// Push current agent states and let the simulation advance.
    ///
    /// Returns the simulation clock and running flag after the step.
    async fn advance(&self, agents: &[AgentState]) -> BridgeResult<SimulationReport>;

    async fn start(&self) -> BridgeResult<()>;

    async fn stop(&self) -> BridgeResult<()>;

    async fn load_mission(&self, path: &str) -> BridgeResult<()>;

    async fn set_parameter(&self, name: &str, value: f64) -> BridgeResult<()>;
}
