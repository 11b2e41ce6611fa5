// Error taxonomy and reporting channel
pub mod error;

// Update events, commands and validation
pub mod event;

// Agent state store and snapshots
pub mod state;

// Bounded ingestion queue
pub mod queue;

// Per-agent missions
pub mod mission;

// Simulation collaborators
pub mod simulation;

// Command routing to the simulation
pub mod dispatcher;

// Transport adapters
pub mod adapters;

// Live viewer connections
pub mod viewer;

// Tick scheduler
pub mod scheduler;

// Lifecycle facade
pub mod bridge;

// Configuration
pub mod config;

// HTTP API
pub mod api;

#[cfg(test)]
pub(crate) mod test_support;

pub use bridge::{Bridge, BridgeStats};
pub use error::{BridgeError, BridgeResult};
