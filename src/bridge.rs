//! Public surface of the bridge for the hosting process.

use crate::adapters::TransportAdapter;
use crate::config::SchedulerConfig;
use crate::error::{BridgeError, BridgeResult, ErrorCounts};
use crate::event::{Command, StatePatch, UpdateEvent, Vec3, Waypoint};
use crate::mission::Mission;
use crate::queue::QueueStats;
use crate::scheduler::{Pipeline, SchedulerState, SharedState, TickScheduler};
use crate::simulation::{SimulationCollaborator, SimulationReport};
use crate::state::Snapshot;
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{info, warn};

/// Status returned by [`Bridge::stats`]
#[derive(Debug, Clone, Serialize)]
pub struct BridgeStats {
    pub agent_count: usize,
    /// Adapter name → connected
    pub adapters: BTreeMap<String, bool>,
    /// Extra detail from adapters that report any (viewer counts, drops)
    pub adapter_status: BTreeMap<String, serde_json::Value>,
    pub running: bool,
    pub scheduler_state: SchedulerState,
    pub ticks: u64,
    pub queue: QueueStats,
    pub errors: ErrorCounts,
    pub simulation_connected: bool,
    pub last_simulation: SimulationReport,
}

#[derive(Default)]
struct Lifecycle {
    shutdown: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

pub struct Bridge {
    config: SchedulerConfig,
    shared: Arc<SharedState>,
    lifecycle: Mutex<Lifecycle>,
}

impl Bridge {
    pub fn new(
        config: SchedulerConfig,
        pipeline: Pipeline,
        simulation: Arc<dyn SimulationCollaborator>,
        adapters: Vec<Arc<dyn TransportAdapter>>,
    ) -> Self {
        Self {
            config,
            shared: Arc::new(SharedState::new(pipeline, simulation, adapters)),
            lifecycle: Mutex::new(Lifecycle::default()),
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.shared.pipeline
    }

    pub fn state(&self) -> SchedulerState {
        self.shared.state()
    }

    /// Connect collaborators and start ticking.
    ///
    /// Connection failures are reported, not returned: a disconnected
    /// adapter is retried by the scheduler. Starting a running bridge is a
    /// no-op; starting a stopped one is a lifecycle error.
    pub async fn start(&self) -> BridgeResult<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        match self.shared.state() {
            SchedulerState::Idle => {}
            SchedulerState::Running => return Ok(()),
            SchedulerState::Stopping | SchedulerState::Stopped => {
                return Err(BridgeError::Lifecycle(
                    "bridge has been stopped; build a new one to restart".to_string(),
                ));
            }
        }

        let reporter = &self.shared.pipeline.reporter;
        let simulation = &self.shared.simulation;
        let sim_timeout = self.config.simulation_timeout();

        match timeout(sim_timeout, simulation.connect()).await {
            Ok(Ok(())) => info!(collaborator = %simulation.name(), "Simulation collaborator connected"),
            Ok(Err(e)) => reporter.report(&e),
            Err(_) => reporter.report(&BridgeError::CollaboratorTimeout {
                operation: "connect".to_string(),
                timeout_ms: self.config.simulation_timeout_ms,
            }),
        }

        let connects = self.shared.adapters.iter().map(|adapter| async move {
            let result = timeout(self.config.reconnect_interval(), adapter.connect()).await;
            (adapter.name().to_string(), result)
        });
        for (name, result) in join_all(connects).await {
            match result {
                Ok(Ok(())) => info!(adapter = %name, "Adapter connected"),
                Ok(Err(e)) => {
                    warn!(adapter = %name, "Adapter starting disconnected");
                    reporter.report(&e);
                }
                Err(_) => {
                    warn!(adapter = %name, "Adapter starting disconnected");
                    reporter.report(&BridgeError::connectivity(name, "connect timed out"));
                }
            }
        }

        let scheduler = TickScheduler::new(self.config.clone(), self.shared.clone());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        self.shared.set_state(SchedulerState::Running);
        lifecycle.handle = Some(tokio::spawn(scheduler.run(shutdown_rx)));
        lifecycle.shutdown = Some(shutdown_tx);

        info!(adapters = self.shared.adapters.len(), "Bridge started");
        Ok(())
    }

    /// Stop accepting updates, finish the in-flight tick, then release every
    /// connection. Idempotent.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        let previous = self.shared.state();
        match previous {
            SchedulerState::Stopping | SchedulerState::Stopped => return,
            SchedulerState::Idle | SchedulerState::Running => {}
        }

        self.shared.set_state(SchedulerState::Stopping);
        self.shared.pipeline.queue.close();
        info!("Bridge stopping");

        match (lifecycle.shutdown.take(), lifecycle.handle.take()) {
            (Some(shutdown), Some(handle)) => {
                let _ = shutdown.send(true);
                if let Err(e) = handle.await {
                    self.shared
                        .pipeline
                        .reporter
                        .report_fault(format!("scheduler task failed: {}", e));
                }
            }
            _ => {
                // Never started: nothing is in flight, release connections directly
                for adapter in &self.shared.adapters {
                    adapter.disconnect().await;
                }
                self.shared.simulation.disconnect().await;
            }
        }

        self.shared.set_state(SchedulerState::Stopped);
        info!(ticks = self.shared.ticks(), "Bridge stopped");
    }

    /// Enqueue a state update with a position and optional velocity/attitude.
    ///
    /// Returns the arrival sequence number.
    pub fn add_or_update_agent_state(
        &self,
        agent_id: &str,
        position: Vec3,
        velocity: Option<Vec3>,
        attitude: Option<Vec3>,
    ) -> BridgeResult<u64> {
        self.update_agent_state(
            agent_id,
            StatePatch {
                position: Some(position),
                velocity,
                attitude,
                ..StatePatch::default()
            },
        )
    }

    /// Enqueue an arbitrary sparse update
    pub fn update_agent_state(&self, agent_id: &str, patch: StatePatch) -> BridgeResult<u64> {
        self.submit(UpdateEvent::state(agent_id, patch))
    }

    /// Validate and enqueue a mission replacement
    pub fn set_mission(&self, agent_id: &str, waypoints: Vec<Waypoint>) -> BridgeResult<u64> {
        self.submit(UpdateEvent::mission(agent_id, waypoints))
    }

    pub fn submit_command(&self, command: Command) -> BridgeResult<u64> {
        self.submit(UpdateEvent::Command(command))
    }

    fn submit(&self, event: UpdateEvent) -> BridgeResult<u64> {
        self.shared.pipeline.ingress().push(event)
    }

    pub fn get_mission(&self, agent_id: &str) -> Option<Arc<Mission>> {
        self.shared.pipeline.missions.get_mission(agent_id)
    }

    /// Latest published snapshot (tick 0 and empty before the first tick)
    pub fn agent_states(&self) -> Arc<Snapshot> {
        self.shared.latest()
    }

    /// Receive every snapshot as it is published
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.shared.subscribe()
    }

    pub fn stats(&self) -> BridgeStats {
        let state = self.shared.state();
        BridgeStats {
            agent_count: self.shared.pipeline.store.len(),
            adapters: self
                .shared
                .adapters
                .iter()
                .map(|a| (a.name().to_string(), a.is_connected()))
                .collect(),
            adapter_status: self
                .shared
                .adapters
                .iter()
                .filter_map(|a| a.status().map(|detail| (a.name().to_string(), detail)))
                .collect(),
            running: state == SchedulerState::Running,
            scheduler_state: state,
            ticks: self.shared.ticks(),
            queue: self.shared.pipeline.queue.stats(),
            errors: self.shared.pipeline.reporter.counts(),
            simulation_connected: self.shared.simulation.is_connected(),
            last_simulation: self.shared.last_simulation(),
        }
    }
}
