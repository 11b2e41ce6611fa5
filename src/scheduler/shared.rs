use crate::adapters::{Ingress, TransportAdapter};
use crate::error::ErrorReporter;
use crate::mission::MissionRegistry;
use crate::queue::IngestQueue;
use crate::simulation::{SimulationCollaborator, SimulationReport};
use crate::state::{AgentStore, Snapshot};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

/// Scheduler lifecycle. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// Queue, store, registry and reporter. Built first so adapters can be
/// handed their ingress before the bridge exists.
#[derive(Clone)]
pub struct Pipeline {
    pub queue: Arc<IngestQueue>,
    pub store: Arc<AgentStore>,
    pub missions: Arc<MissionRegistry>,
    pub reporter: Arc<ErrorReporter>,
}

impl Pipeline {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            queue: Arc::new(IngestQueue::new(queue_capacity)),
            store: Arc::new(AgentStore::new()),
            missions: Arc::new(MissionRegistry::new()),
            reporter: Arc::new(ErrorReporter::new()),
        }
    }

    pub fn ingress(&self) -> Ingress {
        Ingress::new(self.queue.clone(), self.reporter.clone())
    }
}

/// Everything the tick task shares with the bridge facade
pub struct SharedState {
    pub pipeline: Pipeline,
    pub simulation: Arc<dyn SimulationCollaborator>,
    pub adapters: Vec<Arc<dyn TransportAdapter>>,
    latest: watch::Sender<Arc<Snapshot>>,
    last_simulation: Mutex<SimulationReport>,
    ticks: AtomicU64,
    state: Mutex<SchedulerState>,
}

impl SharedState {
    pub fn new(
        pipeline: Pipeline,
        simulation: Arc<dyn SimulationCollaborator>,
        adapters: Vec<Arc<dyn TransportAdapter>>,
    ) -> Self {
        let (latest, _) = watch::channel(Arc::new(Snapshot::empty()));
        Self {
            pipeline,
            simulation,
            adapters,
            latest,
            last_simulation: Mutex::new(SimulationReport::default()),
            ticks: AtomicU64::new(0),
            state: Mutex::new(SchedulerState::Idle),
        }
    }

    /// Most recently published snapshot
    pub fn latest(&self) -> Arc<Snapshot> {
        self.latest.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.latest.subscribe()
    }

    pub(crate) fn publish_snapshot(&self, snapshot: Arc<Snapshot>) {
        self.latest.send_replace(snapshot);
    }

    pub fn last_simulation(&self) -> SimulationReport {
        lock(&self.last_simulation).clone()
    }

    pub(crate) fn set_last_simulation(&self, report: SimulationReport) {
        *lock(&self.last_simulation) = report;
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub(crate) fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn state(&self) -> SchedulerState {
        *lock(&self.state)
    }

    pub(crate) fn set_state(&self, state: SchedulerState) {
        *lock(&self.state) = state;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
