//! Fixed-cadence driver: drain → merge → sync → snapshot → fan-out.
//!
//! The tick task is the only writer of the store and mission registry.
//! Everything that can block on the outside world (simulation sync, adapter
//! publish, command execution) runs on its own task, so a tick itself never
//! waits on I/O.

mod shared;


pub use shared::{Pipeline, SchedulerState, SharedState};

use crate::adapters::TransportAdapter;
use crate::config::SchedulerConfig;
use crate::dispatcher::{CommandDispatcher, CommandWorker};
use crate::error::{BridgeError, BridgeResult};
use crate::event::{Sequenced, UpdateEvent};
use crate::simulation::SimulationReport;
use crate::state::{AgentState, MergeOutcome, Snapshot};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, timeout, timeout_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Counters for one tick, used in logs and tests
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickSummary {
    pub tick: u64,
    pub drained: usize,
    pub merged: usize,
    pub stale: usize,
    pub missions: usize,
    pub commands: usize,
    pub rejected: usize,
    /// Adapters handed the snapshot
    pub published: usize,
    /// Adapters skipped because their previous publish is still running
    pub skipped: usize,
    /// Disconnected adapters given a reconnect attempt
    pub reconnecting: usize,
}

struct AdapterSlot {
    adapter: Arc<dyn TransportAdapter>,
    inflight: Option<JoinHandle<()>>,
    next_reconnect: Instant,
}

pub struct TickScheduler {
    config: SchedulerConfig,
    shared: Arc<SharedState>,
    commands: CommandWorker,
    sim_sync: Option<JoinHandle<BridgeResult<SimulationReport>>>,
    next_sim_attempt: Instant,
    slots: Vec<AdapterSlot>,
    tick: u64,
}

impl TickScheduler {
    /// Build the scheduler and spawn its command worker
    pub fn new(config: SchedulerConfig, shared: Arc<SharedState>) -> Self {
        let dispatcher = Arc::new(CommandDispatcher::new(
            shared.simulation.clone(),
            config.simulation_timeout(),
            shared.pipeline.reporter.clone(),
        ));
        let commands = dispatcher.spawn_worker(shared.pipeline.queue.capacity());

        let now = Instant::now();
        let slots = shared
            .adapters
            .iter()
            .map(|adapter| AdapterSlot {
                adapter: adapter.clone(),
                inflight: None,
                next_reconnect: now,
            })
            .collect();

        Self {
            config,
            shared,
            commands,
            sim_sync: None,
            next_sim_attempt: now,
            slots,
            tick: 0,
        }
    }

    /// Tick until `shutdown` flips to true, then tear down in order.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_ms = self.config.tick_interval_ms,
            batch_limit = self.config.batch_limit(),
            adapters = self.slots.len(),
            "Tick scheduler started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            // A started tick always runs to completion
            let outcome = AssertUnwindSafe(self.tick_once()).catch_unwind().await;

            match outcome {
                Ok(summary) => {
                    if summary.drained > 0 || summary.skipped > 0 {
                        debug!(?summary, "Tick complete");
                    }
                }
                Err(panic) => {
                    self.shared
                        .pipeline
                        .reporter
                        .report_fault(format!("tick {} faulted: {}", self.tick, panic_message(&*panic)));
                    warn!(pause_ms = self.config.fault_pause_ms, "Pausing after tick fault");

                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = sleep(self.config.fault_pause()) => {}
                    }
                    ticker.reset();
                }
            }
        }

        self.teardown().await;
    }

    /// One drain-merge-sync-snapshot-fanout cycle
    pub async fn tick_once(&mut self) -> TickSummary {
        self.tick += 1;
        let mut summary = TickSummary {
            tick: self.tick,
            ..TickSummary::default()
        };

        let batch = self
            .shared
            .pipeline
            .queue
            .drain_up_to(self.config.batch_limit());
        for Sequenced { seq, event } in batch {
            summary.drained += 1;
            self.apply(seq, event, &mut summary);
        }

        self.sync_simulation().await;

        let report = self.shared.last_simulation();
        let snapshot = Arc::new(self.shared.pipeline.store.snapshot(
            self.tick,
            report.current_time,
            report.running,
        ));
        self.shared.publish_snapshot(snapshot.clone());

        self.fan_out(snapshot, &mut summary).await;

        self.shared.record_tick();
        summary
    }

    fn apply(&self, seq: u64, event: UpdateEvent, summary: &mut TickSummary) {
        let pipeline = &self.shared.pipeline;
        match event {
            UpdateEvent::StateUpdate { agent_id, patch } => {
                match pipeline.store.merge(&agent_id, seq, &patch) {
                    MergeOutcome::Stale => summary.stale += 1,
                    MergeOutcome::Created | MergeOutcome::Updated => summary.merged += 1,
                }
            }
            UpdateEvent::MissionUpdate {
                agent_id,
                waypoints,
            } => match pipeline.missions.set_mission(&agent_id, waypoints) {
                Ok(_) => summary.missions += 1,
                Err(e) => {
                    pipeline.reporter.report(&e);
                    summary.rejected += 1;
                }
            },
            UpdateEvent::Command(command) => match self.commands.submit(command) {
                Ok(()) => summary.commands += 1,
                Err(e) => {
                    pipeline.reporter.report(&e);
                    summary.rejected += 1;
                }
            },
        }
    }

    /// Harvest a finished sync, then start the next one if none is running.
    ///
    /// Never waits on the collaborator: while a sync is in flight the tick
    /// keeps the last reported simulation data.
    async fn sync_simulation(&mut self) {
        if let Some(handle) = self.sim_sync.take() {
            if !handle.is_finished() {
                self.sim_sync = Some(handle);
                return;
            }
            match handle.await {
                Ok(Ok(report)) => self.shared.set_last_simulation(report),
                Ok(Err(e)) => {
                    self.shared.pipeline.reporter.report(&e);
                    self.next_sim_attempt = Instant::now() + self.config.fault_pause();
                }
                Err(e) => {
                    self.shared
                        .pipeline
                        .reporter
                        .report_fault(format!("simulation sync task failed: {}", e));
                    self.next_sim_attempt = Instant::now() + self.config.fault_pause();
                }
            }
        }

        if Instant::now() < self.next_sim_attempt {
            return;
        }

        let simulation = self.shared.simulation.clone();
        let agents: Vec<AgentState> = self.shared.pipeline.store.states().into_values().collect();
        let limit = self.config.simulation_timeout();

        self.sim_sync = Some(tokio::spawn(async move {
            let step = async {
                if !simulation.is_connected() {
                    simulation.connect().await?;
                }
                simulation.advance(&agents).await
            };
            timeout(limit, step)
                .await
                .map_err(|_| BridgeError::CollaboratorTimeout {
                    operation: "advance".to_string(),
                    timeout_ms: limit.as_millis() as u64,
                })?
        }));
    }

    /// Hand the snapshot to every adapter on its own task.
    async fn fan_out(&mut self, snapshot: Arc<Snapshot>, summary: &mut TickSummary) {
        let now = Instant::now();
        let reporter = &self.shared.pipeline.reporter;

        for slot in &mut self.slots {
            let name = slot.adapter.name().to_string();

            if let Some(handle) = slot.inflight.take() {
                if !handle.is_finished() {
                    debug!(adapter = %name, tick = self.tick, "Previous publish still in flight, skipping");
                    slot.inflight = Some(handle);
                    summary.skipped += 1;
                    continue;
                }
                if let Err(e) = handle.await {
                    reporter.report_fault(format!("adapter '{}' task failed: {}", name, e));
                }
            }

            if slot.adapter.is_connected() {
                let adapter = slot.adapter.clone();
                let reporter = reporter.clone();
                let snapshot = snapshot.clone();
                let limit = self.config.publish_timeout();
                slot.inflight = Some(tokio::spawn(async move {
                    match timeout(limit, adapter.publish(snapshot)).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => reporter.report(&e),
                        Err(_) => reporter.report(&BridgeError::connectivity(
                            adapter.name(),
                            format!("publish timed out after {}ms", limit.as_millis()),
                        )),
                    }
                }));
                summary.published += 1;
            } else if now >= slot.next_reconnect {
                slot.next_reconnect = now + self.config.reconnect_interval();
                let adapter = slot.adapter.clone();
                let reporter = reporter.clone();
                let limit = self.config.reconnect_interval();
                slot.inflight = Some(tokio::spawn(async move {
                    match timeout(limit, adapter.connect()).await {
                        Ok(Ok(())) => info!(adapter = %adapter.name(), "Adapter reconnected"),
                        Ok(Err(e)) => reporter.report(&e),
                        Err(_) => reporter.report(&BridgeError::connectivity(
                            adapter.name(),
                            "connect timed out",
                        )),
                    }
                }));
                summary.reconnecting += 1;
            }
        }
    }

    /// Wait out pending work within the grace period, then release every
    /// adapter exactly once, followed by the collaborator.
    async fn teardown(self) {
        let TickScheduler {
            config,
            shared,
            commands,
            sim_sync,
            slots,
            tick,
            ..
        } = self;

        info!(tick = tick, "Tick scheduler stopping");
        let deadline = Instant::now() + config.shutdown_grace();

        let mut pending: Vec<(String, JoinHandle<()>)> = Vec::new();
        let mut adapters = Vec::with_capacity(slots.len());
        for slot in slots {
            if let Some(handle) = slot.inflight {
                pending.push((slot.adapter.name().to_string(), handle));
            }
            adapters.push(slot.adapter);
        }

        for (name, mut handle) in pending {
            if timeout_at(deadline, &mut handle).await.is_err() {
                warn!(adapter = %name, "Publish still running at shutdown, aborting");
                handle.abort();
                let _ = handle.await;
            }
        }

        if let Some(mut handle) = sim_sync {
            if timeout_at(deadline, &mut handle).await.is_err() {
                warn!("Simulation sync still running at shutdown, aborting");
                handle.abort();
                let _ = handle.await;
            }
        }

        commands
            .shutdown(deadline.saturating_duration_since(Instant::now()))
            .await;

        for adapter in &adapters {
            adapter.disconnect().await;
            debug!(adapter = %adapter.name(), "Adapter disconnected");
        }
        shared.simulation.disconnect().await;

        shared.set_state(SchedulerState::Stopped);
        info!(ticks = shared.ticks(), "Tick scheduler stopped");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
