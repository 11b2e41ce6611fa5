//! Command dispatcher - routes control commands to the simulation collaborator.
//!
//! The tick hands commands to a dedicated worker task so a slow collaborator
//! never stalls ticking. The worker executes commands one at a time, in
//! arrival order, each bounded by the collaborator timeout.

use crate::error::{BridgeError, BridgeResult, ErrorReporter};
use crate::event::Command;
use crate::simulation::SimulationCollaborator;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

pub struct CommandDispatcher {
    simulation: Arc<dyn SimulationCollaborator>,
    call_timeout: Duration,
    reporter: Arc<ErrorReporter>,
    executed: AtomicU64,
}

impl CommandDispatcher {
    pub fn new(
        simulation: Arc<dyn SimulationCollaborator>,
        call_timeout: Duration,
        reporter: Arc<ErrorReporter>,
    ) -> Self {
        Self {
            simulation,
            call_timeout,
            reporter,
            executed: AtomicU64::new(0),
        }
    }

    /// Execute one command against the collaborator.
    ///
    /// Unknown kinds fail with `UnknownCommand`. A disconnected collaborator
    /// gets one reconnect attempt before the command fails with
    /// `Connectivity`.
    pub async fn dispatch(&self, command: &Command) -> BridgeResult<()> {
        if let Command::Unrecognized { kind } = command {
            return Err(BridgeError::UnknownCommand(kind.clone()));
        }

        if !self.simulation.is_connected() {
            debug!(kind = %command.kind(), "Collaborator disconnected, retrying connection");
            timeout(self.call_timeout, self.simulation.connect())
                .await
                .map_err(|_| self.timeout_error("connect"))??;
        }

        timeout(self.call_timeout, self.execute(command))
            .await
            .map_err(|_| self.timeout_error(command.kind()))??;

        self.executed.fetch_add(1, Ordering::Relaxed);
        info!(kind = %command.kind(), "Command dispatched");
        Ok(())
    }

    async fn execute(&self, command: &Command) -> BridgeResult<()> {
        match command {
            Command::StartSimulation => self.simulation.start().await,
            Command::StopSimulation => self.simulation.stop().await,
            Command::LoadMission { file } => self.simulation.load_mission(file).await,
            Command::SetParameter { name, value } => {
                self.simulation.set_parameter(name, *value).await
            }
            Command::Unrecognized { kind } => Err(BridgeError::UnknownCommand(kind.clone())),
        }
    }

    fn timeout_error(&self, operation: &str) -> BridgeError {
        BridgeError::CollaboratorTimeout {
            operation: operation.to_string(),
            timeout_ms: self.call_timeout.as_millis() as u64,
        }
    }

    /// Commands successfully executed so far
    pub fn executed(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }

    /// Spawn the sequential worker that executes submitted commands
    pub fn spawn_worker(self: Arc<Self>, capacity: usize) -> CommandWorker {
        let (tx, mut rx) = mpsc::channel::<Command>(capacity.max(1));
        let dispatcher = self;

        let handle = tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                if let Err(e) = dispatcher.dispatch(&command).await {
                    dispatcher.reporter.report(&e);
                }
            }
            debug!("Command worker finished");
        });

        CommandWorker { tx, handle }
    }
}

/// Handle to the command worker task
pub struct CommandWorker {
    tx: mpsc::Sender<Command>,
    handle: JoinHandle<()>,
}

impl CommandWorker {
    /// Hand a command to the worker without waiting for it to run
    pub fn submit(&self, command: Command) -> BridgeResult<()> {
        self.tx.try_send(command).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => BridgeError::Overflow {
                capacity: self.tx.max_capacity(),
            },
            mpsc::error::TrySendError::Closed(_) => {
                BridgeError::Lifecycle("command worker stopped".to_string())
            }
        })
    }

    /// Let queued commands finish, bounded by `grace`, then stop the worker
    pub async fn shutdown(self, grace: Duration) {
        let CommandWorker { tx, mut handle } = self;
        drop(tx);
        if timeout(grace, &mut handle).await.is_err() {
            warn!("Command worker did not finish within grace period, aborting");
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::simulation::LocalSimulation;
    use crate::test_support::ScriptedSimulation;

    fn dispatcher_with(sim: Arc<dyn SimulationCollaborator>, ms: u64) -> CommandDispatcher {
        CommandDispatcher::new(sim, Duration::from_millis(ms), Arc::new(ErrorReporter::new()))
    }

    #[tokio::test]
    async fn test_dispatch_known_commands() {
        let sim = Arc::new(LocalSimulation::new());
        sim.connect().await.unwrap();
        let dispatcher = dispatcher_with(sim.clone(), 1000);

        dispatcher.dispatch(&Command::StartSimulation).await.unwrap();
        assert!(sim.is_running());

        dispatcher
            .dispatch(&Command::LoadMission {
                file: "qgc/mission.plan".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(sim.mission_file().as_deref(), Some("qgc/mission.plan"));

        dispatcher
            .dispatch(&Command::SetParameter {
                name: "safety_distance".to_string(),
                value: 6.0,
            })
            .await
            .unwrap();
        assert_eq!(sim.parameter("safety_distance"), Some(6.0));

        dispatcher.dispatch(&Command::StopSimulation).await.unwrap();
        assert!(!sim.is_running());
        assert_eq!(dispatcher.executed(), 4);
    }

    #[tokio::test]
    async fn test_unknown_command_reported_not_executed() {
        let sim = Arc::new(ScriptedSimulation::new());
        let dispatcher = dispatcher_with(sim.clone(), 1000);

        let err = dispatcher
            .dispatch(&Command::Unrecognized {
                kind: "barrel_roll".to_string(),
            })
            .await
            .unwrap_err();

        assert_eq!(err, BridgeError::UnknownCommand("barrel_roll".to_string()));
        assert!(sim.commands().is_empty());
    }

    #[tokio::test]
    async fn test_disconnected_collaborator_reconnects_lazily() {
        let sim = Arc::new(LocalSimulation::new());
        let dispatcher = dispatcher_with(sim.clone(), 1000);

        dispatcher.dispatch(&Command::StartSimulation).await.unwrap();
        assert!(sim.is_connected());
        assert!(sim.is_running());
    }

    #[tokio::test]
    async fn test_unreachable_collaborator_is_connectivity_error() {
        let sim = Arc::new(ScriptedSimulation::new());
        sim.set_refuse_connect(true);
        let dispatcher = dispatcher_with(sim.clone(), 1000);

        let err = dispatcher.dispatch(&Command::StartSimulation).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connectivity);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_collaborator_times_out() {
        let sim = Arc::new(ScriptedSimulation::new());
        sim.connect().await.unwrap();
        sim.set_delay(Duration::from_secs(10));
        let dispatcher = dispatcher_with(sim.clone(), 100);

        let err = dispatcher.dispatch(&Command::StopSimulation).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CollaboratorTimeout);
    }

    #[tokio::test]
    async fn test_worker_preserves_order_and_reports_failures() {
        let sim = Arc::new(ScriptedSimulation::new());
        sim.connect().await.unwrap();
        let reporter = Arc::new(ErrorReporter::new());
        let dispatcher = Arc::new(CommandDispatcher::new(
            sim.clone(),
            Duration::from_secs(1),
            reporter.clone(),
        ));

        let worker = dispatcher.spawn_worker(8);
        worker.submit(Command::StartSimulation).unwrap();
        worker
            .submit(Command::Unrecognized {
                kind: "warp".to_string(),
            })
            .unwrap();
        worker.submit(Command::StopSimulation).unwrap();
        worker.shutdown(Duration::from_secs(5)).await;

        assert_eq!(sim.commands(), vec!["start", "stop"]);
        assert_eq!(reporter.count(ErrorKind::UnknownCommand), 1);
    }
}
