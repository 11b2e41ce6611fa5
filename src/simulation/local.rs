use super::{SimulationCollaborator, SimulationReport};
use crate::error::{BridgeError, BridgeResult};
use crate::state::AgentState;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::time::Instant;
use tracing::info;

struct LocalState {
    current_time: f64,
    running: bool,
    last_step: Option<Instant>,
    parameters: HashMap<String, f64>,
    mission_file: Option<String>,
    tracked_agents: usize,
}

/// In-process simulation clock.
///
/// Time advances with the wall clock while running. Used when no external
/// engine is configured and as the default collaborator in tests.
pub struct LocalSimulation {
    state: Mutex<LocalState>,
    connected: AtomicBool,
}

impl LocalSimulation {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LocalState {
                current_time: 0.0,
                running: false,
                last_step: None,
                parameters: HashMap::new(),
                mission_file: None,
                tracked_agents: 0,
            }),
            connected: AtomicBool::new(false),
        }
    }

    pub fn parameter(&self, name: &str) -> Option<f64> {
        self.lock().parameters.get(name).copied()
    }

    pub fn mission_file(&self) -> Option<String> {
        self.lock().mission_file.clone()
    }

    pub fn tracked_agents(&self) -> usize {
        self.lock().tracked_agents
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LocalState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_connected(&self) -> BridgeResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(BridgeError::connectivity("local-simulation", "not connected"))
        }
    }
}

impl Default for LocalSimulation {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SimulationCollaborator for LocalSimulation {
    fn name(&self) -> &str {
        "local-simulation"
    }

    async fn connect(&self) -> BridgeResult<()> {
        self.connected.store(true, Ordering::SeqCst);
        info!("Local simulation attached");
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        info!("Local simulation detached");
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn advance(&self, agents: &[AgentState]) -> BridgeResult<SimulationReport> {
        self.ensure_connected()?;
        let now = Instant::now();
        let mut state = self.lock();

        if state.running {
            if let Some(last) = state.last_step {
                state.current_time += now.duration_since(last).as_secs_f64();
            }
        }
        state.last_step = Some(now);
        state.tracked_agents = agents.len();

        Ok(SimulationReport {
            current_time: state.current_time,
            running: state.running,
        })
    }

    async fn start(&self) -> BridgeResult<()> {
        self.ensure_connected()?;
        let mut state = self.lock();
        state.running = true;
        state.last_step = Some(Instant::now());
        info!("Local simulation started");
        Ok(())
    }

    async fn stop(&self) -> BridgeResult<()> {
        self.ensure_connected()?;
        self.lock().running = false;
        info!("Local simulation stopped");
        Ok(())
    }

    async fn load_mission(&self, path: &str) -> BridgeResult<()> {
        self.ensure_connected()?;
        self.lock().mission_file = Some(path.to_string());
        info!(path = %path, "Local simulation loaded mission file");
        Ok(())
    }

    async fn set_parameter(&self, name: &str, value: f64) -> BridgeResult<()> {
        self.ensure_connected()?;
        self.lock().parameters.insert(name.to_string(), value);
        info!(name = %name, value = value, "Local simulation parameter set");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_requires_connection() {
        let sim = LocalSimulation::new();
        let err = sim.start().await.unwrap_err();
        assert!(matches!(err, BridgeError::Connectivity { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_advances_only_while_running() {
        let sim = LocalSimulation::new();
        sim.connect().await.unwrap();

        let report = sim.advance(&[]).await.unwrap();
        assert_eq!(report.current_time, 0.0);
        assert!(!report.running);

        sim.start().await.unwrap();
        tokio::time::advance(Duration::from_millis(500)).await;
        let report = sim.advance(&[]).await.unwrap();
        assert!(report.running);
        assert!((report.current_time - 0.5).abs() < 1e-6);

        sim.stop().await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;
        let report = sim.advance(&[]).await.unwrap();
        assert!((report.current_time - 0.5).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_parameters_and_mission_file() {
        let sim = LocalSimulation::new();
        sim.connect().await.unwrap();
        sim.set_parameter("safety_distance", 7.5).await.unwrap();
        sim.load_mission("plans/survey.plan").await.unwrap();

        assert_eq!(sim.parameter("safety_distance"), Some(7.5));
        assert_eq!(sim.mission_file().as_deref(), Some("plans/survey.plan"));
    }
}
