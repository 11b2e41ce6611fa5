use super::{SimulationCollaborator, SimulationReport};
use crate::error::{BridgeError, BridgeResult};
use crate::event::Command;
use crate::state::AgentState;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Serialize)]
struct AdvanceRequest<'a> {
    agents: &'a [AgentState],
}

/// Out-of-process simulation engine reached over HTTP JSON.
///
/// Endpoints:
/// - `GET  {url}/health`
/// - `POST {url}/advance`  body `{agents: [...]}` → `{current_time, running}`
/// - `POST {url}/command`  body `{type, ...}`
pub struct RemoteSimulation {
    base_url: String,
    http_client: reqwest::Client,
    connected: AtomicBool,
}

impl RemoteSimulation {
    /// Create a client for `base_url` (e.g. "http://localhost:9000")
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> BridgeResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| BridgeError::Collaborator(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
            connected: AtomicBool::new(false),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Map a transport failure, marking the collaborator disconnected when
    /// the engine is unreachable so the next use retries the connection.
    fn transport_error(&self, operation: &str, err: reqwest::Error) -> BridgeError {
        if err.is_connect() || err.is_timeout() {
            self.connected.store(false, Ordering::SeqCst);
            BridgeError::connectivity(self.name(), format!("{}: {}", operation, err))
        } else {
            BridgeError::Collaborator(format!("{}: {}", operation, err))
        }
    }

    async fn ensure_connected(&self) -> BridgeResult<()> {
        if self.is_connected() {
            return Ok(());
        }
        self.connect().await
    }

    async fn send_command(&self, command: &Command) -> BridgeResult<()> {
        self.ensure_connected().await?;

        debug!(kind = %command.kind(), "Sending command to remote simulation");

        let response = self
            .http_client
            .post(self.url("command"))
            .json(command)
            .send()
            .await
            .map_err(|e| self.transport_error("command", e))?;

        if !response.status().is_success() {
            return Err(BridgeError::Collaborator(format!(
                "command '{}' rejected with status {}",
                command.kind(),
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SimulationCollaborator for RemoteSimulation {
    fn name(&self) -> &str {
        "remote-simulation"
    }

    async fn connect(&self) -> BridgeResult<()> {
        info!(url = %self.base_url, "Connecting to remote simulation");

        let response = self
            .http_client
            .get(self.url("health"))
            .send()
            .await
            .map_err(|e| BridgeError::connectivity(self.name(), e))?;

        if !response.status().is_success() {
            return Err(BridgeError::connectivity(
                self.name(),
                format!("health check returned {}", response.status()),
            ));
        }

        self.connected.store(true, Ordering::SeqCst);
        info!(url = %self.base_url, "Remote simulation connected");
        Ok(())
    }

    async fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            info!(url = %self.base_url, "Remote simulation disconnected");
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn advance(&self, agents: &[AgentState]) -> BridgeResult<SimulationReport> {
        self.ensure_connected().await?;

        let response = self
            .http_client
            .post(self.url("advance"))
            .json(&AdvanceRequest { agents })
            .send()
            .await
            .map_err(|e| self.transport_error("advance", e))?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "Remote simulation rejected advance");
            return Err(BridgeError::Collaborator(format!(
                "advance rejected with status {}",
                response.status()
            )));
        }

        response
            .json::<SimulationReport>()
            .await
            .map_err(|e| BridgeError::Collaborator(format!("invalid advance response: {}", e)))
    }

    async fn start(&self) -> BridgeResult<()> {
        self.send_command(&Command::StartSimulation).await
    }

    async fn stop(&self) -> BridgeResult<()> {
        self.send_command(&Command::StopSimulation).await
    }

    async fn load_mission(&self, path: &str) -> BridgeResult<()> {
        self.send_command(&Command::LoadMission {
            file: path.to_string(),
        })
        .await
    }

    async fn set_parameter(&self, name: &str, value: f64) -> BridgeResult<()> {
        self.send_command(&Command::SetParameter {
            name: name.to_string(),
            value,
        })
        .await
    }
}
