pub mod env;
pub use env::{apply_env_overrides, apply_overrides};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// Complete bridge configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub topic_bus: TopicBusConfig,
    #[serde(default)]
    pub push: PushConfig,
    #[serde(default)]
    pub live: LiveConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

/// Tick cadence and time bounds
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Maximum events applied per tick
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,
    /// Bound on every simulation collaborator call
    #[serde(default = "default_simulation_timeout_ms")]
    pub simulation_timeout_ms: u64,
    /// Pause after a faulted tick before ticking resumes
    #[serde(default = "default_fault_pause_ms")]
    pub fault_pause_ms: u64,
    /// Minimum gap between reconnect attempts for a disconnected adapter
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
    /// Bound on one adapter publish; overruns are reported as connectivity faults
    #[serde(default = "default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

fn default_tick_interval_ms() -> u64 {
    100
}

fn default_batch_limit() -> usize {
    10
}

fn default_simulation_timeout_ms() -> u64 {
    2000
}

fn default_fault_pause_ms() -> u64 {
    1000
}

fn default_reconnect_interval_ms() -> u64 {
    2000
}

fn default_publish_timeout_ms() -> u64 {
    1000
}

fn default_shutdown_grace_ms() -> u64 {
    5000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            batch_limit: default_batch_limit(),
            simulation_timeout_ms: default_simulation_timeout_ms(),
            fault_pause_ms: default_fault_pause_ms(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            publish_timeout_ms: default_publish_timeout_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl SchedulerConfig {
    /// Reject values that would stall the pipeline
    pub fn validate(&self) -> Result<()> {
        if self.batch_limit == 0 {
            bail!("scheduler.batch_limit must be at least 1");
        }
        if self.simulation_timeout_ms == 0 {
            bail!("scheduler.simulation_timeout_ms must be at least 1");
        }
        if self.publish_timeout_ms == 0 {
            bail!("scheduler.publish_timeout_ms must be at least 1");
        }
        Ok(())
    }

    /// Events applied per tick, never zero
    pub fn batch_limit(&self) -> usize {
        self.batch_limit.max(1)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn simulation_timeout(&self) -> Duration {
        Duration::from_millis(self.simulation_timeout_ms)
    }

    pub fn fault_pause(&self) -> Duration {
        Duration::from_millis(self.fault_pause_ms)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms.max(1))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
}

fn default_queue_capacity() -> usize {
    1000
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_queue_capacity(),
        }
    }
}

/// Which simulation collaborator to run against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationMode {
    #[default]
    Local,
    Remote,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub mode: SimulationMode,
    /// Base URL of the remote engine
    pub url: String,
    pub request_timeout_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            mode: SimulationMode::Local,
            url: "http://localhost:9000".to_string(),
            request_timeout_ms: 2000,
        }
    }
}

/// UDP endpoint receiving decoded telemetry records
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub bind: String,
    /// Fixed destination for mission dispatch frames. When unset, frames go
    /// to the last address each vehicle sent from.
    pub vehicle_addr: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "0.0.0.0:14550".to_string(),
            vehicle_addr: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TopicBusConfig {
    pub enabled: bool,
    pub url: String,
    pub subject_prefix: String,
    pub command_subject: String,
}

impl Default for TopicBusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: std::env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string()),
            subject_prefix: "drone_sim".to_string(),
            command_subject: "drone_sim.commands".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    pub enabled: bool,
    pub bind: String,
    pub targets: Vec<String>,
    pub topic: String,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "0.0.0.0:0".to_string(),
            targets: vec!["127.0.0.1:5555".to_string()],
            topic: "simulation_update".to_string(),
        }
    }
}

/// WebSocket server for remote viewers
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub enabled: bool,
    pub bind: String,
    /// Frames buffered per viewer before frames are dropped for it
    pub viewer_buffer: usize,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "127.0.0.1:8765".to_string(),
            viewer_buffer: 32,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub bind: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "0.0.0.0:3000".to_string(),
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<BridgeConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path))?;
    let config: BridgeConfig =
        toml::from_str(&contents).with_context(|| format!("Invalid config file {}", path))?;
    config
        .scheduler
        .validate()
        .with_context(|| format!("Invalid config file {}", path))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.scheduler.tick_interval_ms, 100);
        assert_eq!(config.scheduler.batch_limit, 10);
        assert_eq!(config.queue.capacity, 1000);
        assert_eq!(config.simulation.mode, SimulationMode::Local);
        assert_eq!(config.telemetry.bind, "0.0.0.0:14550");
        assert_eq!(config.topic_bus.subject_prefix, "drone_sim");
        assert_eq!(config.push.topic, "simulation_update");
        assert_eq!(config.live.viewer_buffer, 32);
        assert!(config.api.enabled);
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [scheduler]
            tick_interval_ms = 50
            batch_limit = 25

            [queue]
            capacity = 64

            [simulation]
            mode = "remote"
            url = "http://sim.local:9000"

            [telemetry]
            vehicle_addr = "10.0.0.7:14555"

            [push]
            targets = ["10.0.0.2:5555", "10.0.0.3:5555"]

            [live]
            enabled = false
        "#;

        let config: BridgeConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.scheduler.tick_interval_ms, 50);
        assert_eq!(config.scheduler.batch_limit, 25);
        assert_eq!(config.scheduler.fault_pause_ms, 1000);
        assert_eq!(config.queue.capacity, 64);
        assert_eq!(config.simulation.mode, SimulationMode::Remote);
        assert_eq!(config.simulation.url, "http://sim.local:9000");
        assert_eq!(config.simulation.request_timeout_ms, 2000);
        assert_eq!(config.telemetry.vehicle_addr.as_deref(), Some("10.0.0.7:14555"));
        assert!(config.telemetry.enabled);
        assert_eq!(config.push.targets.len(), 2);
        assert!(!config.live.enabled);
        assert_eq!(config.live.bind, "127.0.0.1:8765");
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: BridgeConfig = toml::from_str("[queue]\ncapacity = 5\n").unwrap();
        assert_eq!(config.queue.capacity, 5);
        assert_eq!(config.scheduler.batch_limit, 10);
        assert_eq!(config.api.bind, "0.0.0.0:3000");
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[scheduler]\ntick_interval_ms = 20").unwrap();

        let config = load_config(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.scheduler.tick_interval_ms, 20);
    }

    #[test]
    fn test_load_config_reports_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(load_config(missing.to_str().unwrap()).is_err());

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "[scheduler\ntick").unwrap();
        let err = load_config(bad.to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("Invalid config file"));
    }

    #[test]
    fn test_load_config_rejects_stalling_values() {
        let dir = tempfile::tempdir().unwrap();

        let zero_batch = dir.path().join("zero_batch.toml");
        std::fs::write(&zero_batch, "[scheduler]\nbatch_limit = 0\n").unwrap();
        let err = load_config(zero_batch.to_str().unwrap()).unwrap_err();
        assert!(format!("{:#}", err).contains("batch_limit"));

        let zero_timeout = dir.path().join("zero_timeout.toml");
        std::fs::write(&zero_timeout, "[scheduler]\nsimulation_timeout_ms = 0\n").unwrap();
        let err = load_config(zero_timeout.to_str().unwrap()).unwrap_err();
        assert!(format!("{:#}", err).contains("simulation_timeout_ms"));
    }

    #[test]
    fn test_batch_limit_never_zero() {
        let config = SchedulerConfig {
            batch_limit: 0,
            ..SchedulerConfig::default()
        };
        assert!(config.validate().is_err());
        assert_eq!(config.batch_limit(), 1);
        assert!(SchedulerConfig::default().validate().is_ok());
    }
}
