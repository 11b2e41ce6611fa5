use super::{BridgeConfig, SimulationMode};

/// Apply `SIMBRIDGE_*` environment overrides on top of a loaded config.
pub fn apply_env_overrides(config: &mut BridgeConfig) {
    apply_overrides(config, |key| std::env::var(key).ok());
}

/// Apply overrides from an arbitrary lookup. Values that fail to parse, and
/// zero for limits that must be positive, are ignored.
pub fn apply_overrides<F>(config: &mut BridgeConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(n) = parsed(&lookup, "SIMBRIDGE_TICK_INTERVAL_MS") {
        config.scheduler.tick_interval_ms = n;
    }
    if let Some(n) = parsed(&lookup, "SIMBRIDGE_BATCH_LIMIT").filter(|n: &usize| *n > 0) {
        config.scheduler.batch_limit = n;
    }
    if let Some(n) = parsed(&lookup, "SIMBRIDGE_SIMULATION_TIMEOUT_MS").filter(|n: &u64| *n > 0) {
        config.scheduler.simulation_timeout_ms = n;
    }
    if let Some(n) = parsed(&lookup, "SIMBRIDGE_PUBLISH_TIMEOUT_MS").filter(|n: &u64| *n > 0) {
        config.scheduler.publish_timeout_ms = n;
    }
    if let Some(n) = parsed(&lookup, "SIMBRIDGE_QUEUE_CAPACITY") {
        config.queue.capacity = n;
    }
    if let Some(v) = lookup("SIMBRIDGE_SIMULATION_MODE") {
        match v.to_ascii_lowercase().as_str() {
            "local" => config.simulation.mode = SimulationMode::Local,
            "remote" => config.simulation.mode = SimulationMode::Remote,
            _ => {}
        }
    }
    if let Some(v) = lookup("SIMBRIDGE_SIMULATION_URL") {
        config.simulation.url = v;
    }
    if let Some(v) = lookup("SIMBRIDGE_TELEMETRY_BIND") {
        config.telemetry.bind = v;
    }
    if let Some(v) = lookup("SIMBRIDGE_NATS_URL") {
        config.topic_bus.url = v;
    }
    if let Some(v) = lookup("SIMBRIDGE_LIVE_BIND") {
        config.live.bind = v;
    }
    if let Some(v) = lookup("SIMBRIDGE_API_BIND") {
        config.api.bind = v;
    }
}

fn parsed<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key).and_then(|v| v.trim().parse().ok())
}
