use anyhow::{Context, Result};
use simbridge::adapters::{
    LiveChannelAdapter, PushSocketAdapter, TelemetryAdapter, TopicBusAdapter, TransportAdapter,
};
use simbridge::config::{apply_env_overrides, load_config, BridgeConfig, SimulationMode};
use simbridge::scheduler::Pipeline;
use simbridge::simulation::{LocalSimulation, RemoteSimulation, SimulationCollaborator};
use simbridge::Bridge;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "simbridge=info".into()),
        )
        .init();

    info!("Simbridge starting...");

    let mut config = match std::env::var("SIMBRIDGE_CONFIG") {
        Ok(path) => {
            info!(path = %path, "Loading configuration file");
            load_config(&path)?
        }
        Err(_) => BridgeConfig::default(),
    };
    apply_env_overrides(&mut config);
    config
        .scheduler
        .validate()
        .context("Invalid scheduler configuration")?;

    info!(
        tick_interval_ms = config.scheduler.tick_interval_ms,
        batch_limit = config.scheduler.batch_limit,
        queue_capacity = config.queue.capacity,
        simulation = ?config.simulation.mode,
        "Configuration loaded"
    );

    let simulation: Arc<dyn SimulationCollaborator> = match config.simulation.mode {
        SimulationMode::Local => Arc::new(LocalSimulation::new()),
        SimulationMode::Remote => Arc::new(
            RemoteSimulation::new(
                config.simulation.url.clone(),
                Duration::from_millis(config.simulation.request_timeout_ms),
            )
            .context("Failed to create remote simulation client")?,
        ),
    };

    let pipeline = Pipeline::new(config.queue.capacity);
    let adapters = build_adapters(&config, &pipeline);

    let bridge = Arc::new(Bridge::new(
        config.scheduler.clone(),
        pipeline,
        simulation,
        adapters,
    ));
    bridge.start().await?;

    let server_handle = if config.api.enabled {
        let router = simbridge::api::create_router(bridge.clone());
        let listener = tokio::net::TcpListener::bind(&config.api.bind)
            .await
            .with_context(|| format!("Failed to bind API address {}", config.api.bind))?;
        info!(bind = %config.api.bind, "HTTP API listening");

        Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                tracing::error!(error = %e, "HTTP API server error");
            }
        }))
    } else {
        None
    };

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    if let Some(handle) = server_handle {
        handle.abort();
    }
    bridge.stop().await;
    info!("Simbridge stopped");

    Ok(())
}

fn build_adapters(config: &BridgeConfig, pipeline: &Pipeline) -> Vec<Arc<dyn TransportAdapter>> {
    let mut adapters: Vec<Arc<dyn TransportAdapter>> = Vec::new();

    if config.telemetry.enabled {
        adapters.push(Arc::new(TelemetryAdapter::new(
            config.telemetry.clone(),
            pipeline.ingress(),
            pipeline.missions.clone(),
        )));
    }
    if config.topic_bus.enabled {
        adapters.push(Arc::new(TopicBusAdapter::new(
            config.topic_bus.clone(),
            pipeline.ingress(),
        )));
    }
    if config.push.enabled {
        adapters.push(Arc::new(PushSocketAdapter::new(config.push.clone())));
    }
    if config.live.enabled {
        adapters.push(Arc::new(LiveChannelAdapter::new(config.live.clone())));
    }

    info!(count = adapters.len(), "Transport adapters configured");
    adapters
}
