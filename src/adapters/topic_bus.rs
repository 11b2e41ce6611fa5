//! Topic bus adapter over NATS core pub/sub.
//!
//! Publishes per tick:
//! - `{prefix}.state`: the full snapshot
//! - `{prefix}.{agent}.path`: a single-pose path per agent
//!
//! Subscribes to the command subject and feeds commands into the queue.

use super::{CommandSource, Ingress, TransportAdapter};
use crate::config::TopicBusConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::state::{AgentState, Snapshot};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Serialize)]
pub struct PathRecord {
    pub header: Header,
    pub poses: Vec<PoseStamped>,
}

#[derive(Debug, Serialize)]
pub struct Header {
    pub frame_id: &'static str,
    pub stamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct PoseStamped {
    pub header: Header,
    pub pose: Pose,
}

#[derive(Debug, Serialize)]
pub struct Pose {
    pub position: Point,
    pub orientation: Quaternion,
}

#[derive(Debug, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Serialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl PathRecord {
    /// One-pose path at the agent's current position, identity orientation
    pub fn for_agent(agent: &AgentState, stamp: DateTime<Utc>) -> Self {
        let [x, y, z] = agent.position;
        Self {
            header: Header {
                frame_id: "map",
                stamp,
            },
            poses: vec![PoseStamped {
                header: Header {
                    frame_id: "map",
                    stamp,
                },
                pose: Pose {
                    position: Point { x, y, z },
                    orientation: Quaternion {
                        x: 0.0,
                        y: 0.0,
                        z: 0.0,
                        w: 1.0,
                    },
                },
            }],
        }
    }
}

/// Replace characters that carry meaning in a subject
pub fn subject_token(agent_id: &str) -> String {
    agent_id
        .chars()
        .map(|c| match c {
            '.' | '*' | '>' => '_',
            other => other,
        })
        .collect()
}

pub struct TopicBusAdapter {
    config: TopicBusConfig,
    ingress: Ingress,
    client: Mutex<Option<async_nats::Client>>,
    subscriber: Mutex<Option<JoinHandle<()>>>,
    connected: Arc<AtomicBool>,
}

impl TopicBusAdapter {
    pub fn new(config: TopicBusConfig, ingress: Ingress) -> Self {
        Self {
            config,
            ingress,
            client: Mutex::new(None),
            subscriber: Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state_subject(&self) -> String {
        format!("{}.state", self.config.subject_prefix)
    }

    pub fn path_subject(&self, agent_id: &str) -> String {
        format!("{}.{}.path", self.config.subject_prefix, subject_token(agent_id))
    }

    fn current_client(&self) -> Option<async_nats::Client> {
        self.client
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    async fn send(&self, client: &async_nats::Client, subject: String, payload: Vec<u8>) -> BridgeResult<()> {
        client
            .publish(subject.clone(), payload.into())
            .await
            .map_err(|e| {
                self.connected.store(false, Ordering::SeqCst);
                BridgeError::connectivity(self.name(), format!("publish to '{}': {}", subject, e))
            })
    }
}

impl CommandSource for TopicBusAdapter {
    fn receive_command(&self, payload: &[u8]) -> BridgeResult<u64> {
        self.ingress.push_command(payload)
    }
}

#[async_trait]
impl TransportAdapter for TopicBusAdapter {
    fn name(&self) -> &str {
        "topic_bus"
    }

    async fn connect(&self) -> BridgeResult<()> {
        info!("Connecting to NATS at {}", self.config.url);

        let client = async_nats::connect(&self.config.url)
            .await
            .map_err(|e| BridgeError::connectivity(self.name(), e))?;

        let mut commands = client
            .subscribe(self.config.command_subject.clone())
            .await
            .map_err(|e| BridgeError::connectivity(self.name(), format!("subscribe: {}", e)))?;

        let ingress = self.ingress.clone();
        let connected = self.connected.clone();
        let subject = self.config.command_subject.clone();
        let handle = tokio::spawn(async move {
            info!(subject = %subject, "Listening for commands");
            while let Some(message) = commands.next().await {
                // Rejections are reported by the ingress
                if let Ok(seq) = ingress.push_command(&message.payload) {
                    debug!(seq = seq, "Command received from topic bus");
                }
            }
            warn!(subject = %subject, "Command subscription ended");
            connected.store(false, Ordering::SeqCst);
        });

        *self
            .client
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(client);
        if let Some(old) = self
            .subscriber
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .replace(handle)
        {
            old.abort();
        }
        self.connected.store(true, Ordering::SeqCst);
        info!("Connected to NATS");
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(handle) = self
            .subscriber
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            handle.abort();
        }
        let client = self
            .client
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(client) = client {
            if let Err(e) = client.flush().await {
                debug!(error = %e, "Flush on disconnect failed");
            }
        }
        info!("Topic bus disconnected");
    }

    async fn publish(&self, snapshot: Arc<Snapshot>) -> BridgeResult<()> {
        let client = self
            .current_client()
            .ok_or_else(|| BridgeError::connectivity(self.name(), "not connected"))?;

        let state = serde_json::to_vec(snapshot.as_ref())
            .map_err(|e| BridgeError::Collaborator(format!("encode state record: {}", e)))?;
        self.send(&client, self.state_subject(), state).await?;

        for (agent_id, agent) in &snapshot.agents {
            let path = PathRecord::for_agent(agent, snapshot.created_at);
            let payload = serde_json::to_vec(&path)
                .map_err(|e| BridgeError::Collaborator(format!("encode path record: {}", e)))?;
            self.send(&client, self.path_subject(agent_id), payload).await?;
        }

        debug!(tick = snapshot.tick, agents = snapshot.agent_count(), "Published to topic bus");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
