//! Scripted collaborators and adapters shared by unit tests.

use crate::adapters::TransportAdapter;
use crate::error::{BridgeError, BridgeResult};
use crate::simulation::{SimulationCollaborator, SimulationReport};
use crate::state::{AgentState, Snapshot};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Simulation double with a configurable delay, connect refusal and a
/// log of executed command verbs.
pub struct ScriptedSimulation {
    connected: AtomicBool,
    refuse_connect: AtomicBool,
    fail_advance: AtomicBool,
    delay_ms: AtomicU64,
    attempts: AtomicU64,
    advances: AtomicU64,
    commands: Mutex<Vec<String>>,
    clock: Mutex<f64>,
}

impl ScriptedSimulation {
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            refuse_connect: AtomicBool::new(false),
            fail_advance: AtomicBool::new(false),
            delay_ms: AtomicU64::new(0),
            attempts: AtomicU64::new(0),
            advances: AtomicU64::new(0),
            commands: Mutex::new(Vec::new()),
            clock: Mutex::new(0.0),
        }
    }

    pub fn set_refuse_connect(&self, refuse: bool) {
        self.refuse_connect.store(refuse, Ordering::SeqCst);
    }

    pub fn set_fail_advance(&self, fail: bool) {
        self.fail_advance.store(fail, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    /// Successful advances
    pub fn advances(&self) -> u64 {
        self.advances.load(Ordering::SeqCst)
    }

    /// Every advance call, failed or not
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        let ms = self.delay_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    async fn record(&self, verb: &str) -> BridgeResult<()> {
        self.pause().await;
        if !self.is_connected() {
            return Err(BridgeError::connectivity("scripted", "not connected"));
        }
        self.commands.lock().unwrap().push(verb.to_string());
        Ok(())
    }
}

#[async_trait]
impl SimulationCollaborator for ScriptedSimulation {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn connect(&self) -> BridgeResult<()> {
        if self.refuse_connect.load(Ordering::SeqCst) {
            return Err(BridgeError::connectivity("scripted", "connection refused"));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn advance(&self, _agents: &[AgentState]) -> BridgeResult<SimulationReport> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.fail_advance.load(Ordering::SeqCst) {
            return Err(BridgeError::Collaborator("advance failed".to_string()));
        }
        let n = self.advances.fetch_add(1, Ordering::SeqCst) + 1;
        let mut clock = self.clock.lock().unwrap();
        *clock = n as f64 * 0.1;
        Ok(SimulationReport {
            current_time: *clock,
            running: true,
        })
    }

    async fn start(&self) -> BridgeResult<()> {
        self.record("start").await
    }

    async fn stop(&self) -> BridgeResult<()> {
        self.record("stop").await
    }

    async fn load_mission(&self, _path: &str) -> BridgeResult<()> {
        self.record("load_mission").await
    }

    async fn set_parameter(&self, _name: &str, _value: f64) -> BridgeResult<()> {
        self.record("set_parameter").await
    }
}

/// What a test adapter should do with each publish
#[derive(Clone, Copy, PartialEq)]
pub enum Behaviour {
    Record,
    /// Publish never completes within a test's lifetime
    Hang,
    /// Publish returns a connectivity error
    Fail,
    /// Connect is refused, so the adapter stays disconnected
    Refuse,
    /// `is_connected` panics the first time it is called
    PanicOnce,
}

/// Configurable transport adapter that forwards published tick numbers
/// to a channel.
pub struct TestAdapter {
    name: String,
    behaviour: Behaviour,
    connected: AtomicBool,
    panicked: AtomicBool,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    published: mpsc::UnboundedSender<u64>,
}

impl TestAdapter {
    pub fn new(
        name: &str,
        behaviour: Behaviour,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<u64>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let adapter = Arc::new(Self {
            name: name.to_string(),
            behaviour,
            connected: AtomicBool::new(false),
            panicked: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
            published: tx,
        });
        (adapter, rx)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportAdapter for TestAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> BridgeResult<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.behaviour == Behaviour::Refuse {
            return Err(BridgeError::connectivity(&self.name, "connection refused"));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        if self.behaviour == Behaviour::PanicOnce && !self.panicked.swap(true, Ordering::SeqCst) {
            panic!("adapter status probe exploded");
        }
        self.connected.load(Ordering::SeqCst)
    }

    async fn publish(&self, snapshot: Arc<Snapshot>) -> BridgeResult<()> {
        match self.behaviour {
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
            Behaviour::Fail => Err(BridgeError::connectivity(&self.name, "socket backlog")),
            _ => {
                let _ = self.published.send(snapshot.tick);
                Ok(())
            }
        }
    }
}
