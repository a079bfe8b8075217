#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use execution_tracker::client::{ActiveExecution, ExecutionStatus, LivenessReport, ProgressPayload, StepUpdate};
use execution_tracker::config::{StoreConfig, TrackerConfig};
use execution_tracker::tracker::{
    Authority, ExecutionHandle, HandleStore, LivenessVerifier, MemoryStore, Severity, SideEffects,
    StepCatalog, StepStatus, Tracker, TrackerError, TrackerParts,
};
use execution_tracker::transport::{
    Subscription, SubscriptionSender, Transport, TransportFailure, TransportItem,
};
use serde_json::Value;
use tempfile::TempDir;

pub fn create_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

pub fn write_config(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("tracker.yaml");
    fs::write(&path, content).expect("Failed to write tracker.yaml");
    path
}

pub fn catalog() -> StepCatalog {
    StepCatalog::from_pairs([
        ("prepare", "Prepare environment"),
        ("run_tests", "Run tests"),
        ("report", "Write report"),
    ])
}

pub fn test_config() -> TrackerConfig {
    TrackerConfig {
        store: StoreConfig::Memory,
        steps: catalog(),
        ..TrackerConfig::default()
    }
}

pub fn running(steps: Vec<StepUpdate>) -> TransportItem {
    TransportItem::Event(ProgressPayload::new(ExecutionStatus::Running, steps))
}

pub fn finished(status: ExecutionStatus, steps: Vec<StepUpdate>) -> TransportItem {
    TransportItem::Event(ProgressPayload::new(status, steps))
}

pub fn failed(failure: TransportFailure) -> TransportItem {
    TransportItem::Failed(failure)
}

pub fn step(name: &str, status: StepStatus) -> StepUpdate {
    StepUpdate::new(name, status)
}

/// Transport whose items are pushed by the test
#[derive(Default)]
pub struct ScriptedTransport {
    senders: Mutex<Vec<SubscriptionSender>>,
    opened: Mutex<Vec<ExecutionHandle>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn opened(&self) -> Vec<ExecutionHandle> {
        self.opened.lock().unwrap().clone()
    }

    /// Sender of the most recently opened subscription
    pub fn sender(&self) -> SubscriptionSender {
        self.senders
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no subscription opened")
    }

    /// Drop every sender so open streams end without a failure item
    pub fn hang_up(&self) {
        self.senders.lock().unwrap().clear();
    }

    pub async fn push(&self, item: TransportItem) -> bool {
        self.sender().send(item).await
    }
}

impl Transport for ScriptedTransport {
    fn open(&self, handle: &ExecutionHandle) -> Subscription {
        let (sender, subscription) = Subscription::channel();
        self.senders.lock().unwrap().push(sender);
        self.opened.lock().unwrap().push(handle.clone());
        subscription
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Notify(String, Severity),
    Invalidate(Vec<String>),
    Navigate(String, Option<Value>),
}

#[derive(Default)]
pub struct RecordingEffects {
    effects: Mutex<Vec<Effect>>,
}

impl RecordingEffects {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn all(&self) -> Vec<Effect> {
        self.effects.lock().unwrap().clone()
    }

    pub fn notifications(&self) -> Vec<(String, Severity)> {
        self.all()
            .into_iter()
            .filter_map(|e| match e {
                Effect::Notify(message, severity) => Some((message, severity)),
                _ => None,
            })
            .collect()
    }

    pub fn navigations(&self) -> Vec<(String, Option<Value>)> {
        self.all()
            .into_iter()
            .filter_map(|e| match e {
                Effect::Navigate(view, data) => Some((view, data)),
                _ => None,
            })
            .collect()
    }
}

impl SideEffects for RecordingEffects {
    fn notify(&self, message: &str, severity: Severity) {
        self.effects
            .lock()
            .unwrap()
            .push(Effect::Notify(message.to_string(), severity));
    }

    fn invalidate(&self, keys: &[String]) {
        self.effects
            .lock()
            .unwrap()
            .push(Effect::Invalidate(keys.to_vec()));
    }

    fn navigate(&self, view: &str, data: Option<&Value>) {
        self.effects
            .lock()
            .unwrap()
            .push(Effect::Navigate(view.to_string(), data.cloned()));
    }
}

/// Scripted answer of the authority
#[derive(Debug, Clone)]
pub enum AuthorityReply {
    Active(ActiveExecution),
    Unauthorized,
    Unreachable,
}

/// Scripted answer of the liveness verifier
#[derive(Debug, Clone)]
pub enum LivenessReply {
    Report(LivenessReport),
    Unauthorized,
    Hang,
}

pub struct FakeServer {
    authority: Mutex<AuthorityReply>,
    liveness: Mutex<LivenessReply>,
    pub authority_calls: AtomicUsize,
    pub verify_calls: AtomicUsize,
}

impl FakeServer {
    pub fn new(authority: AuthorityReply, liveness: LivenessReply) -> Arc<Self> {
        Arc::new(Self {
            authority: Mutex::new(authority),
            liveness: Mutex::new(liveness),
            authority_calls: AtomicUsize::new(0),
            verify_calls: AtomicUsize::new(0),
        })
    }

    /// Server with no active execution
    pub fn idle() -> Arc<Self> {
        Self::new(
            AuthorityReply::Active(ActiveExecution::default()),
            LivenessReply::Report(LivenessReport::default()),
        )
    }

    /// Server reporting `id` active and live, with a step snapshot
    pub fn live(id: &str, steps: Vec<StepUpdate>) -> Arc<Self> {
        Self::new(
            AuthorityReply::Active(active_execution(id, steps)),
            LivenessReply::Report(LivenessReport {
                active: true,
                reason: None,
                message: None,
            }),
        )
    }

    pub fn authority_calls(&self) -> usize {
        self.authority_calls.load(Ordering::SeqCst)
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }
}

pub fn active_execution(id: &str, steps: Vec<StepUpdate>) -> ActiveExecution {
    ActiveExecution {
        active: true,
        execution_id: Some(id.to_string()),
        steps: Some(steps),
    }
}

#[async_trait]
impl Authority for FakeServer {
    async fn active_execution(&self) -> Result<ActiveExecution, TrackerError> {
        self.authority_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.authority.lock().unwrap().clone();
        match reply {
            AuthorityReply::Active(active) => Ok(active),
            AuthorityReply::Unauthorized => {
                Err(TrackerError::Authorization("UNAUTHENTICATED".to_string()))
            }
            AuthorityReply::Unreachable => Err(TrackerError::Transport(
                TransportFailure::Connection("connection refused".to_string()),
            )),
        }
    }
}

#[async_trait]
impl LivenessVerifier for FakeServer {
    async fn verify(
        &self,
        _handle: &ExecutionHandle,
        _timeout: Duration,
    ) -> Result<LivenessReport, TrackerError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.liveness.lock().unwrap().clone();
        match reply {
            LivenessReply::Report(report) => Ok(report),
            LivenessReply::Unauthorized => {
                Err(TrackerError::Authorization("FORBIDDEN".to_string()))
            }
            LivenessReply::Hang => std::future::pending().await,
        }
    }
}

/// Collaborators of one tracker under test
pub struct Harness {
    pub transport: Arc<ScriptedTransport>,
    pub server: Arc<FakeServer>,
    pub store: Arc<MemoryStore>,
    pub effects: Arc<RecordingEffects>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_server(FakeServer::idle())
    }

    pub fn with_server(server: Arc<FakeServer>) -> Self {
        Self {
            transport: ScriptedTransport::new(),
            server,
            store: Arc::new(MemoryStore::new()),
            effects: RecordingEffects::new(),
        }
    }

    pub fn persisted(self, id: &str) -> Self {
        self.store.save(&ExecutionHandle::new(id)).unwrap();
        self
    }

    pub fn tracker(&self) -> Tracker {
        self.tracker_with(test_config())
    }

    pub fn tracker_with(&self, config: TrackerConfig) -> Tracker {
        Tracker::new(TrackerParts {
            config,
            transport: self.transport.clone(),
            authority: self.server.clone(),
            verifier: self.server.clone(),
            store: self.store.clone(),
            effects: self.effects.clone(),
        })
    }

    pub fn persisted_handle(&self) -> Option<ExecutionHandle> {
        self.store.load().unwrap()
    }
}
