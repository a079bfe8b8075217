//! Tracker - the single owner of one tracked execution
//!
//! The tracker is an explicit context object: every collaborator is
//! injected, and all inputs (transport items, the deferred reset) are
//! processed one at a time through the reducer in `state.rs`. The view layer
//! observes state through a `watch` channel and never mutates it.

use std::sync::Arc;

use futures::StreamExt;
use serde_json::json;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::effects::{Severity, SideEffects};
use super::guard::CompletionGuard;
use super::recovery::{Authority, LivenessVerifier, RecoveryCoordinator, RecoveryOutcome};
use super::scheduler::{Scheduler, TimerHandle};
use super::state::{
    reduce, Command, ExecutionHandle, Phase, TerminalKind, TrackerEvent, TrackerState,
    DEFAULT_FAILURE_DETAIL, DEFAULT_STOP_REASON,
};
use super::step::{OrderedStepList, StepCatalog};
use super::store::{open_store, HandleStore};
use crate::client::GraphQLClient;
use crate::config::{TrackerConfig, TransportKind};
use crate::transport::{
    PullTransport, PushTransport, StalenessThresholds, Supervised, Transport, TransportFailure,
    TransportItem,
};

pub const COMPLETED_NOTICE: &str = "Execution completed successfully";

/// Collaborators injected into a [`Tracker`]
pub struct TrackerParts {
    pub config: TrackerConfig,
    pub transport: Arc<dyn Transport>,
    pub authority: Arc<dyn Authority>,
    pub verifier: Arc<dyn LivenessVerifier>,
    pub store: Arc<dyn HandleStore>,
    pub effects: Arc<dyn SideEffects>,
}

pub struct Tracker {
    config: TrackerConfig,
    catalog: StepCatalog,
    transport: Arc<dyn Transport>,
    authority: Arc<dyn Authority>,
    verifier: Arc<dyn LivenessVerifier>,
    store: Arc<dyn HandleStore>,
    effects: Arc<dyn SideEffects>,

    state: TrackerState,
    state_tx: watch::Sender<TrackerState>,
    subscription: Option<Supervised>,
    guard: CompletionGuard,
    scheduler: Scheduler,
    navigation: Option<TimerHandle>,
    reset_at: Option<Instant>,
    last_outcome: Option<TerminalKind>,
}

impl Tracker {
    pub fn new(parts: TrackerParts) -> Self {
        let (state_tx, _) = watch::channel(TrackerState::idle());
        Self {
            catalog: parts.config.steps.clone(),
            config: parts.config,
            transport: parts.transport,
            authority: parts.authority,
            verifier: parts.verifier,
            store: parts.store,
            effects: parts.effects,
            state: TrackerState::idle(),
            state_tx,
            subscription: None,
            guard: CompletionGuard::new(),
            scheduler: Scheduler::new(),
            navigation: None,
            reset_at: None,
            last_outcome: None,
        }
    }

    /// Wire a tracker to the GraphQL server named in `config`
    pub fn connect(config: TrackerConfig, effects: Arc<dyn SideEffects>) -> Self {
        let client = Arc::new(GraphQLClient::new(&config.server_url));
        let transport: Arc<dyn Transport> = match config.transport {
            TransportKind::Push => Arc::new(PushTransport::new(&config.server_url)),
            TransportKind::Pull => Arc::new(PullTransport::new(
                client.clone(),
                config.poll_interval,
                config.backoff.clone(),
            )),
        };
        let store: Arc<dyn HandleStore> = Arc::from(open_store(&config.store));

        Self::new(TrackerParts {
            config,
            transport,
            authority: client.clone(),
            verifier: client,
            store,
            effects,
        })
    }

    pub fn state(&self) -> &TrackerState {
        &self.state
    }

    /// Read-only view of the state for the presentation layer
    pub fn subscribe(&self) -> watch::Receiver<TrackerState> {
        self.state_tx.subscribe()
    }

    pub fn catalog(&self) -> &StepCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Begin tracking a freshly triggered execution
    pub fn start(&mut self, handle: impl Into<ExecutionHandle>, initial_steps: OrderedStepList) {
        let handle = handle.into();
        if self.state.phase != Phase::Idle {
            warn!(
                execution_id = %handle,
                phase = %self.state.phase,
                "Tracker is busy, ignoring start"
            );
            return;
        }
        self.guard.reset();
        self.last_outcome = None;
        self.dispatch(TrackerEvent::Start {
            handle,
            steps: initial_steps,
        });
    }

    /// Begin tracking with every catalog step pending
    pub fn start_from_catalog(&mut self, handle: impl Into<ExecutionHandle>) {
        let steps = OrderedStepList::from_catalog(&self.catalog);
        self.start(handle, steps);
    }

    /// Reconcile a persisted execution id with the server. Call once at startup.
    pub async fn recover(&mut self) -> RecoveryOutcome {
        let outcome = RecoveryCoordinator {
            authority: self.authority.as_ref(),
            verifier: self.verifier.as_ref(),
            store: self.store.as_ref(),
            effects: self.effects.as_ref(),
            catalog: &self.catalog,
            verify_timeout: self.config.verify_timeout,
        }
        .recover()
        .await;

        if let RecoveryOutcome::Resume { handle, steps } = &outcome {
            if self.state.phase != Phase::Idle {
                warn!(
                    execution_id = %handle,
                    phase = %self.state.phase,
                    "Tracker is busy, ignoring recovered execution"
                );
                return outcome;
            }
            self.guard.reset();
            self.last_outcome = None;
            self.dispatch(TrackerEvent::Resume {
                handle: handle.clone(),
                steps: steps.clone(),
            });
        }
        outcome
    }

    /// Cancel tracking. Tears everything down before returning.
    pub fn stop(&mut self) {
        info!(
            execution_id = self.execution_id().unwrap_or("none"),
            phase = %self.state.phase,
            "Stopping tracker"
        );
        self.dispatch(TrackerEvent::Stop);
    }

    /// Wait for and process one input.
    ///
    /// Returns `false` when there is nothing left to wait for (idle).
    pub async fn next(&mut self) -> bool {
        if self.subscription.is_none() && self.reset_at.is_none() {
            return false;
        }

        let input = {
            let subscription = &mut self.subscription;
            let reset_at = self.reset_at;
            tokio::select! {
                biased;
                item = next_item(subscription) => Input::Item(item),
                _ = sleep_until(reset_at) => Input::Reset,
            }
        };

        match input {
            Input::Item(Some(TransportItem::Event(payload))) => {
                self.dispatch(TrackerEvent::Progress(payload));
            }
            Input::Item(Some(TransportItem::Failed(failure))) => {
                warn!(
                    execution_id = self.execution_id().unwrap_or("none"),
                    cause = failure.cause(),
                    error = %failure,
                    "Transport failed"
                );
                self.dispatch(TrackerEvent::TransportFailed(failure));
            }
            Input::Item(None) => {
                self.subscription = None;
                if self.state.is_tracking() {
                    self.dispatch(TrackerEvent::TransportFailed(TransportFailure::Closed));
                }
            }
            Input::Reset => {
                self.reset_at = None;
                self.guard.reset();
                self.dispatch(TrackerEvent::Reset);
            }
        }
        true
    }

    /// Process inputs until the tracker is idle again.
    ///
    /// Returns how the last execution ended, if it ended on its own.
    pub async fn run(&mut self) -> Option<TerminalKind> {
        while self.next().await {}
        self.last_outcome
    }

    fn execution_id(&self) -> Option<&str> {
        self.state.handle.as_ref().map(|h| h.as_str())
    }

    fn dispatch(&mut self, event: TrackerEvent) {
        let before = self.state.phase;
        let state = std::mem::take(&mut self.state);
        let (next, commands) = reduce(state, event, &self.catalog);
        self.state = next;

        if before != self.state.phase {
            info!(
                execution_id = self.execution_id().unwrap_or("none"),
                from = %before,
                to = %self.state.phase,
                "Tracker phase changed"
            );
        }

        for command in commands {
            self.execute(command);
        }
        self.state_tx.send_replace(self.state.clone());
    }

    fn execute(&mut self, command: Command) {
        match command {
            Command::Persist(handle) => {
                if let Err(e) = self.store.save(&handle) {
                    warn!(execution_id = %handle, error = %e, "Failed to persist execution id");
                }
            }
            Command::Open { handle, resumed } => {
                self.close_subscription();
                let thresholds = StalenessThresholds::from_config(&self.config.staleness, resumed);
                info!(
                    execution_id = %handle,
                    transport = self.transport.name(),
                    resumed,
                    initial_timeout_ms = thresholds.initial.as_millis() as u64,
                    "Opening progress transport"
                );
                let subscription = self.transport.open(&handle);
                self.subscription = Some(Supervised::new(subscription, thresholds));
            }
            Command::Finalize { kind, detail } => self.finalize(kind, detail),
            Command::Teardown => self.teardown(),
        }
    }

    /// Run the terminal side effects; only the first caller gets through.
    fn finalize(&mut self, kind: TerminalKind, detail: Option<String>) {
        if !self.guard.try_acquire() {
            debug!(%kind, "Execution already finalized, ignoring");
            return;
        }

        self.close_subscription();
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear persisted execution id");
        }
        info!(
            execution_id = self.execution_id().unwrap_or("none"),
            %kind,
            detail = detail.as_deref().unwrap_or(""),
            "Execution finished"
        );

        match kind {
            TerminalKind::Completed => {
                self.effects.notify(COMPLETED_NOTICE, Severity::Success);
                self.effects.invalidate(&self.config.completion.invalidate);

                let effects = self.effects.clone();
                let view = self.config.completion.navigate_to.clone();
                let data = self
                    .state
                    .handle
                    .as_ref()
                    .map(|h| json!({ "executionId": h.as_str() }));
                self.navigation = Some(self.scheduler.schedule_after(
                    self.config.completion.navigate_delay,
                    move || effects.navigate(&view, data.as_ref()),
                ));
            }
            TerminalKind::Stopped => {
                let reason = detail.as_deref().unwrap_or(DEFAULT_STOP_REASON);
                self.effects
                    .notify(&format!("Execution stopped: {}", reason), Severity::Warning);
            }
            TerminalKind::Failed => {
                let cause = detail.as_deref().unwrap_or(DEFAULT_FAILURE_DETAIL);
                self.effects
                    .notify(&format!("Execution failed: {}", cause), Severity::Error);
            }
        }

        self.last_outcome = Some(kind);
        self.reset_at = Some(Instant::now() + self.config.completion.reset_delay);
    }

    fn teardown(&mut self) {
        self.close_subscription();
        if let Some(mut navigation) = self.navigation.take() {
            navigation.cancel();
        }
        self.reset_at = None;
        self.guard.reset();
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear persisted execution id");
        }
    }

    fn close_subscription(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.close();
        }
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        self.close_subscription();
    }
}

enum Input {
    Item(Option<TransportItem>),
    Reset,
}

async fn next_item(subscription: &mut Option<Supervised>) -> Option<TransportItem> {
    match subscription {
        Some(subscription) => subscription.next().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
