//! Execution state machine
//!
//! The tracker's state is advanced by a pure reducer:
//! `(TrackerState, TrackerEvent) -> (TrackerState, Vec<Command>)`.
//! Everything with a side effect (opening transports, persisting the handle,
//! notifications) is described by the returned commands and carried out by
//! the driver.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::merge::merge;
use super::step::{OrderedStepList, StepCatalog, StepStatus, COMPLETED_MESSAGE};
use crate::client::{ExecutionStatus, ProgressPayload};
use crate::transport::TransportFailure;

pub const DEFAULT_STOP_REASON: &str = "The execution was stopped before it finished";
pub const DEFAULT_FAILURE_DETAIL: &str = "The execution failed";

/// Opaque identifier of one workflow run
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionHandle(String);

impl ExecutionHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExecutionHandle {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ExecutionHandle {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// How a tracked execution ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminalKind {
    Completed,
    Stopped,
    Failed,
}

impl TerminalKind {
    fn from_status(status: ExecutionStatus) -> Option<Self> {
        match status {
            ExecutionStatus::Completed => Some(TerminalKind::Completed),
            ExecutionStatus::Stopped => Some(TerminalKind::Stopped),
            ExecutionStatus::Failed => Some(TerminalKind::Failed),
            ExecutionStatus::Pending | ExecutionStatus::Running => None,
        }
    }
}

impl fmt::Display for TerminalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TerminalKind::Completed => "completed",
            TerminalKind::Stopped => "stopped",
            TerminalKind::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "phase", content = "kind", rename_all = "lowercase")]
pub enum Phase {
    /// No execution tracked
    #[default]
    Idle,
    /// Handle set and transport opening; nothing received yet
    Attaching,
    /// At least one progress event applied
    Active,
    /// Finished; later events are discarded
    Terminal(TerminalKind),
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => f.write_str("idle"),
            Phase::Attaching => f.write_str("attaching"),
            Phase::Active => f.write_str("active"),
            Phase::Terminal(kind) => write!(f, "terminal({})", kind),
        }
    }
}

/// Everything the view layer reads about the tracked execution
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrackerState {
    pub handle: Option<ExecutionHandle>,
    pub steps: OrderedStepList,
    pub phase: Phase,
    /// Human readable cause once terminal (failure detail or stop reason)
    pub detail: Option<String>,
}

impl TrackerState {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn terminal_kind(&self) -> Option<TerminalKind> {
        match self.phase {
            Phase::Terminal(kind) => Some(kind),
            _ => None,
        }
    }

    /// Attaching or active
    pub fn is_tracking(&self) -> bool {
        matches!(self.phase, Phase::Attaching | Phase::Active)
    }
}

/// Inputs to the reducer
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    /// A freshly triggered run
    Start {
        handle: ExecutionHandle,
        steps: OrderedStepList,
    },
    /// A run confirmed live during recovery
    Resume {
        handle: ExecutionHandle,
        steps: OrderedStepList,
    },
    Progress(ProgressPayload),
    TransportFailed(TransportFailure),
    /// Explicit cancellation by the user
    Stop,
    /// Deferred reset after finalization
    Reset,
}

/// Side effects requested by the reducer
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Persist(ExecutionHandle),
    Open {
        handle: ExecutionHandle,
        resumed: bool,
    },
    Finalize {
        kind: TerminalKind,
        detail: Option<String>,
    },
    Teardown,
}

/// Advance the state machine by one event.
pub fn reduce(
    state: TrackerState,
    event: TrackerEvent,
    catalog: &StepCatalog,
) -> (TrackerState, Vec<Command>) {
    match event {
        TrackerEvent::Start { handle, steps } => {
            if state.phase != Phase::Idle {
                return (state, Vec::new());
            }
            let next = TrackerState {
                handle: Some(handle.clone()),
                steps,
                phase: Phase::Attaching,
                detail: None,
            };
            let commands = vec![
                Command::Persist(handle.clone()),
                Command::Open {
                    handle,
                    resumed: false,
                },
            ];
            (next, commands)
        }

        TrackerEvent::Resume { handle, steps } => {
            if state.phase != Phase::Idle {
                return (state, Vec::new());
            }
            let next = TrackerState {
                handle: Some(handle.clone()),
                steps,
                phase: Phase::Active,
                detail: None,
            };
            (
                next,
                vec![Command::Open {
                    handle,
                    resumed: true,
                }],
            )
        }

        TrackerEvent::Progress(payload) => {
            if !state.is_tracking() {
                return (state, Vec::new());
            }
            let mut next = TrackerState {
                steps: merge(&state.steps, &payload, catalog),
                phase: Phase::Active,
                ..state
            };

            match TerminalKind::from_status(payload.status) {
                Some(kind) => {
                    let detail = match kind {
                        TerminalKind::Completed => None,
                        TerminalKind::Stopped => Some(
                            payload
                                .stop_reason()
                                .unwrap_or(DEFAULT_STOP_REASON)
                                .to_string(),
                        ),
                        TerminalKind::Failed => Some(
                            payload
                                .error
                                .clone()
                                .unwrap_or_else(|| DEFAULT_FAILURE_DETAIL.to_string()),
                        ),
                    };
                    settle_steps(&mut next.steps, kind, detail.as_deref());
                    next.phase = Phase::Terminal(kind);
                    next.detail = detail.clone();
                    (next, vec![Command::Finalize { kind, detail }])
                }
                None => (next, Vec::new()),
            }
        }

        TrackerEvent::TransportFailed(failure) => {
            if !state.is_tracking() {
                return (state, Vec::new());
            }
            let detail = failure.to_string();
            let mut next = state;
            settle_steps(&mut next.steps, TerminalKind::Failed, Some(&detail));
            next.phase = Phase::Terminal(TerminalKind::Failed);
            next.detail = Some(detail.clone());
            (
                next,
                vec![Command::Finalize {
                    kind: TerminalKind::Failed,
                    detail: Some(detail),
                }],
            )
        }

        TrackerEvent::Stop => (TrackerState::idle(), vec![Command::Teardown]),

        TrackerEvent::Reset => match state.phase {
            Phase::Terminal(_) => (TrackerState::idle(), Vec::new()),
            _ => (state, Vec::new()),
        },
    }
}

/// Move every unfinished step into the display state matching `kind`.
fn settle_steps(steps: &mut OrderedStepList, kind: TerminalKind, detail: Option<&str>) {
    for step in steps.iter_mut().filter(|s| !s.status.is_terminal()) {
        match kind {
            TerminalKind::Completed => {
                step.status = StepStatus::Completed;
                step.progress_percent = 100;
                if step.message.is_none() {
                    step.message = Some(COMPLETED_MESSAGE.to_string());
                }
            }
            TerminalKind::Stopped | TerminalKind::Failed => {
                step.status = StepStatus::Failed;
                step.message = detail.map(str::to_string);
            }
        }
    }
}
