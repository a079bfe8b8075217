//! Execution tracking
//!
//! This module contains:
//! - `step` - Step statuses, the ordered step list and the label catalog
//! - `merge` - Folding a progress payload into the step list
//! - `state` - Tracker state, events, commands and the reducer
//! - `guard` - Once-only completion guard
//! - `recovery` - Reattaching to a persisted execution after restart
//! - `store` - Persisting the active execution id
//! - `effects` - Outbound notifications, cache invalidation and navigation
//! - `scheduler` - Cancellable deferred callbacks
//! - `driver` - The `Tracker` that ties everything together

pub mod driver;
pub mod effects;
pub mod error;
pub mod guard;
pub mod merge;
pub mod recovery;
pub mod scheduler;
pub mod state;
pub mod step;
pub mod store;

pub use driver::{Tracker, TrackerParts, COMPLETED_NOTICE};
pub use effects::{LogEffects, Severity, SideEffects};
pub use error::TrackerError;
pub use guard::CompletionGuard;
pub use merge::merge;
pub use recovery::{
    Authority, LivenessVerifier, RecoveryCoordinator, RecoveryOutcome, RECOVERY_FAILED_MESSAGE,
    STALE_EXECUTION_MESSAGE,
};
pub use scheduler::{Scheduler, TimerHandle};
pub use state::{
    reduce, Command, ExecutionHandle, Phase, TerminalKind, TrackerEvent, TrackerState,
    DEFAULT_FAILURE_DETAIL, DEFAULT_STOP_REASON,
};
pub use step::{
    OrderedStepList, StepCatalog, StepLabel, StepState, StepStatus, COMPLETED_MESSAGE,
};
pub use store::{open_store, FileStore, HandleStore, MemoryStore};
