//! # Execution Tracker
//!
//! Client-side tracking of long-running, multi-step workflow executions
//! against a GraphQL server.
//!
//! ## Features
//!
//! - **Push or pull transport** - graphql-ws subscription or periodic polling with backoff
//! - **Monotonic step merging** - out-of-order or duplicate updates never move a step backwards
//! - **Staleness detection** - a silent transport fails the execution instead of hanging
//! - **Recovery** - a persisted execution id is reattached after restart only if it is still live
//! - **Once-only completion** - terminal side effects fire exactly once per execution
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use execution_tracker::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = TrackerConfig::load("tracker.yaml")?;
//!     let mut tracker = Tracker::connect(config, Arc::new(LogEffects));
//!
//!     tracker.recover().await;
//!     if tracker.state().phase == Phase::Idle {
//!         tracker.start_from_catalog("exec-42");
//!     }
//!
//!     let outcome = tracker.run().await;
//!     println!("Execution finished: {:?}", outcome);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod tracker;
pub mod transport;

// Re-export main types
pub use client::{
    ActiveExecution, ExecutionStatus, GraphQLClient, LivenessReport, ProgressDetail,
    ProgressPayload, StepUpdate,
};
pub use config::{
    BackoffConfig, CompletionConfig, ConfigError, StalenessConfig, StoreConfig, TrackerConfig,
    TransportKind,
};
pub use tracker::{
    merge, reduce, Authority, Command, CompletionGuard, ExecutionHandle, FileStore, HandleStore,
    LivenessVerifier, LogEffects, MemoryStore, OrderedStepList, Phase, RecoveryOutcome,
    Scheduler, Severity, SideEffects, StepCatalog, StepState, StepStatus, TerminalKind, Tracker,
    TrackerError, TrackerEvent, TrackerParts, TrackerState,
};
pub use transport::{
    ProgressSource, PullTransport, PushTransport, Subscription, SubscriptionSender, Transport,
    TransportFailure, TransportItem,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::client::{ExecutionStatus, GraphQLClient, ProgressPayload, StepUpdate};
    pub use crate::config::{TrackerConfig, TransportKind};
    pub use crate::tracker::{
        ExecutionHandle, LogEffects, OrderedStepList, Phase, RecoveryOutcome, Severity,
        SideEffects, StepStatus, TerminalKind, Tracker, TrackerError, TrackerParts, TrackerState,
    };
    pub use crate::transport::{Transport, TransportFailure};
}
