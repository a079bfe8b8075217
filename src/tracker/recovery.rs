//! Recovery coordinator
//!
//! Runs once per process start. A persisted execution id is only trusted
//! after the authority reports an active execution for the actor and the
//! liveness verifier confirms that specific execution is really running.
//! Anything else discards the persisted id; recovery itself is never retried.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::effects::{Severity, SideEffects};
use super::merge::merge;
use super::step::{OrderedStepList, StepCatalog};
use super::store::HandleStore;
use super::{ExecutionHandle, TrackerError};
use crate::client::{ActiveExecution, ExecutionStatus, LivenessReport, ProgressPayload};

pub const RECOVERY_FAILED_MESSAGE: &str =
    "Could not restore the previous execution. Tracking has been reset.";
pub const STALE_EXECUTION_MESSAGE: &str =
    "The previous execution is no longer running and was cleaned up.";

/// The remote system that owns ground truth about active executions
#[async_trait]
pub trait Authority: Send + Sync {
    /// Active execution for the current actor, if any
    async fn active_execution(&self) -> Result<ActiveExecution, TrackerError>;
}

/// Checks one execution directly, bypassing any transport
#[async_trait]
pub trait LivenessVerifier: Send + Sync {
    async fn verify(
        &self,
        handle: &ExecutionHandle,
        timeout: Duration,
    ) -> Result<LivenessReport, TrackerError>;
}

#[derive(Debug)]
pub enum RecoveryOutcome {
    /// No execution id was persisted
    NothingPersisted,
    /// The authority knows of no active execution
    NoActiveExecution { handle: ExecutionHandle },
    /// Reported active, but the execution itself is dead
    NotLive {
        handle: ExecutionHandle,
        reason: Option<String>,
    },
    /// Confirmed live; tracking resumes from this snapshot
    Resume {
        handle: ExecutionHandle,
        steps: OrderedStepList,
    },
    /// The actor is signed out; state cleared without notifying
    SignedOut,
    /// A call failed or returned inconsistent data
    Failed(TrackerError),
}

pub struct RecoveryCoordinator<'a> {
    pub authority: &'a dyn Authority,
    pub verifier: &'a dyn LivenessVerifier,
    pub store: &'a dyn HandleStore,
    pub effects: &'a dyn SideEffects,
    pub catalog: &'a StepCatalog,
    pub verify_timeout: Duration,
}

impl RecoveryCoordinator<'_> {
    pub async fn recover(&self) -> RecoveryOutcome {
        let handle = match self.store.load() {
            Ok(Some(handle)) => handle,
            Ok(None) => {
                debug!("No persisted execution to recover");
                return RecoveryOutcome::NothingPersisted;
            }
            Err(e) => return self.abandon(None, e),
        };

        info!(execution_id = %handle, "Found persisted execution, checking with server");
        match self.reconcile(&handle).await {
            Ok(outcome) => outcome,
            Err(e) => self.abandon(Some(&handle), e),
        }
    }

    async fn reconcile(&self, handle: &ExecutionHandle) -> Result<RecoveryOutcome, TrackerError> {
        let active = self.authority.active_execution().await?;
        if !active.active {
            self.store.clear()?;
            info!(execution_id = %handle, "Server reports no active execution, discarding");
            return Ok(RecoveryOutcome::NoActiveExecution {
                handle: handle.clone(),
            });
        }

        if let Some(reported) = active.execution_id.as_deref() {
            if reported != handle.as_str() {
                return Err(TrackerError::Recovery(format!(
                    "server reports active execution {} but {} was persisted",
                    reported, handle
                )));
            }
        }

        let report = tokio::time::timeout(
            self.verify_timeout,
            self.verifier.verify(handle, self.verify_timeout),
        )
        .await
        .map_err(|_| {
            TrackerError::Recovery(format!(
                "liveness check timed out after {:?}",
                self.verify_timeout
            ))
        })??;

        if !report.active {
            self.store.clear()?;
            info!(
                execution_id = %handle,
                reason = report.reason.as_deref().unwrap_or("unknown"),
                "Execution is not live, discarding"
            );
            let message = report
                .message
                .clone()
                .unwrap_or_else(|| STALE_EXECUTION_MESSAGE.to_string());
            self.effects.notify(&message, Severity::Info);
            return Ok(RecoveryOutcome::NotLive {
                handle: handle.clone(),
                reason: report.reason,
            });
        }

        let snapshot = ProgressPayload::new(ExecutionStatus::Running, active.steps.unwrap_or_default());
        let steps = merge(&OrderedStepList::default(), &snapshot, self.catalog);
        info!(execution_id = %handle, steps = steps.len(), "Execution confirmed live, resuming");
        Ok(RecoveryOutcome::Resume {
            handle: handle.clone(),
            steps,
        })
    }

    fn abandon(&self, handle: Option<&ExecutionHandle>, error: TrackerError) -> RecoveryOutcome {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear persisted execution id");
        }

        if error.is_authorization() {
            debug!(error = %error, "Not signed in, clearing recovery state");
            return RecoveryOutcome::SignedOut;
        }

        warn!(
            execution_id = handle.map(|h| h.as_str()).unwrap_or("unknown"),
            error = %error,
            "Recovery failed"
        );
        self.effects.notify(RECOVERY_FAILED_MESSAGE, Severity::Warning);
        RecoveryOutcome::Failed(error)
    }
}
