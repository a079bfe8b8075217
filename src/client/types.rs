use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tracker::StepStatus;

/// Run-level status reported by the authority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    #[default]
    #[serde(alias = "PENDING")]
    Pending,
    #[serde(alias = "RUNNING")]
    Running,
    #[serde(alias = "COMPLETED")]
    Completed,
    #[serde(alias = "STOPPED")]
    Stopped,
    #[serde(alias = "FAILED")]
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Stopped | ExecutionStatus::Failed
        )
    }
}

/// `{current, total, message}` attached to a step update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProgressDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// One step entry inside a progress payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepUpdate {
    pub name: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressDetail>,
    #[serde(default, alias = "duration_ms", skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl StepUpdate {
    pub fn new(name: &str, status: StepStatus) -> Self {
        Self {
            name: name.to_string(),
            status,
            progress: None,
            duration_ms: None,
        }
    }

    pub fn with_progress(mut self, current: u64, total: u64) -> Self {
        let detail = self.progress.get_or_insert_with(ProgressDetail::default);
        detail.current = Some(current);
        detail.total = Some(total);
        self
    }

    pub fn with_message(mut self, message: &str) -> Self {
        self.progress
            .get_or_insert_with(ProgressDetail::default)
            .message = Some(message.to_string());
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

/// A single progress message, whether pushed or pulled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressPayload {
    pub status: ExecutionStatus,
    #[serde(default)]
    pub steps: Vec<StepUpdate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressPayload {
    pub fn new(status: ExecutionStatus, steps: Vec<StepUpdate>) -> Self {
        Self {
            status,
            steps,
            metadata: None,
            error: None,
        }
    }

    /// Human readable reason attached to a stop, if the server sent one
    pub fn stop_reason(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("reason"))
            .and_then(Value::as_str)
            .or(self.error.as_deref())
    }
}

/// Answer to "is there an active execution for this actor"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ActiveExecution {
    pub active: bool,
    #[serde(default, alias = "execution_id")]
    pub execution_id: Option<String>,
    #[serde(default)]
    pub steps: Option<Vec<StepUpdate>>,
}

/// Answer to "is this specific execution still live"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LivenessReport {
    pub active: bool,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GraphQLResponse<T> {
    pub data: Option<T>,
    pub errors: Option<Vec<GraphQLError>>,
}

#[derive(Debug, Deserialize)]
pub struct GraphQLError {
    pub message: String,
    #[serde(default)]
    pub extensions: Option<Value>,
}

impl GraphQLError {
    pub fn code(&self) -> Option<&str> {
        self.extensions
            .as_ref()
            .and_then(|e| e.get("code"))
            .and_then(Value::as_str)
    }
}
