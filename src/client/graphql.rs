use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::client::types::{ActiveExecution, GraphQLResponse, LivenessReport, ProgressPayload};
use crate::tracker::{Authority, ExecutionHandle, LivenessVerifier, TrackerError};
use crate::transport::{ProgressSource, TransportFailure};

const PROGRESS_FIELDS: &str = r#"
    status
    steps {
        name
        status
        progress { current total message }
        durationMs
    }
    metadata
    error
"#;

/// GraphQL error codes that mean the actor is signed out or not allowed
const AUTHORIZATION_CODES: &[&str] = &["UNAUTHENTICATED", "FORBIDDEN"];

pub fn graphql_url(server_url: &str) -> String {
    format!("{}/graphql", server_url.trim_end_matches('/'))
}

pub fn ws_url(server_url: &str) -> String {
    let ws = server_url
        .trim_end_matches('/')
        .replace("http://", "ws://")
        .replace("https://", "wss://");
    format!("{}/graphql/ws", ws)
}

pub mod queries {
    use super::*;

    pub fn health() -> String {
        "query { health }".to_string()
    }

    pub fn execution_progress() -> String {
        format!(
            "query ExecutionProgress($executionId: ID!) {{ executionProgress(executionId: $executionId) {{ {} }} }}",
            PROGRESS_FIELDS.trim()
        )
    }

    pub fn active_execution() -> String {
        "query { activeExecution { active executionId steps { name status progress { current total message } durationMs } } }"
            .to_string()
    }

    pub fn verify_execution() -> String {
        "query VerifyExecution($executionId: ID!, $timeoutMs: Int!) { verifyExecution(executionId: $executionId, timeoutMs: $timeoutMs) { active reason message } }"
            .to_string()
    }
}

pub mod mutations {
    pub fn stop_execution() -> String {
        "mutation StopExecution($executionId: ID!) { stopExecution(executionId: $executionId) }"
            .to_string()
    }
}

pub mod subscriptions {
    use super::*;

    pub fn execution_progress() -> String {
        format!(
            "subscription ExecutionProgress($executionId: ID!) {{ executionProgress(executionId: $executionId) {{ {} }} }}",
            PROGRESS_FIELDS.trim()
        )
    }
}

/// Client for the authority's GraphQL endpoint
#[derive(Debug, Clone)]
pub struct GraphQLClient {
    client: reqwest::Client,
    url: String,
}

impl GraphQLClient {
    pub fn new(server_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: graphql_url(server_url),
        }
    }

    pub async fn query<T: serde::de::DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
    ) -> Result<T, TrackerError> {
        self.query_with_timeout(query, variables, None).await
    }

    pub async fn query_with_timeout<T: serde::de::DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
        timeout: Option<Duration>,
    ) -> Result<T, TrackerError> {
        let mut request = self
            .client
            .post(&self.url)
            .json(&json!({ "query": query, "variables": variables }));
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(TrackerError::Authorization(format!(
                "server responded with HTTP {}",
                status.as_u16()
            )));
        }
        if !status.is_success() {
            return Err(TrackerError::Transport(TransportFailure::Http {
                status: status.as_u16(),
            }));
        }

        let result: GraphQLResponse<T> = response.json().await?;

        if let Some(errors) = result.errors.filter(|e| !e.is_empty()) {
            let messages: Vec<_> = errors.iter().map(|e| e.message.as_str()).collect();
            let unauthorized = errors
                .iter()
                .any(|e| e.code().is_some_and(|c| AUTHORIZATION_CODES.contains(&c)));
            if unauthorized {
                return Err(TrackerError::Authorization(messages.join(", ")));
            }
            return Err(TrackerError::Graphql(messages.join(", ")));
        }

        result
            .data
            .ok_or_else(|| TrackerError::Graphql("No data returned".to_string()))
    }

    pub async fn health(&self) -> Result<String, TrackerError> {
        #[derive(serde::Deserialize)]
        struct Response {
            health: String,
        }
        let data: Response = self.query(&queries::health(), Value::Null).await?;
        Ok(data.health)
    }

    pub async fn execution_progress(
        &self,
        execution_id: &str,
    ) -> Result<ProgressPayload, TrackerError> {
        #[derive(serde::Deserialize)]
        struct Response {
            #[serde(rename = "executionProgress")]
            execution_progress: ProgressPayload,
        }
        let data: Response = self
            .query(
                &queries::execution_progress(),
                json!({ "executionId": execution_id }),
            )
            .await?;
        Ok(data.execution_progress)
    }

    pub async fn active_execution(&self) -> Result<ActiveExecution, TrackerError> {
        #[derive(serde::Deserialize)]
        struct Response {
            #[serde(rename = "activeExecution")]
            active_execution: Option<ActiveExecution>,
        }
        let data: Response = self
            .query(&queries::active_execution(), Value::Null)
            .await?;
        Ok(data.active_execution.unwrap_or_default())
    }

    pub async fn verify_execution(
        &self,
        execution_id: &str,
        timeout: Duration,
    ) -> Result<LivenessReport, TrackerError> {
        #[derive(serde::Deserialize)]
        struct Response {
            #[serde(rename = "verifyExecution")]
            verify_execution: LivenessReport,
        }
        let data: Response = self
            .query_with_timeout(
                &queries::verify_execution(),
                json!({ "executionId": execution_id, "timeoutMs": timeout.as_millis() as u64 }),
                Some(timeout),
            )
            .await?;
        Ok(data.verify_execution)
    }

    pub async fn stop_execution(&self, execution_id: &str) -> Result<bool, TrackerError> {
        #[derive(serde::Deserialize)]
        struct Response {
            #[serde(rename = "stopExecution")]
            stop_execution: bool,
        }
        let data: Response = self
            .query(
                &mutations::stop_execution(),
                json!({ "executionId": execution_id }),
            )
            .await?;
        Ok(data.stop_execution)
    }
}

#[async_trait]
impl ProgressSource for GraphQLClient {
    async fn fetch_progress(
        &self,
        handle: &ExecutionHandle,
    ) -> Result<ProgressPayload, TrackerError> {
        self.execution_progress(handle.as_str()).await
    }
}

#[async_trait]
impl Authority for GraphQLClient {
    async fn active_execution(&self) -> Result<ActiveExecution, TrackerError> {
        GraphQLClient::active_execution(self).await
    }
}

#[async_trait]
impl LivenessVerifier for GraphQLClient {
    async fn verify(
        &self,
        handle: &ExecutionHandle,
        timeout: Duration,
    ) -> Result<LivenessReport, TrackerError> {
        self.verify_execution(handle.as_str(), timeout).await
    }
}
