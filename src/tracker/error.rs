//! Tracker error types

use crate::transport::TransportFailure;

/// Errors raised by the tracker and its remote collaborators
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportFailure),

    #[error("Recovery failed: {0}")]
    Recovery(String),

    #[error("Not authorized: {0}")]
    Authorization(String),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("GraphQL error: {0}")]
    Graphql(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("State store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TrackerError {
    /// Expected sign-out states that should not be surfaced to the user
    pub fn is_authorization(&self) -> bool {
        matches!(self, TrackerError::Authorization(_))
    }
}
