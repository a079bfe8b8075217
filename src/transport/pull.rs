//! Pull strategy: one fetch per tick
//!
//! A successful fetch yields one event and schedules the next fetch after
//! the poll interval. A failed fetch is handed to the backoff controller,
//! which either schedules a retry or gives up with `Exhausted`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{
    BackoffController, BackoffDecision, Subscription, Transport, TransportFailure, TransportItem,
};
use crate::client::ProgressPayload;
use crate::config::BackoffConfig;
use crate::tracker::{ExecutionHandle, TrackerError};

/// Something that can fetch the current progress of an execution
#[async_trait]
pub trait ProgressSource: Send + Sync {
    async fn fetch_progress(&self, handle: &ExecutionHandle)
        -> Result<ProgressPayload, TrackerError>;
}

pub struct PullTransport {
    source: Arc<dyn ProgressSource>,
    interval: Duration,
    backoff: BackoffConfig,
}

impl PullTransport {
    pub fn new(source: Arc<dyn ProgressSource>, interval: Duration, backoff: BackoffConfig) -> Self {
        Self {
            source,
            interval,
            backoff,
        }
    }
}

impl Transport for PullTransport {
    fn open(&self, handle: &ExecutionHandle) -> Subscription {
        let source = self.source.clone();
        let interval = self.interval;
        let backoff = BackoffController::from_config(&self.backoff);
        let handle = handle.clone();

        Subscription::spawn(move |sender| async move {
            let mut backoff = backoff;
            loop {
                let result = source.fetch_progress(&handle).await;
                // a response that lands after close belongs to nobody
                if !sender.is_owner() {
                    return;
                }

                let delay = match result {
                    Ok(payload) => {
                        backoff.record_success();
                        let terminal = payload.status.is_terminal();
                        if !sender.send(TransportItem::Event(payload)).await || terminal {
                            return;
                        }
                        interval
                    }
                    Err(e) => match backoff.record_failure() {
                        BackoffDecision::RetryAfter(delay) => {
                            warn!(
                                execution_id = %handle,
                                attempt = backoff.failures(),
                                delay_ms = delay.as_millis() as u64,
                                error = %e,
                                "Progress fetch failed, backing off"
                            );
                            delay
                        }
                        BackoffDecision::Exhausted { attempts } => {
                            warn!(
                                execution_id = %handle,
                                attempts,
                                error = %e,
                                "Progress fetch failed too many times, giving up"
                            );
                            sender
                                .send(TransportItem::Failed(TransportFailure::Exhausted {
                                    attempts,
                                }))
                                .await;
                            return;
                        }
                    },
                };

                debug!(execution_id = %handle, delay_ms = delay.as_millis() as u64, "Next poll scheduled");
                tokio::time::sleep(delay).await;
            }
        })
    }

    fn name(&self) -> &'static str {
        "pull"
    }
}
