//! Progress transports
//!
//! A transport turns an execution id into a lazy, unbounded sequence of
//! progress payloads or a terminal transport failure. Two strategies exist:
//! - `push`: server-initiated graphql-ws subscription over a websocket
//! - `pull`: client-initiated periodic fetch with backoff on failure
//!
//! Both hand their output to the consumer through a [`Subscription`], which
//! guarantees that nothing is delivered once it has been closed.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::client::ProgressPayload;
use crate::tracker::ExecutionHandle;

pub mod backoff;
pub mod pull;
pub mod push;
pub mod staleness;

pub use backoff::{BackoffController, BackoffDecision};
pub use pull::{ProgressSource, PullTransport};
pub use push::PushTransport;
pub use staleness::{StalenessMonitor, StalenessThresholds, Supervised};

/// Channel depth between a transport task and its consumer
const SUBSCRIPTION_BUFFER: usize = 64;

/// Why a transport gave up; every variant ends the tracked execution
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportFailure {
    #[error("connection lost: {0}")]
    Connection(String),

    #[error("server responded with HTTP {status}")]
    Http { status: u16 },

    #[error("could not parse progress payload: {0}")]
    Parse(String),

    #[error("subscription error: {0}")]
    Protocol(String),

    #[error("connection closed by server")]
    Closed,

    #[error("stale: no progress received for {threshold:?}")]
    Stale { threshold: Duration },

    #[error("exhausted: gave up after {attempts} failed requests")]
    Exhausted { attempts: u32 },
}

impl TransportFailure {
    /// Short machine readable cause
    pub fn cause(&self) -> &'static str {
        match self {
            TransportFailure::Stale { .. } => "stale",
            TransportFailure::Exhausted { .. } => "exhausted",
            _ => "transport",
        }
    }
}

/// One item produced by a transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportItem {
    Event(ProgressPayload),
    Failed(TransportFailure),
}

/// Strategy for receiving progress of one execution
pub trait Transport: Send + Sync {
    /// Start delivering progress for `handle`
    fn open(&self, handle: &ExecutionHandle) -> Subscription;

    /// Name used in logs
    fn name(&self) -> &'static str;
}

/// Producer half of a [`Subscription`]
///
/// Holds the per-attempt ownership flag: once the consumer closes, every
/// send is dropped even if a request was already in flight.
#[derive(Debug, Clone)]
pub struct SubscriptionSender {
    tx: mpsc::Sender<TransportItem>,
    owner: Arc<AtomicBool>,
}

impl SubscriptionSender {
    /// Whether the consumer still wants items
    pub fn is_owner(&self) -> bool {
        self.owner.load(Ordering::SeqCst)
    }

    /// Deliver an item; returns false once the subscription is closed
    pub async fn send(&self, item: TransportItem) -> bool {
        if !self.is_owner() {
            return false;
        }
        self.tx.send(item).await.is_ok() && self.is_owner()
    }
}

/// Consumer half: a stream of transport items with an idempotent `close()`
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::Receiver<TransportItem>,
    owner: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Create a connected sender/subscription pair
    pub fn channel() -> (SubscriptionSender, Subscription) {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let owner = Arc::new(AtomicBool::new(true));
        (
            SubscriptionSender {
                tx,
                owner: owner.clone(),
            },
            Subscription {
                rx,
                owner,
                task: None,
            },
        )
    }

    /// Spawn `producer` and tie its lifetime to the subscription
    pub fn spawn<F, Fut>(producer: F) -> Subscription
    where
        F: FnOnce(SubscriptionSender) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let (sender, mut subscription) = Self::channel();
        subscription.task = Some(tokio::spawn(producer(sender)));
        subscription
    }

    pub fn is_closed(&self) -> bool {
        !self.owner.load(Ordering::SeqCst)
    }

    /// Stop delivery and tear down the producer. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.owner.swap(false, Ordering::SeqCst) {
            tracing::debug!("Closing progress subscription");
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.rx.close();
    }
}

impl Stream for Subscription {
    type Item = TransportItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.is_closed() {
            return Poll::Ready(None);
        }
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}
