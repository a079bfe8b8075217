//! Staleness monitor
//!
//! Watches a subscription for silence. Until the first event arrives the
//! (longer) initial threshold applies; afterwards the steady-state threshold
//! applies for good. A periodic check compares the time since the last
//! event with the active threshold and, on breach, emits a synthetic
//! `Stale` failure and closes the underlying subscription.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use super::{Subscription, TransportFailure, TransportItem};
use crate::config::StalenessConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessThresholds {
    /// Applies until the first event
    pub initial: Duration,
    /// Applies after the first event
    pub steady: Duration,
    /// How often silence is checked
    pub check_interval: Duration,
}

impl StalenessThresholds {
    /// Thresholds for a fresh attach, or the shortened ones for a run that
    /// was verified live during recovery.
    pub fn from_config(config: &StalenessConfig, resumed: bool) -> Self {
        Self {
            initial: if resumed {
                config.resumed_timeout
            } else {
                config.initial_timeout
            },
            steady: config.steady_timeout,
            check_interval: config.check_interval,
        }
    }
}

/// Clock comparison core, independent of any timer
#[derive(Debug, Clone)]
pub struct StalenessMonitor {
    thresholds: StalenessThresholds,
    last_event: Instant,
    seen_event: bool,
}

impl StalenessMonitor {
    pub fn new(thresholds: StalenessThresholds, now: Instant) -> Self {
        Self {
            thresholds,
            last_event: now,
            seen_event: false,
        }
    }

    pub fn record_event(&mut self, now: Instant) {
        self.last_event = now;
        self.seen_event = true;
    }

    /// Threshold currently in force
    pub fn threshold(&self) -> Duration {
        if self.seen_event {
            self.thresholds.steady
        } else {
            self.thresholds.initial
        }
    }

    pub fn is_stale(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_event) > self.threshold()
    }
}

const MIN_CHECK_INTERVAL: Duration = Duration::from_millis(1);

/// A subscription under staleness supervision
#[derive(Debug)]
pub struct Supervised {
    inner: Subscription,
    monitor: StalenessMonitor,
    ticker: Interval,
    done: bool,
}

impl Supervised {
    pub fn new(inner: Subscription, thresholds: StalenessThresholds) -> Self {
        let now = Instant::now();
        // configs built in code skip validation; interval_at rejects zero
        let period = thresholds.check_interval.max(MIN_CHECK_INTERVAL);
        let mut ticker = tokio::time::interval_at(now + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            inner,
            monitor: StalenessMonitor::new(thresholds, now),
            ticker,
            done: false,
        }
    }

    /// Close the wrapped subscription and stop checking. Idempotent.
    pub fn close(&mut self) {
        self.done = true;
        self.inner.close();
    }

    pub fn is_closed(&self) -> bool {
        self.done
    }
}

impl Stream for Supervised {
    type Item = TransportItem;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(item)) => {
                if matches!(item, TransportItem::Event(_)) {
                    this.monitor.record_event(Instant::now());
                }
                return Poll::Ready(Some(item));
            }
            Poll::Ready(None) => {
                this.done = true;
                return Poll::Ready(None);
            }
            Poll::Pending => {}
        }

        while this.ticker.poll_tick(cx).is_ready() {
            if this.monitor.is_stale(Instant::now()) {
                let threshold = this.monitor.threshold();
                tracing::warn!(
                    threshold_ms = threshold.as_millis() as u64,
                    "No progress received in time, closing transport"
                );
                this.close();
                return Poll::Ready(Some(TransportItem::Failed(TransportFailure::Stale {
                    threshold,
                })));
            }
        }

        Poll::Pending
    }
}
