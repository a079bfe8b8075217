//! Deferred callbacks
//!
//! `schedule_after(delay, f)` runs `f` once after `delay` on the tokio timer
//! and returns a handle that cancels it. Under a paused tokio clock
//! (`#[tokio::test(start_paused = true)]`) delays elapse in virtual time.

use std::time::Duration;

use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, Default)]
pub struct Scheduler;

impl Scheduler {
    pub fn new() -> Self {
        Self
    }

    pub fn schedule_after<F>(&self, delay: Duration, f: F) -> TimerHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            f();
        });
        TimerHandle { task: Some(task) }
    }
}

/// Cancels its timer when cancelled or dropped
#[derive(Debug)]
pub struct TimerHandle {
    task: Option<JoinHandle<()>>,
}

impl TimerHandle {
    /// Idempotent
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let _handle = Scheduler::new().schedule_after(Duration::from_secs(3), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(2999)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_firing() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let mut handle = Scheduler::new().schedule_after(Duration::from_secs(1), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        handle.cancel();
        handle.cancel();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let handle = Scheduler::new().schedule_after(Duration::from_secs(1), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        drop(handle);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
