//! Completion guard
//!
//! Single-shot latch deciding which terminal signal gets to run the
//! finalize side effects. Kept apart from the phase because a transport
//! failure and a terminal progress event can both arrive in the same turn
//! and both attempt to finalize.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct CompletionGuard {
    fired: Arc<AtomicBool>,
}

impl CompletionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the latch. Only the first caller gets `true`.
    pub fn try_acquire(&self) -> bool {
        self.fired
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Re-arm for the next execution
    pub fn reset(&self) {
        self.fired.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_caller_wins() {
        let guard = CompletionGuard::new();
        assert!(guard.try_acquire());
        assert!(!guard.try_acquire());

        guard.reset();
        assert!(guard.try_acquire());
        assert!(!guard.try_acquire());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_single_winner() {
        let guard = CompletionGuard::new();
        let mut tasks = Vec::new();
        for _ in 0..16 {
            let guard = guard.clone();
            tasks.push(tokio::spawn(async move { guard.try_acquire() }));
        }

        let mut winners = 0;
        for task in tasks {
            if task.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
