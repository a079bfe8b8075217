//! Retry/backoff controller for the pull strategy
//!
//! Delay after the n-th consecutive failure is `base * multiplier^n`. There
//! is no delay ceiling; the failure cap is the only limit.

use std::time::Duration;

use crate::config::BackoffConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffDecision {
    RetryAfter(Duration),
    Exhausted { attempts: u32 },
}

#[derive(Debug, Clone)]
pub struct BackoffController {
    base: Duration,
    multiplier: f64,
    max_failures: u32,
    failures: u32,
}

impl BackoffController {
    pub fn new(base: Duration, multiplier: f64, max_failures: u32) -> Self {
        Self {
            base,
            multiplier,
            max_failures,
            failures: 0,
        }
    }

    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(config.base, config.multiplier, config.max_failures)
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn record_success(&mut self) {
        self.failures = 0;
    }

    pub fn record_failure(&mut self) -> BackoffDecision {
        self.failures = self.failures.saturating_add(1);
        if self.failures >= self.max_failures {
            return BackoffDecision::Exhausted {
                attempts: self.failures,
            };
        }
        let factor = self.multiplier.powi(self.failures as i32);
        let delay = Duration::try_from_secs_f64(self.base.as_secs_f64() * factor)
            .unwrap_or(Duration::MAX);
        BackoffDecision::RetryAfter(delay)
    }
}
