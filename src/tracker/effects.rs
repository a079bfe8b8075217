//! Outbound side effects
//!
//! The tracker never renders anything itself. Everything user-visible goes
//! through these fire-and-forget hooks supplied by the embedding application.

use std::fmt;

use serde_json::Value;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        f.write_str(s)
    }
}

pub trait SideEffects: Send + Sync {
    /// Show a message to the user
    fn notify(&self, message: &str, severity: Severity);

    /// Drop cached views that depend on the finished execution
    fn invalidate(&self, keys: &[String]);

    /// Move the user to another view
    fn navigate(&self, view: &str, data: Option<&Value>);
}

/// Side effects that only write to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogEffects;

impl SideEffects for LogEffects {
    fn notify(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Info | Severity::Success => info!(%severity, "{}", message),
            Severity::Warning => warn!(%severity, "{}", message),
            Severity::Error => error!(%severity, "{}", message),
        }
    }

    fn invalidate(&self, keys: &[String]) {
        info!(keys = ?keys, "Invalidating cached views");
    }

    fn navigate(&self, view: &str, data: Option<&Value>) {
        info!(view, data = ?data, "Navigating");
    }
}
