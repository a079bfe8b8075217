//! Step types
//!
//! A tracked execution is a fixed, ordered list of named steps. The order is
//! decided when tracking starts and is never changed by the order in which
//! progress events arrive.

use serde::{Deserialize, Serialize};

/// Message shown on a step that finished without reporting its own text
pub const COMPLETED_MESSAGE: &str = "Completed";

/// Status of a single step
///
/// Steps only move forward: `pending -> running -> {completed, failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    #[default]
    #[serde(alias = "PENDING")]
    Pending,
    #[serde(alias = "RUNNING")]
    Running,
    #[serde(alias = "COMPLETED")]
    Completed,
    #[serde(alias = "FAILED")]
    Failed,
}

impl StepStatus {
    fn rank(self) -> u8 {
        match self {
            StepStatus::Pending => 0,
            StepStatus::Running => 1,
            StepStatus::Completed | StepStatus::Failed => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.rank() == 2
    }

    /// Whether a step currently in `self` may take on `next`.
    ///
    /// Repeating the current status is allowed so re-applied events stay
    /// idempotent; anything else must be strictly further along.
    pub fn can_advance_to(self, next: StepStatus) -> bool {
        self == next || next.rank() > self.rank()
    }
}

/// Live state of one step as shown to the view layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepState {
    /// Stable key used by the server
    pub name: String,
    /// Display text from the local label table
    pub label: String,
    pub status: StepStatus,
    /// 0..=100
    pub progress_percent: u8,
    pub current_count: Option<u64>,
    pub total_count: Option<u64>,
    pub message: Option<String>,
    pub duration_ms: Option<u64>,
}

impl StepState {
    pub fn pending(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            status: StepStatus::Pending,
            progress_percent: 0,
            current_count: None,
            total_count: None,
            message: None,
            duration_ms: None,
        }
    }
}

/// Fixed-order list of steps, addressed by name
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrderedStepList {
    steps: Vec<StepState>,
}

impl OrderedStepList {
    pub fn new(steps: Vec<StepState>) -> Self {
        Self { steps }
    }

    /// Build a pending list for every entry of the catalog, in catalog order
    pub fn from_catalog(catalog: &StepCatalog) -> Self {
        Self {
            steps: catalog
                .entries()
                .iter()
                .map(|entry| StepState::pending(&entry.name, &entry.label))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn get(&self, name: &str) -> Option<&StepState> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut StepState> {
        self.steps.iter_mut().find(|s| s.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StepState> {
        self.steps.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut StepState> {
        self.steps.iter_mut()
    }

    pub(crate) fn push(&mut self, step: StepState) {
        self.steps.push(step);
    }

    /// The step currently running, or the first one not yet finished
    pub fn current(&self) -> Option<&StepState> {
        self.steps
            .iter()
            .find(|s| s.status == StepStatus::Running)
            .or_else(|| self.steps.iter().find(|s| !s.status.is_terminal()))
    }
}

/// One row of the name -> label table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepLabel {
    pub name: String,
    pub label: String,
}

/// Static name -> label table
///
/// Labels never come from the server. The table's order is also the
/// canonical order used when a step list has to be rebuilt from a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepCatalog {
    entries: Vec<StepLabel>,
}

impl StepCatalog {
    pub fn new(entries: Vec<StepLabel>) -> Self {
        Self { entries }
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            entries: pairs
                .into_iter()
                .map(|(name, label)| StepLabel {
                    name: name.to_string(),
                    label: label.to_string(),
                })
                .collect(),
        }
    }

    pub fn entries(&self) -> &[StepLabel] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Label for a step name; unknown names are shown as-is
    pub fn label_for<'a>(&'a self, name: &'a str) -> &'a str {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.label.as_str())
            .unwrap_or(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_only_moves_forward() {
        assert!(StepStatus::Pending.can_advance_to(StepStatus::Running));
        assert!(StepStatus::Running.can_advance_to(StepStatus::Completed));
        assert!(StepStatus::Running.can_advance_to(StepStatus::Failed));
        assert!(StepStatus::Running.can_advance_to(StepStatus::Running));

        assert!(!StepStatus::Running.can_advance_to(StepStatus::Pending));
        assert!(!StepStatus::Completed.can_advance_to(StepStatus::Running));
        assert!(!StepStatus::Completed.can_advance_to(StepStatus::Failed));
        assert!(!StepStatus::Failed.can_advance_to(StepStatus::Completed));
    }

    #[test]
    fn test_catalog_labels() {
        let catalog = StepCatalog::from_pairs([("fetch", "Fetching data"), ("render", "Rendering")]);
        assert_eq!(catalog.label_for("fetch"), "Fetching data");
        assert_eq!(catalog.label_for("unknown"), "unknown");
        assert!(catalog.contains("render"));
    }

    #[test]
    fn test_list_from_catalog_keeps_order() {
        let catalog = StepCatalog::from_pairs([("b", "B"), ("a", "A"), ("c", "C")]);
        let list = OrderedStepList::from_catalog(&catalog);
        let names: Vec<_> = list.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
        assert!(list.iter().all(|s| s.status == StepStatus::Pending));
    }

    #[test]
    fn test_current_step() {
        let mut list = OrderedStepList::new(vec![
            StepState::pending("a", "A"),
            StepState::pending("b", "B"),
        ]);
        assert_eq!(list.current().map(|s| s.name.as_str()), Some("a"));

        list.get_mut("a").unwrap().status = StepStatus::Completed;
        list.get_mut("b").unwrap().status = StepStatus::Running;
        assert_eq!(list.current().map(|s| s.name.as_str()), Some("b"));
    }
}
