//! Step merge engine
//!
//! Folds one raw progress payload into the ordered step list. The fold is
//! pure and idempotent, so duplicated or reordered deliveries from the
//! transport never need de-duplication upstream.

use super::step::{OrderedStepList, StepCatalog, StepState, StepStatus, COMPLETED_MESSAGE};
use crate::client::{ProgressPayload, StepUpdate};

/// Apply `payload` to `steps` and return the resulting list.
///
/// Unknown step names are ignored. When `steps` is empty (a resumed run with
/// no local list yet) the list is first rebuilt from the catalog and the
/// names present in the payload.
pub fn merge(
    steps: &OrderedStepList,
    payload: &ProgressPayload,
    catalog: &StepCatalog,
) -> OrderedStepList {
    let mut merged = if steps.is_empty() && !payload.steps.is_empty() {
        rebuild(payload, catalog)
    } else {
        steps.clone()
    };

    for update in &payload.steps {
        if let Some(step) = merged.get_mut(&update.name) {
            apply_update(step, update);
        }
    }

    merged
}

fn rebuild(payload: &ProgressPayload, catalog: &StepCatalog) -> OrderedStepList {
    let mut list = OrderedStepList::from_catalog(catalog);
    for update in &payload.steps {
        if list.get(&update.name).is_none() {
            list.push(StepState::pending(
                &update.name,
                catalog.label_for(&update.name),
            ));
        }
    }
    list
}

fn apply_update(step: &mut StepState, update: &StepUpdate) {
    if let Some(duration) = update.duration_ms {
        step.duration_ms = Some(duration);
    }

    // a finished step keeps its final progress and message
    if step.status.is_terminal() || !step.status.can_advance_to(update.status) {
        return;
    }
    step.status = update.status;

    if let Some(progress) = &update.progress {
        if let Some(current) = progress.current {
            step.current_count = Some(current);
        }
        if let Some(total) = progress.total {
            step.total_count = Some(total);
        }
        if let (Some(current), Some(total)) = (progress.current, progress.total) {
            if total > 0 {
                step.progress_percent = percent(current, total);
            }
        }
        if let Some(message) = &progress.message {
            step.message = Some(message.clone());
        }
    }

    if update.status == StepStatus::Completed && step.status == StepStatus::Completed {
        let has_counts = update
            .progress
            .as_ref()
            .is_some_and(|p| p.current.is_some() && p.total.is_some());
        if !has_counts {
            step.progress_percent = 100;
        }
        let has_message = update
            .progress
            .as_ref()
            .is_some_and(|p| p.message.is_some());
        if !has_message {
            step.message = Some(COMPLETED_MESSAGE.to_string());
        }
    }
}

fn percent(current: u64, total: u64) -> u8 {
    let value = (current as f64 / total as f64 * 100.0).round();
    value.clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ExecutionStatus, ProgressDetail};

    fn catalog() -> StepCatalog {
        StepCatalog::from_pairs([
            ("s1", "Collect"),
            ("s2", "Analyze"),
            ("s3", "Summarize"),
            ("s4", "Publish"),
        ])
    }

    fn initial() -> OrderedStepList {
        OrderedStepList::from_catalog(&catalog())
    }

    fn running(steps: Vec<StepUpdate>) -> ProgressPayload {
        ProgressPayload::new(ExecutionStatus::Running, steps)
    }

    #[test]
    fn test_progress_percent_from_counts() {
        let payload = running(vec![StepUpdate::new("s1", StepStatus::Running).with_progress(5, 10)]);
        let merged = merge(&initial(), &payload, &catalog());

        let s1 = merged.get("s1").unwrap();
        assert_eq!(s1.status, StepStatus::Running);
        assert_eq!(s1.progress_percent, 50);
        assert_eq!(s1.current_count, Some(5));
        assert_eq!(s1.total_count, Some(10));
    }

    #[test]
    fn test_percent_rounds() {
        let payload = running(vec![StepUpdate::new("s1", StepStatus::Running).with_progress(1, 3)]);
        let merged = merge(&initial(), &payload, &catalog());
        assert_eq!(merged.get("s1").unwrap().progress_percent, 33);

        let payload = running(vec![StepUpdate::new("s1", StepStatus::Running).with_progress(2, 3)]);
        let merged = merge(&initial(), &payload, &catalog());
        assert_eq!(merged.get("s1").unwrap().progress_percent, 67);
    }

    #[test]
    fn test_message_only_update_keeps_percent() {
        let first = running(vec![StepUpdate::new("s1", StepStatus::Running).with_progress(3, 4)]);
        let second = running(vec![StepUpdate::new("s1", StepStatus::Running).with_message("still going")]);

        let merged = merge(&merge(&initial(), &first, &catalog()), &second, &catalog());
        let s1 = merged.get("s1").unwrap();
        assert_eq!(s1.progress_percent, 75);
        assert_eq!(s1.message.as_deref(), Some("still going"));
    }

    #[test]
    fn test_zero_total_leaves_percent() {
        let first = running(vec![StepUpdate::new("s1", StepStatus::Running).with_progress(1, 2)]);
        let second = running(vec![StepUpdate::new("s1", StepStatus::Running).with_progress(0, 0)]);

        let merged = merge(&merge(&initial(), &first, &catalog()), &second, &catalog());
        assert_eq!(merged.get("s1").unwrap().progress_percent, 50);
    }

    #[test]
    fn test_running_without_message_keeps_previous_message() {
        let first = running(vec![StepUpdate::new("s1", StepStatus::Running).with_message("downloading")]);
        let second = running(vec![StepUpdate::new("s1", StepStatus::Running)]);

        let merged = merge(&merge(&initial(), &first, &catalog()), &second, &catalog());
        assert_eq!(merged.get("s1").unwrap().message.as_deref(), Some("downloading"));
    }

    #[test]
    fn test_completed_without_progress_forces_full() {
        let first = running(vec![StepUpdate::new("s1", StepStatus::Running).with_progress(2, 10)]);
        let second = running(vec![StepUpdate::new("s1", StepStatus::Completed)]);

        let merged = merge(&merge(&initial(), &first, &catalog()), &second, &catalog());
        let s1 = merged.get("s1").unwrap();
        assert_eq!(s1.status, StepStatus::Completed);
        assert_eq!(s1.progress_percent, 100);
        assert_eq!(s1.message.as_deref(), Some(COMPLETED_MESSAGE));
    }

    #[test]
    fn test_completed_with_explicit_message_keeps_it() {
        let payload = running(vec![StepUpdate::new("s1", StepStatus::Completed).with_message("42 rows")]);
        let merged = merge(&initial(), &payload, &catalog());
        let s1 = merged.get("s1").unwrap();
        assert_eq!(s1.progress_percent, 100);
        assert_eq!(s1.message.as_deref(), Some("42 rows"));
    }

    #[test]
    fn test_backward_status_ignored() {
        let done = running(vec![StepUpdate::new("s1", StepStatus::Completed)]);
        let late = running(vec![StepUpdate::new("s1", StepStatus::Running)
            .with_progress(1, 10)
            .with_message("downloading")]);

        let merged = merge(&merge(&initial(), &done, &catalog()), &late, &catalog());
        let s1 = merged.get("s1").unwrap();
        assert_eq!(s1.status, StepStatus::Completed);
        assert_eq!(s1.progress_percent, 100);
        assert_eq!(s1.message.as_deref(), Some(COMPLETED_MESSAGE));
        assert_eq!(s1.current_count, None);
    }

    #[test]
    fn test_repeated_completion_keeps_final_percent() {
        let done = running(vec![StepUpdate::new("s1", StepStatus::Completed)]);
        let again = running(vec![StepUpdate::new("s1", StepStatus::Completed)
            .with_progress(3, 10)
            .with_message("partial")]);

        let merged = merge(&merge(&initial(), &done, &catalog()), &again, &catalog());
        let s1 = merged.get("s1").unwrap();
        assert_eq!(s1.progress_percent, 100);
        assert_eq!(s1.message.as_deref(), Some(COMPLETED_MESSAGE));
    }

    #[test]
    fn test_late_update_on_failed_step_only_touches_duration() {
        let failed = running(vec![StepUpdate::new("s2", StepStatus::Failed)
            .with_progress(2, 4)
            .with_message("boom")]);
        let late = running(vec![StepUpdate::new("s2", StepStatus::Running)
            .with_progress(4, 4)
            .with_message("retrying")
            .with_duration(900)]);

        let merged = merge(&merge(&initial(), &failed, &catalog()), &late, &catalog());
        let s2 = merged.get("s2").unwrap();
        assert_eq!(s2.status, StepStatus::Failed);
        assert_eq!(s2.progress_percent, 50);
        assert_eq!(s2.current_count, Some(2));
        assert_eq!(s2.message.as_deref(), Some("boom"));
        assert_eq!(s2.duration_ms, Some(900));
    }

    #[test]
    fn test_failed_is_not_overwritten_by_completed() {
        let failed = running(vec![StepUpdate::new("s2", StepStatus::Failed).with_message("boom")]);
        let completed = running(vec![StepUpdate::new("s2", StepStatus::Completed)]);

        let merged = merge(&merge(&initial(), &failed, &catalog()), &completed, &catalog());
        let s2 = merged.get("s2").unwrap();
        assert_eq!(s2.status, StepStatus::Failed);
        assert_eq!(s2.message.as_deref(), Some("boom"));
    }

    #[test]
    fn test_duration_updated_unconditionally() {
        let done = running(vec![StepUpdate::new("s1", StepStatus::Completed).with_duration(100)]);
        let late = running(vec![StepUpdate::new("s1", StepStatus::Running).with_duration(250)]);

        let merged = merge(&merge(&initial(), &done, &catalog()), &late, &catalog());
        assert_eq!(merged.get("s1").unwrap().duration_ms, Some(250));
    }

    #[test]
    fn test_unknown_steps_ignored() {
        let payload = running(vec![StepUpdate::new("s9", StepStatus::Running)]);
        let merged = merge(&initial(), &payload, &catalog());
        assert_eq!(merged, initial());
    }

    #[test]
    fn test_merge_is_idempotent() {
        let events = vec![
            running(vec![StepUpdate::new("s1", StepStatus::Running).with_progress(5, 10)]),
            running(vec![
                StepUpdate::new("s1", StepStatus::Completed).with_duration(40),
                StepUpdate::new("s2", StepStatus::Running).with_message("thinking"),
            ]),
            running(vec![StepUpdate::new("s2", StepStatus::Failed)]),
            ProgressPayload {
                status: ExecutionStatus::Running,
                steps: vec![StepUpdate {
                    name: "s3".to_string(),
                    status: StepStatus::Running,
                    progress: Some(ProgressDetail {
                        current: Some(7),
                        total: None,
                        message: None,
                    }),
                    duration_ms: None,
                }],
                metadata: None,
                error: None,
            },
        ];

        let mut state = initial();
        for event in &events {
            let once = merge(&state, event, &catalog());
            let twice = merge(&once, event, &catalog());
            assert_eq!(once, twice);
            state = once;
        }
    }

    #[test]
    fn test_terminal_steps_never_regress() {
        let updates = [
            StepStatus::Completed,
            StepStatus::Pending,
            StepStatus::Running,
            StepStatus::Failed,
            StepStatus::Pending,
        ];
        let mut state = initial();
        for status in updates {
            state = merge(&state, &running(vec![StepUpdate::new("s1", status)]), &catalog());
            assert_eq!(state.get("s1").unwrap().status, StepStatus::Completed);
        }
    }

    #[test]
    fn test_rebuild_from_empty_list() {
        let payload = running(vec![
            StepUpdate::new("s2", StepStatus::Running).with_progress(1, 4),
            StepUpdate::new("extra", StepStatus::Pending),
        ]);
        let merged = merge(&OrderedStepList::default(), &payload, &catalog());

        let names: Vec<_> = merged.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["s1", "s2", "s3", "s4", "extra"]);
        assert_eq!(merged.get("s1").unwrap().status, StepStatus::Pending);
        assert_eq!(merged.get("s1").unwrap().progress_percent, 0);
        assert_eq!(merged.get("s2").unwrap().label, "Analyze");
        assert_eq!(merged.get("s2").unwrap().progress_percent, 25);
        assert_eq!(merged.get("extra").unwrap().label, "extra");
    }

    #[test]
    fn test_empty_list_and_empty_batch_stays_empty() {
        let payload = running(vec![]);
        let merged = merge(&OrderedStepList::default(), &payload, &catalog());
        assert!(merged.is_empty());
    }
}
