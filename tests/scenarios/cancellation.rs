//! Test: Cancellation - runs stop at the next step boundary

use crate::helpers::*;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use stepline::core::{Payload, RunStatus, StepOutcome, StepState};
use stepline::execution::{ItemProcessor, DATA_KEY};
use stepline::notify::{NotificationDomain, RunNotifier};

/// A flag raised during step 1 prevents step 2 from starting
#[tokio::test]
async fn test_cancel_between_steps() {
    let (runner, storage, recorded) = runner();
    let flag = Arc::new(AtomicBool::new(false));
    let later = Tracker::default();

    let report = run_steps_with_flag(
        &runner,
        "cancel",
        vec![
            data_step("first", scripted(Behaviour::Cancel(flag.clone()), &Tracker::default())),
            data_step("later", scripted(Behaviour::Succeed, &later)),
        ],
        Some(texts(&["a"])),
        flag,
    )
    .await;

    assert_eq!(report.status(), RunStatus::Cancelled);
    assert_eq!(report.failed_step, None);
    assert_eq!(later.constructed(), 0);
    assert_eq!(recorded.terminal_states(), vec![(0, StepState::Success)]);
    assert!(storage.run("cancel").await.unwrap().result.is_none());
}

/// A run cancelled before it starts runs no step
#[tokio::test]
async fn test_cancelled_before_first_step() {
    let (runner, _storage, _recorded) = runner();
    let tracker = Tracker::default();
    let flag = Arc::new(AtomicBool::new(true));

    let report = run_steps_with_flag(
        &runner,
        "early",
        vec![data_step("tag", scripted(Behaviour::Succeed, &tracker))],
        None,
        flag,
    )
    .await;

    assert_eq!(report.status(), RunStatus::Cancelled);
    assert_eq!(tracker.constructed(), 0);
}

/// Items not yet started when the flag is raised are skipped
#[test]
fn test_cancelled_items_are_skipped() {
    let payload = Payload::new();
    payload.set(DATA_KEY, texts(&["a", "b", "c"])).unwrap();
    let notifier = RunNotifier::with_cancellation(
        Default::default(),
        Default::default(),
        NotificationDomain::new("skip", "test"),
        Arc::new(AtomicBool::new(true)),
    );

    let report = ItemProcessor::new(Tagger).process(&payload, &notifier).unwrap();
    assert_eq!(report.skipped, 3);
    assert_eq!(report.outcome(), StepOutcome::Failed);
}
