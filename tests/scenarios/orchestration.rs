//! Test: Orchestration - a failing step aborts the pipeline

use crate::helpers::*;
use stepline::core::{RunStatus, StepState};
use stepline::notify::LogLevel;

/// Step 2 reports failure: step 3 never runs and no result is stored
#[tokio::test]
async fn test_failed_step_aborts_pipeline() {
    let (runner, storage, recorded) = runner();
    let (first, second, third) = (Tracker::default(), Tracker::default(), Tracker::default());

    let report = run_steps(
        &runner,
        "abort",
        vec![
            data_step("first", scripted(Behaviour::Succeed, &first)),
            data_step("second", scripted(Behaviour::Fail, &second)),
            data_step("third", scripted(Behaviour::Succeed, &third)),
        ],
        Some(texts(&["a", "b"])),
    )
    .await;

    assert_eq!(report.status(), RunStatus::Failed);
    assert_eq!(report.failed_step, Some(1));
    assert_eq!(report.state.completed_steps, 1);

    assert_eq!(first.ran(), 1);
    assert_eq!(second.ran(), 1);
    assert_eq!(third.constructed(), 0);
    assert_eq!(third.ran(), 0);

    assert_eq!(
        recorded.terminal_states(),
        vec![(0, StepState::Success), (1, StepState::Failed)]
    );
    assert!(storage.run("abort").await.unwrap().result.is_none());
}

/// An error raised by an operation is handled like a reported failure
#[tokio::test]
async fn test_raised_error_aborts_pipeline() {
    let (runner, storage, recorded) = runner();
    let after = Tracker::default();

    let report = run_steps(
        &runner,
        "raise",
        vec![
            data_step("raiser", scripted(Behaviour::Error("disk on fire"), &Tracker::default())),
            data_step("after", scripted(Behaviour::Succeed, &after)),
        ],
        None,
    )
    .await;

    assert_eq!(report.status(), RunStatus::Failed);
    assert_eq!(report.failed_step, Some(0));
    assert_eq!(after.ran(), 0);
    assert!(recorded.has_line(LogLevel::Error, "disk on fire"));
    assert!(storage.run("raise").await.unwrap().result.is_none());
}

/// A panicking operation fails the run instead of tearing down the runner
#[tokio::test]
async fn test_panicking_step_aborts_pipeline() {
    let (runner, _storage, recorded) = runner();

    let report = run_steps(
        &runner,
        "panic",
        vec![data_step("panics", scripted(Behaviour::Panic("unexpected state"), &Tracker::default()))],
        None,
    )
    .await;

    assert_eq!(report.status(), RunStatus::Failed);
    assert!(recorded.has_line(LogLevel::Error, "unexpected state"));
    assert_eq!(recorded.terminal_states(), vec![(0, StepState::Failed)]);
}

/// Reading a key the step did not declare fails the step
#[tokio::test]
async fn test_undeclared_read_fails_step() {
    let (runner, _storage, recorded) = runner();

    let report = run_steps(
        &runner,
        "undeclared",
        vec![
            data_step("seeds", scripted(Behaviour::Succeed, &Tracker::default())),
            blueprint("snoop", &[], scripted(Behaviour::Read("data"), &Tracker::default())),
        ],
        Some(texts(&["x"])),
    )
    .await;

    assert_eq!(report.status(), RunStatus::Failed);
    assert_eq!(report.failed_step, Some(1));
    assert!(recorded.has_line(LogLevel::Error, "data is not in this partial view"));
}

/// The last step's data becomes the run result
#[tokio::test]
async fn test_successful_run_stores_result() {
    let (runner, storage, recorded) = runner();

    let report = run_steps(
        &runner,
        "ok",
        vec![
            data_step("tag", tagger()),
            data_step("noop", scripted(Behaviour::Succeed, &Tracker::default())),
        ],
        Some(texts(&["ab", "c"])),
    )
    .await;

    assert_eq!(report.status(), RunStatus::Completed);
    assert_eq!(report.state.completed_steps, 2);
    assert_eq!(
        recorded.terminal_states(),
        vec![(0, StepState::Success), (1, StepState::Success)]
    );

    let result = storage.run("ok").await.unwrap().result.unwrap();
    assert_eq!(result.columns, vec!["text", "upper", "length"]);
    assert_eq!(result.column("upper").unwrap(), vec!["AB", "C"]);
}
