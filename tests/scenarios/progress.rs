//! Test: Progress - observers see smooth, non-decreasing progress

use crate::helpers::*;
use std::sync::Arc;
use stepline::core::RunStatus;
use stepline::execution::PipelineRunner;
use stepline::notify::LogLevel;
use stepline::storage::InMemoryRunStorage;

/// Items finish in any order on the worker threads, yet progress never goes back
#[tokio::test]
async fn test_progress_is_monotonic_over_items() {
    let (runner, _storage, recorded) = runner();
    let items: Vec<String> = (0..200).map(|i| format!("item {}", i)).collect();
    let items: Vec<&str> = items.iter().map(String::as_str).collect();

    let report = run_steps(
        &runner,
        "progress",
        vec![data_step("tag", tagger())],
        Some(texts(&items)),
    )
    .await;
    assert_eq!(report.status(), RunStatus::Completed);

    let progress = recorded.running_progress(0);
    assert!(progress.len() > 1);
    assert_eq!(progress[0], 0.0);
    assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{:?}", progress);
    assert!(progress.iter().all(|p| (0.0..=100.0).contains(p)));
    assert_eq!(progress.last().copied(), Some(100.0));
}

/// With a single worker thread items report in order
#[tokio::test]
async fn test_single_worker_progress_follows_items() {
    let runner = PipelineRunner::new(Arc::new(InMemoryRunStorage::new()), LogLevel::Info)
        .with_worker_threads(Some(1));
    let recorded = Recorded::attach(&runner);

    let report = run_steps(
        &runner,
        "sequential",
        vec![data_step("tag", tagger())],
        Some(texts(&["a", "b", "c", "d"])),
    )
    .await;
    assert_eq!(report.status(), RunStatus::Completed);

    assert_eq!(
        recorded.running_progress(0),
        vec![0.0, 12.5, 25.0, 37.5, 50.0, 62.5, 75.0, 87.5, 100.0]
    );
}

/// Progress of one step is scoped to that step's index
#[tokio::test]
async fn test_statuses_are_addressed_to_their_step() {
    let (runner, _storage, recorded) = runner();

    run_steps(
        &runner,
        "addressed",
        vec![
            data_step("first", scripted(Behaviour::Succeed, &Tracker::default())),
            data_step("tag", tagger()),
        ],
        Some(texts(&["a", "b"])),
    )
    .await;

    assert_eq!(recorded.running_progress(0), vec![0.0]);
    let second = recorded.running_progress(1);
    assert_eq!(second.first().copied(), Some(0.0));
    assert!(second.len() > 1);

    let statuses = recorded.statuses.lock().unwrap();
    assert!(statuses.iter().all(|s| s.run_id == "addressed" && s.pipeline_id == "test"));
}
