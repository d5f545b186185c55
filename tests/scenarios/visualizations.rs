//! Test: Visualizations - drained and stored once per step

use crate::helpers::*;
use stepline::core::{RunStatus, Visualization};

/// Zero panels store nothing, one is stored as is, several become one multi panel
#[tokio::test]
async fn test_visualizations_are_combined_per_step() {
    let (runner, storage, _recorded) = runner();

    let report = run_steps(
        &runner,
        "viz",
        vec![
            data_step("none", scripted(Behaviour::Visualize(0), &Tracker::default())),
            data_step("one", scripted(Behaviour::Visualize(1), &Tracker::default())),
            data_step("three", scripted(Behaviour::Visualize(3), &Tracker::default())),
        ],
        Some(texts(&["a"])),
    )
    .await;
    assert_eq!(report.status(), RunStatus::Completed);

    let stored = storage.run("viz").await.unwrap().visualizations;
    assert_eq!(stored.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(stored[&1], Visualization::text("panel 0"));
    match &stored[&2] {
        Visualization::Multi { visualizations } => {
            assert_eq!(visualizations.len(), 3);
            assert_eq!(visualizations[2], Visualization::text("panel 2"));
        }
        other => panic!("expected a multi panel, got {:?}", other),
    }
}

/// Panels of a failed step are not stored
#[tokio::test]
async fn test_failed_step_stores_no_visualization() {
    let (runner, storage, _recorded) = runner();

    run_steps(
        &runner,
        "viz-fail",
        vec![
            data_step("shows", scripted(Behaviour::Visualize(2), &Tracker::default())),
            data_step("fails", scripted(Behaviour::Fail, &Tracker::default())),
        ],
        None,
    )
    .await;

    let stored = storage.run("viz-fail").await.unwrap().visualizations;
    assert_eq!(stored.keys().copied().collect::<Vec<_>>(), vec![0]);
}
