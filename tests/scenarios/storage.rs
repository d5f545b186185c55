//! Test: Filesystem storage of a complete run

use crate::helpers::*;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use stepline::core::{Pipeline, RunStatus, StepValues};
use stepline::execution::PipelineRunner;
use stepline::notify::LogLevel;
use stepline::storage::FsRunStorage;

#[tokio::test]
async fn test_run_artifacts_on_disk() {
    let temp = tempfile::tempdir().unwrap();
    let storage = Arc::new(FsRunStorage::new(temp.path(), 3));
    let runner = PipelineRunner::new(storage.clone(), LogLevel::Info);

    let pipeline = Pipeline::new("disk", "On disk")
        .with_step(StepValues::new("a", "tag"))
        .with_step(StepValues::new("b", "show"));
    let steps = vec![
        (data_step("tag", tagger()), pipeline.steps[0].clone()),
        (
            data_step("show", scripted(Behaviour::Visualize(1), &Tracker::default())),
            pipeline.steps[1].clone(),
        ),
    ];

    let report = runner
        .run(
            "disk-1",
            &pipeline,
            steps,
            Some(texts(&["one", "two"])),
            Arc::new(AtomicBool::new(false)),
        )
        .await;
    assert_eq!(report.status(), RunStatus::Completed);

    let dir = temp.path().join("disk-1");
    assert!(dir.join("original_pipeline.json").is_file());
    assert!(dir.join("visualizations").join("1.json").is_file());
    let csv = std::fs::read_to_string(dir.join("result.csv")).unwrap();
    assert_eq!(csv, "text,upper,length\none,ONE,3\ntwo,TWO,3\n");

    assert_eq!(storage.load_pipeline("disk-1").await.unwrap(), pipeline);
    let preview = storage.result_preview("disk-1", 1).await.unwrap().unwrap();
    assert_eq!(preview.len(), 1);
}

/// Storage that cannot be initialized fails the run before any step
#[tokio::test]
async fn test_unusable_storage_fails_run() {
    let temp = tempfile::tempdir().unwrap();
    let blocker = temp.path().join("runs");
    std::fs::write(&blocker, "not a directory").unwrap();

    let runner = PipelineRunner::new(Arc::new(FsRunStorage::new(&blocker, 3)), LogLevel::Info);
    let tracker = Tracker::default();
    let report = run_steps(
        &runner,
        "blocked",
        vec![data_step("tag", scripted(Behaviour::Succeed, &tracker))],
        None,
    )
    .await;

    assert_eq!(report.status(), RunStatus::Failed);
    assert_eq!(tracker.constructed(), 0);
}
