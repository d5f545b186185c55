//! Test: Input seeding - the run input lands in the first tabular data input

use crate::helpers::*;
use serde_json::json;
use stepline::core::RunStatus;
use stepline::execution::DATA_KEY;
use stepline::notify::LogLevel;

/// CSV text is parsed through the declaring step's table type
#[tokio::test]
async fn test_csv_input_is_parsed() {
    let (runner, storage, _recorded) = runner();

    let report = run_steps(
        &runner,
        "csv",
        vec![data_step("tag", tagger())],
        Some(json!("text,id\nhello,1\nworld,2\n")),
    )
    .await;
    assert_eq!(report.status(), RunStatus::Completed);

    let result = storage.run("csv").await.unwrap().result.unwrap();
    assert_eq!(result.column("id").unwrap(), vec![json!(1), json!(2)]);
    assert_eq!(result.column("upper").unwrap(), vec![json!("HELLO"), json!("WORLD")]);
}

/// Input missing a required column fails the run before any step runs
#[tokio::test]
async fn test_input_without_required_column_fails() {
    let (runner, _storage, recorded) = runner();
    let tracker = Tracker::default();

    let report = run_steps(
        &runner,
        "bad-input",
        vec![data_step("tag", scripted(Behaviour::Succeed, &tracker))],
        Some(json!("title\nhello\n")),
    )
    .await;

    assert_eq!(report.status(), RunStatus::Failed);
    assert_eq!(report.failed_step, None);
    assert_eq!(tracker.constructed(), 0);
    assert!(recorded.has_line(LogLevel::Error, "Invalid run input"));
}

/// With no step declaring tabular data, the input is ignored with a warning
#[tokio::test]
async fn test_undeclared_input_is_ignored() {
    let (runner, storage, recorded) = runner();

    let report = run_steps(
        &runner,
        "ignored",
        vec![
            blueprint("plain", &[(DATA_KEY, "string")], scripted(Behaviour::Succeed, &Tracker::default())),
        ],
        Some(texts(&["a"])),
    )
    .await;

    assert_eq!(report.status(), RunStatus::Completed);
    assert!(recorded.has_line(LogLevel::Warning, "No step declares a tabular 'data' input"));
    assert!(recorded.has_line(LogLevel::Warning, "no result was stored"));
    assert!(storage.run("ignored").await.unwrap().result.is_none());
}

/// A later step may be the first to declare the data input
#[tokio::test]
async fn test_first_declaring_step_wins() {
    let (runner, storage, _recorded) = runner();

    let report = run_steps(
        &runner,
        "later",
        vec![
            blueprint("prepare", &[], scripted(Behaviour::Succeed, &Tracker::default())),
            data_step("tag", tagger()),
        ],
        Some(texts(&["x"])),
    )
    .await;

    assert_eq!(report.status(), RunStatus::Completed);
    let result = storage.run("later").await.unwrap().result.unwrap();
    assert_eq!(result.column("upper").unwrap(), vec![json!("X")]);
}
