//! Test: Run API - background runs of catalog pipelines

use crate::helpers::*;
use serde_json::json;
use std::sync::{Arc, Mutex};
use stepline::core::{Pipeline, RunStatus, StepState, StepValues, TypeRegistry};
use stepline::execution::{BlueprintCatalog, OperationRegistry, PipelineRunner, RunApi, RunInput};
use stepline::notify::{EventSink, LogLevel, RunEvent};
use stepline::operations::{register_builtins, BUILTIN_STEPS};
use stepline::storage::InMemoryRunStorage;

fn api() -> (RunApi, Arc<InMemoryRunStorage>) {
    let types = TypeRegistry::with_builtins();
    let mut operations = OperationRegistry::new();
    register_builtins(&mut operations);
    let catalog = BlueprintCatalog::from_yaml(BUILTIN_STEPS, &types, &operations).unwrap();

    let storage = Arc::new(InMemoryRunStorage::new());
    let runner = PipelineRunner::new(storage.clone(), LogLevel::Debug);
    (RunApi::new(Arc::new(catalog), Arc::new(runner)), storage)
}

/// Plain text becomes a `text` column that built-in steps process
#[tokio::test]
async fn test_text_pipeline_with_builtin_steps() {
    let (api, storage) = api();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    api.runner()
        .add_event_sink(EventSink::callback(move |event| sink.lock().unwrap().push(event)));

    let pipeline = Pipeline::new("words", "Words")
        .with_step(StepValues::new("clean", "text_cleanup").with_value("output column", json!("clean")))
        .with_step(
            StepValues::new("scan", "word_list_scan")
                .with_value("input column", json!("clean"))
                .with_value(
                    "word lists",
                    json!([{ "name": "greetings", "list of words": [{ "word": "hello" }] }]),
                ),
        );

    let handle = api
        .start_run(pipeline, RunInput::Text("Hello  WORLD\n\nhello hello\n".to_string()))
        .unwrap();
    let run_id = handle.run_id().to_string();
    assert!(run_id.starts_with("words-"));

    let report = handle.wait().await;
    assert_eq!(report.status(), RunStatus::Completed);

    let run = storage.run(&run_id).await.unwrap();
    let result = run.result.unwrap();
    assert_eq!(result.column("clean").unwrap(), vec![json!("hello world"), json!("hello hello")]);
    assert_eq!(result.column("greetings").unwrap(), vec![json!(1), json!(2)]);
    assert!(run.visualizations.contains_key(&1));

    let events = events.lock().unwrap();
    assert!(events.iter().any(|e| matches!(
        e,
        RunEvent::Status(s) if s.step_index == 1 && s.state == StepState::Success
    )));
    assert!(events
        .iter()
        .all(|e| !matches!(e, RunEvent::Log(log) if log.run_id != run_id)));
}

/// Missing static values fail the step before its operation exists
#[tokio::test]
async fn test_missing_parameter_fails_run() {
    let (api, _storage) = api();
    let recorded = Recorded::attach(api.runner());

    let pipeline = Pipeline::new("scan", "Scan").with_step(StepValues::new("s", "word_list_scan"));
    let report = api
        .start_run(pipeline, RunInput::Csv("text\nabc\n".to_string()))
        .unwrap()
        .wait()
        .await;

    assert_eq!(report.status(), RunStatus::Failed);
    assert!(recorded.has_line(LogLevel::Error, "has missing or invalid parameters"));
    assert!(recorded.has_line(LogLevel::Error, "word lists: missing value"));
}

/// Unknown steps are rejected before a run is started
#[tokio::test]
async fn test_unknown_step_is_rejected() {
    let (api, storage) = api();
    let pipeline = Pipeline::new("ghost", "Ghost").with_step(StepValues::new("g", "does_not_exist"));

    assert!(api.start_run(pipeline, RunInput::None).is_err());
    assert!(storage.run_ids().await.is_empty());
}
