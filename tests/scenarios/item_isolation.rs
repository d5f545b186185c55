//! Test: Item isolation - one bad item never stops the others

use crate::helpers::*;
use serde_json::{json, Value};
use stepline::core::{Payload, RunStatus, StepOutcome};
use stepline::execution::{ItemProcessor, StepOperation, DATA_KEY};
use stepline::notify::{LogLevel, NotificationDomain, RunNotifier};

fn notifier() -> RunNotifier {
    RunNotifier::new(
        Default::default(),
        Default::default(),
        NotificationDomain::new("items", "test"),
    )
}

/// Item 3 of 5 raises: the others still get real output
#[test]
fn test_failing_item_is_isolated() {
    let payload = Payload::new();
    payload
        .set(DATA_KEY, texts(&["a", "bb", "boom", "dddd", "e"]))
        .unwrap();

    let mut processor = ItemProcessor::new(Tagger);
    let report = processor.process(&payload, &notifier()).unwrap();
    assert_eq!(report.total, 5);
    assert_eq!(report.succeeded, 4);
    assert_eq!(report.failed, 1);
    assert_eq!(report.outcome(), StepOutcome::Failed);

    let table = payload.get_table(DATA_KEY).unwrap();
    assert_eq!(
        table.column("upper").unwrap(),
        vec![json!("A"), json!("BB"), Value::Null, json!("DDDD"), json!("E")]
    );
    assert_eq!(table.column("length").unwrap()[3], json!(4));
}

/// A panicking item is contained the same way
#[test]
fn test_panicking_item_is_isolated() {
    let payload = Payload::new();
    payload.set(DATA_KEY, texts(&["panic", "ok"])).unwrap();

    let mut processor = ItemProcessor::new(Tagger);
    let outcome = processor.run(&payload, &notifier()).unwrap();
    assert_eq!(outcome, StepOutcome::Failed);

    let table = payload.get_table(DATA_KEY).unwrap();
    assert_eq!(table.column("upper").unwrap(), vec![Value::Null, json!("OK")]);
}

/// Within a run, a failed item fails the step after all items ran
#[tokio::test]
async fn test_item_failure_fails_run_with_partial_output_logged() {
    let (runner, storage, recorded) = runner();

    let report = run_steps(
        &runner,
        "items",
        vec![data_step("tag", tagger())],
        Some(texts(&["x", "boom", "y"])),
    )
    .await;

    assert_eq!(report.status(), RunStatus::Failed);
    assert!(recorded.has_line(LogLevel::Error, "Item 2/3"));
    assert!(recorded.has_line(LogLevel::Warning, "1 of 3 failed. Data may be incomplete."));
    assert!(storage.run("items").await.unwrap().result.is_none());
}
