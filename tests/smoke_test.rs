//! Smoke test - ensures basic pipeline functionality works end-to-end
//!
//! Loads a pipeline file, runs it with the built-in steps and reads the
//! stored run back the way the `runs` and `show` commands do.

use std::sync::Arc;
use std::time::Duration;
use stepline::core::{Pipeline, RunStatus, TypeRegistry};
use stepline::execution::{BlueprintCatalog, OperationRegistry, PipelineRunner, RunApi, RunInput};
use stepline::notify::LogLevel;
use stepline::operations::{register_builtins, BUILTIN_STEPS};
use stepline::storage::FsRunStorage;

#[tokio::test]
async fn smoke_test_basic_pipeline() {
    let yaml = r#"
id: "smoke"
name: "Smoke Test Pipeline"
steps:
  - uniqueId: "prep"
    stepId: "text_cleanup"
    values:
      lowercase: true
  - uniqueId: "scan"
    stepId: "word_list_scan"
    values:
      word lists:
        - name: "smoke"
          list of words:
            - word: "smoke"
            - word: "fire|flame"
              is regex: true
"#;
    let temp = tempfile::tempdir().unwrap();
    let pipeline_path = temp.path().join("pipeline.yaml");
    std::fs::write(&pipeline_path, yaml).unwrap();

    let pipeline = Pipeline::from_file(&pipeline_path).unwrap();
    pipeline.validate().unwrap();

    let types = TypeRegistry::with_builtins();
    let mut operations = OperationRegistry::new();
    register_builtins(&mut operations);
    let catalog = BlueprintCatalog::from_yaml(BUILTIN_STEPS, &types, &operations).unwrap();
    assert!(catalog.validate(&pipeline).is_empty());

    let runs_dir = temp.path().join("runs");
    let storage = FsRunStorage::new(&runs_dir, 5);
    let runner = PipelineRunner::new(Arc::new(storage.clone()), LogLevel::Info);
    let api = RunApi::new(Arc::new(catalog), Arc::new(runner));

    let input = "text\nWhere there is SMOKE there is fire\nAll clear\n";
    let handle = api.start_run(pipeline, RunInput::Csv(input.to_string())).unwrap();
    let run_id = handle.run_id().to_string();

    let report = tokio::time::timeout(Duration::from_secs(30), handle.wait())
        .await
        .expect("Pipeline timed out");
    assert_eq!(report.status(), RunStatus::Completed);

    let runs = storage.list_runs().await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].run_id, run_id);
    assert!(runs[0].has_result);

    let result = storage.result_preview(&run_id, 150).await.unwrap().unwrap();
    assert_eq!(result.columns, vec!["text", "smoke"]);
    assert_eq!(result.rows[0][1], serde_json::json!(2));
    assert_eq!(result.rows[1][1], serde_json::json!(0));
}
