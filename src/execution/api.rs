//! Entry point for starting runs in the background

use super::catalog::BlueprintCatalog;
use super::runner::{PipelineRunner, RunReport};
use crate::core::{Pipeline, RunState, RunStatus, SchemaError, Table};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

/// Raw input handed to a run
#[derive(Debug, Clone, Default)]
pub enum RunInput {
    #[default]
    None,
    /// CSV text with a header row
    Csv(String),
    /// Plain text, one item per non-empty line, exposed as a `text` column
    Text(String),
    /// Already structured value
    Value(Value),
}

impl RunInput {
    pub fn into_value(self) -> Option<Value> {
        match self {
            RunInput::None => None,
            RunInput::Csv(text) => Some(Value::String(text)),
            RunInput::Text(text) => {
                let rows = text
                    .lines()
                    .map(str::trim_end)
                    .filter(|line| !line.trim().is_empty())
                    .map(|line| vec![json!(line)])
                    .collect();
                let table = Table {
                    columns: vec!["text".to_string()],
                    rows,
                };
                Some(table.into_value())
            }
            RunInput::Value(value) => Some(value),
        }
    }
}

/// Starts runs of pipelines resolved against a catalog
#[derive(Clone)]
pub struct RunApi {
    catalog: Arc<BlueprintCatalog>,
    runner: Arc<PipelineRunner>,
}

impl RunApi {
    pub fn new(catalog: Arc<BlueprintCatalog>, runner: Arc<PipelineRunner>) -> Self {
        Self { catalog, runner }
    }

    pub fn catalog(&self) -> &BlueprintCatalog {
        &self.catalog
    }

    pub fn runner(&self) -> &PipelineRunner {
        &self.runner
    }

    /// Start a run on its own task
    ///
    /// Unknown step ids are rejected before anything is spawned.
    pub fn start_run(&self, pipeline: Pipeline, input: RunInput) -> Result<RunHandle, SchemaError> {
        let steps = self.catalog.resolve(&pipeline)?;
        let run_id = new_run_id(&pipeline.id);
        let cancelled = Arc::new(AtomicBool::new(false));

        info!("Scheduling run {} ({} steps)", run_id, steps.len());

        let runner = self.runner.clone();
        let task = {
            let run_id = run_id.clone();
            let cancelled = cancelled.clone();
            tokio::spawn(async move {
                runner
                    .run(&run_id, &pipeline, steps, input.into_value(), cancelled)
                    .await
            })
        };

        Ok(RunHandle {
            run_id,
            cancelled,
            task,
        })
    }
}

/// `<pipeline id>-<first 18 characters of a v4 uuid>`
fn new_run_id(pipeline_id: &str) -> String {
    let uuid = Uuid::new_v4().to_string();
    format!("{}-{}", pipeline_id, &uuid[..18])
}

/// A run in flight
pub struct RunHandle {
    run_id: String,
    cancelled: Arc<AtomicBool>,
    task: JoinHandle<RunReport>,
}

impl RunHandle {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Ask the run to stop at its next step or item boundary
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// The flag behind [`RunHandle::cancel`], for cancelling from elsewhere
    pub fn cancellation(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the run to end
    pub async fn wait(self) -> RunReport {
        match self.task.await {
            Ok(report) => report,
            Err(e) => {
                error!("Run {} task ended abnormally: {}", self.run_id, e);
                let mut state = RunState::new(&self.run_id, "", 0);
                state.fail();
                RunReport {
                    state,
                    failed_step: None,
                }
            }
        }
    }

    /// Wait for the run and return only its final status
    pub async fn status(self) -> RunStatus {
        self.wait().await.status()
    }
}
