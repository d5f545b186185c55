//! Pipeline runner - drives one run through its steps in order

use super::blueprint::StepBlueprint;
use super::panic_message;
use super::parallel::DATA_KEY;
use crate::core::{
    Parameter, ParamType, Payload, PayloadError, Pipeline, RunState, RunStatus, StepOutcome,
    StepState, StepValues, Visualization,
};
use crate::notify::{
    EventChannel, EventSink, LogLevel, LogManager, NotificationDomain, Notifier, RunNotifier,
    StatusManager, FRONTEND_CHANNEL,
};
use crate::storage::{FsRunStorage, RunStorage};
use anyhow::Result;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Runtime settings of a runner
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Messages below this level never reach any channel
    pub min_log_level: LogLevel,

    /// Directory holding one sub-directory per run
    pub runs_dir: PathBuf,

    /// Number of runs kept on disk
    pub max_runs: usize,

    /// Threads for item-level parallelism; `None` uses the rayon global pool
    pub worker_threads: Option<usize>,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            min_log_level: LogLevel::Info,
            runs_dir: data_dir.join("stepline").join("runs"),
            max_runs: 10,
            worker_threads: None,
        }
    }
}

/// Final state of a finished run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub state: RunState,

    /// Index of the step that ended the run, if one did
    pub failed_step: Option<usize>,
}

impl RunReport {
    pub fn run_id(&self) -> &str {
        &self.state.run_id
    }

    pub fn status(&self) -> RunStatus {
        self.state.status
    }
}

/// Executes resolved pipelines against a run storage
pub struct PipelineRunner {
    storage: Arc<dyn RunStorage>,
    logs: Arc<LogManager>,
    statuses: Arc<StatusManager>,
    worker_threads: Option<usize>,
}

impl PipelineRunner {
    pub fn new(storage: Arc<dyn RunStorage>, min_log_level: LogLevel) -> Self {
        Self {
            storage,
            logs: Arc::new(LogManager::new(min_log_level)),
            statuses: Arc::new(StatusManager::new()),
            worker_threads: None,
        }
    }

    /// Runner storing artifacts on disk as configured
    pub fn from_settings(settings: &RunnerSettings) -> Self {
        let storage = FsRunStorage::new(&settings.runs_dir, settings.max_runs);
        Self::new(Arc::new(storage), settings.min_log_level)
            .with_worker_threads(settings.worker_threads)
    }

    /// Limit item-level work to `threads` threads per step
    pub fn with_worker_threads(mut self, threads: Option<usize>) -> Self {
        self.worker_threads = threads.map(|n| n.max(1));
        self
    }

    pub fn logs(&self) -> &Arc<LogManager> {
        &self.logs
    }

    pub fn statuses(&self) -> &Arc<StatusManager> {
        &self.statuses
    }

    /// Attach (or replace) the frontend channel on both multiplexers
    pub fn add_event_sink(&self, sink: EventSink) {
        let channel = Arc::new(EventChannel::new(sink));
        self.logs
            .channels()
            .set_channel(FRONTEND_CHANNEL, channel.clone());
        self.statuses.channels().set_channel(FRONTEND_CHANNEL, channel);
    }

    /// Execute the steps of a pipeline in order
    ///
    /// The first step that fails, raises or panics ends the run; later steps
    /// never start and no result is stored. Setting `cancelled` stops the run
    /// at the next step or item boundary.
    pub async fn run(
        &self,
        run_id: &str,
        pipeline: &Pipeline,
        steps: Vec<(Arc<StepBlueprint>, StepValues)>,
        input: Option<Value>,
        cancelled: Arc<AtomicBool>,
    ) -> RunReport {
        let mut state = RunState::new(run_id, &pipeline.id, steps.len());
        let notifier = RunNotifier::with_cancellation(
            self.logs.clone(),
            self.statuses.clone(),
            NotificationDomain::new(run_id, &pipeline.id),
            cancelled.clone(),
        )
        .with_worker_threads(self.worker_threads);

        info!("Starting run {} of pipeline {}", run_id, pipeline.id);

        if let Err(e) = self.storage.initialize_run(run_id, pipeline).await {
            notifier.error(&format!("Could not initialize run storage: {:?}", e));
            state.fail();
            return RunReport {
                state,
                failed_step: None,
            };
        }

        let report = self
            .execute(run_id, steps, input, &cancelled, &notifier, state)
            .await;
        if let Err(e) = self.storage.finish_run(run_id).await {
            warn!("Could not release storage of run {}: {:?}", run_id, e);
        }
        report
    }

    async fn execute(
        &self,
        run_id: &str,
        steps: Vec<(Arc<StepBlueprint>, StepValues)>,
        input: Option<Value>,
        cancelled: &AtomicBool,
        notifier: &RunNotifier,
        mut state: RunState,
    ) -> RunReport {
        let payload = Payload::new();
        if let Err(message) = seed_input(&steps, input, &payload, notifier) {
            notifier.error(&message);
            state.fail();
            return RunReport {
                state,
                failed_step: None,
            };
        }

        let last = steps.len().saturating_sub(1);
        for (index, (blueprint, step)) in steps.into_iter().enumerate() {
            if cancelled.load(Ordering::SeqCst) {
                warn!("Run {} cancelled before step {}", run_id, index);
                state.cancel();
                return RunReport {
                    state,
                    failed_step: None,
                };
            }

            let notifier = notifier.for_step(index);
            state.advance(index);
            notifier.send_status(StepState::Running, 0.0);

            let name = blueprint.name.clone();
            let result = {
                let payload = payload.clone();
                let notifier = notifier.clone();
                tokio::task::spawn_blocking(move || blueprint.run(&step, &payload, &notifier))
                    .await
            };

            let failure = match result {
                Ok(Ok(StepOutcome::Success)) => None,
                Ok(Ok(StepOutcome::Failed)) => Some(format!("Step '{}' failed", name)),
                Ok(Err(e)) => Some(format!("Step '{}' raised an error: {:?}", name, e)),
                Err(e) if e.is_panic() => Some(format!(
                    "Step '{}' panicked: {}",
                    name,
                    panic_message(e.into_panic().as_ref())
                )),
                Err(e) => Some(format!("Step '{}' did not finish: {}", name, e)),
            };

            if let Some(message) = failure {
                error!("Run {}: {}", run_id, message);
                notifier.error(&message);
                notifier.send_status(StepState::Failed, 100.0);
                if cancelled.load(Ordering::SeqCst) {
                    state.cancel();
                } else {
                    state.fail();
                }
                return RunReport {
                    state,
                    failed_step: Some(index),
                };
            }

            if let Err(e) = self.persist_step(run_id, index, index == last, &payload, &notifier).await {
                notifier.error(&format!("Could not store the output of step '{}': {:?}", name, e));
                notifier.send_status(StepState::Failed, 100.0);
                state.fail();
                return RunReport {
                    state,
                    failed_step: Some(index),
                };
            }

            notifier.send_status(StepState::Success, 100.0);
            state.step_succeeded();
        }

        info!("Run {} completed", run_id);
        state.complete();
        RunReport {
            state,
            failed_step: None,
        }
    }

    /// Store what a successful step left on the payload
    async fn persist_step(
        &self,
        run_id: &str,
        index: usize,
        is_last: bool,
        payload: &Payload,
        notifier: &RunNotifier,
    ) -> Result<()> {
        if let Some(visualization) = Visualization::combine(payload.pop_visualizations()) {
            self.storage
                .save_visualization(run_id, index, &visualization)
                .await?;
        }

        if is_last {
            match payload.get_table(DATA_KEY) {
                Ok(data) => self.storage.save_result(run_id, &data).await?,
                Err(PayloadError::Missing(_)) => {
                    notifier.warn("The pipeline produced no data; no result was stored")
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

/// Seed the root payload with the run input
///
/// The input is parsed through the first tabular `data` input any step
/// declares.
fn seed_input(
    steps: &[(Arc<StepBlueprint>, StepValues)],
    input: Option<Value>,
    payload: &Payload,
    notifier: &dyn Notifier,
) -> std::result::Result<(), String> {
    let Some(input) = input else {
        return Ok(());
    };

    let Some(parameter) = data_input(steps) else {
        notifier.warn("No step declares a tabular 'data' input; the run input is not used");
        return Ok(());
    };

    let parsed = parameter
        .ty
        .parse(&input)
        .map_err(|e| format!("Invalid run input for '{}': {}", parameter.ty, e))?;
    payload
        .set(DATA_KEY, parsed)
        .map_err(|e| format!("Could not store the run input: {}", e))
}

fn data_input(steps: &[(Arc<StepBlueprint>, StepValues)]) -> Option<&Parameter> {
    let tabular = ParamType::table(Vec::new());
    steps
        .iter()
        .flat_map(|(blueprint, _)| blueprint.in_out_def.dynamic_inputs.iter())
        .find(|parameter| parameter.name == DATA_KEY && tabular.accepts(&parameter.ty))
}
