//! Test utilities for stepline scenarios

#![allow(dead_code)]

use anyhow::bail;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use stepline::core::{
    InputOutputDefinition, Parameter, Payload, Pipeline, StepOutcome, StepState, StepValues,
    Table, TypeRegistry, Visualization,
};
use stepline::execution::operation::constructor;
use stepline::execution::{
    ItemOperation, ItemProcessor, OperationConstructor, PipelineRunner, RunReport, StepBlueprint,
    StepOperation, DATA_KEY,
};
use stepline::notify::{Channel, LogBatch, LogLevel, Notifier, StepStatus};
use stepline::storage::InMemoryRunStorage;

pub const RECORDER: &str = "recorder";

/// Everything the multiplexers delivered during a test
#[derive(Clone, Default)]
pub struct Recorded {
    pub logs: Arc<Mutex<Vec<LogBatch>>>,
    pub statuses: Arc<Mutex<Vec<StepStatus>>>,
}

impl Recorded {
    /// Register recording channels on both multiplexers of a runner
    pub fn attach(runner: &PipelineRunner) -> Self {
        let recorded = Self::default();

        let logs = recorded.logs.clone();
        let log_channel: Arc<dyn Channel<LogBatch>> =
            Arc::new(move |batch: &LogBatch| logs.lock().unwrap().push(batch.clone()));
        runner.logs().channels().set_channel(RECORDER, log_channel);

        let statuses = recorded.statuses.clone();
        let status_channel: Arc<dyn Channel<StepStatus>> =
            Arc::new(move |status: &StepStatus| statuses.lock().unwrap().push(status.clone()));
        runner.statuses().channels().set_channel(RECORDER, status_channel);

        recorded
    }

    pub fn lines(&self, level: LogLevel) -> Vec<String> {
        self.logs
            .lock()
            .unwrap()
            .iter()
            .filter(|batch| batch.level == level)
            .flat_map(|batch| batch.messages.clone())
            .collect()
    }

    pub fn has_line(&self, level: LogLevel, fragment: &str) -> bool {
        self.lines(level).iter().any(|line| line.contains(fragment))
    }

    /// Terminal states per step index, in emission order
    pub fn terminal_states(&self) -> Vec<(usize, StepState)> {
        self.statuses
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.state.is_terminal() && s.progress >= 100.0)
            .map(|s| (s.step_index, s.state))
            .collect()
    }

    /// Progress values reported as `Running` for one step
    pub fn running_progress(&self, step_index: usize) -> Vec<f64> {
        self.statuses
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.step_index == step_index && s.state == StepState::Running)
            .map(|s| s.progress)
            .collect()
    }
}

/// Counts constructions and runs of a scripted step
#[derive(Clone, Default)]
pub struct Tracker {
    pub constructed: Arc<AtomicUsize>,
    pub ran: Arc<AtomicUsize>,
}

impl Tracker {
    pub fn constructed(&self) -> usize {
        self.constructed.load(Ordering::SeqCst)
    }

    pub fn ran(&self) -> usize {
        self.ran.load(Ordering::SeqCst)
    }
}

/// What a scripted step does when run
#[derive(Clone)]
pub enum Behaviour {
    Succeed,
    Fail,
    Error(&'static str),
    Panic(&'static str),
    /// Add this many text visualizations, then succeed
    Visualize(usize),
    /// Read a payload key, then succeed
    Read(&'static str),
    /// Raise the flag, then succeed
    Cancel(Arc<AtomicBool>),
}

pub struct Scripted {
    behaviour: Behaviour,
    tracker: Tracker,
}

impl StepOperation for Scripted {
    fn run(&mut self, payload: &Payload, notifier: &dyn Notifier) -> anyhow::Result<StepOutcome> {
        self.tracker.ran.fetch_add(1, Ordering::SeqCst);
        match &self.behaviour {
            Behaviour::Succeed => Ok(StepOutcome::Success),
            Behaviour::Fail => {
                notifier.error("scripted failure");
                Ok(StepOutcome::Failed)
            }
            Behaviour::Error(message) => bail!("{}", message),
            Behaviour::Panic(message) => panic!("{}", message),
            Behaviour::Visualize(count) => {
                for i in 0..*count {
                    payload.add_visualization(Visualization::text(format!("panel {}", i)));
                }
                Ok(StepOutcome::Success)
            }
            Behaviour::Read(key) => {
                payload.get(key)?;
                Ok(StepOutcome::Success)
            }
            Behaviour::Cancel(flag) => {
                flag.store(true, Ordering::SeqCst);
                Ok(StepOutcome::Success)
            }
        }
    }
}

pub fn scripted(behaviour: Behaviour, tracker: &Tracker) -> OperationConstructor {
    let tracker = tracker.clone();
    constructor(move |_config, _notifier| {
        tracker.constructed.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(Scripted {
            behaviour: behaviour.clone(),
            tracker: tracker.clone(),
        }))
    })
}

/// Upper-cases the `text` column into `upper` and counts characters into `length`
///
/// Items `boom` and `panic` fail the way their names say.
pub struct Tagger;

impl ItemOperation for Tagger {
    fn input_column(&self) -> &str {
        "text"
    }

    fn output_columns(&self) -> Vec<String> {
        vec!["upper".to_string(), "length".to_string()]
    }

    fn process_item(
        &self,
        notifier: &dyn Notifier,
        _payload: &Payload,
        item: &Value,
    ) -> anyhow::Result<Vec<Value>> {
        let text = item.as_str().unwrap_or_default();
        notifier.send_status(StepState::Running, 50.0);
        match text {
            "boom" => bail!("cannot tag '{}'", text),
            "panic" => panic!("tagger panicked"),
            _ => Ok(vec![json!(text.to_uppercase()), json!(text.chars().count())]),
        }
    }
}

pub fn tagger() -> OperationConstructor {
    constructor(|_config, _notifier| Ok(Box::new(ItemProcessor::new(Tagger))))
}

/// A blueprint whose dynamic inputs are `(name, type expression)` pairs
pub fn blueprint(
    step_id: &str,
    inputs: &[(&str, &str)],
    constructor: OperationConstructor,
) -> Arc<StepBlueprint> {
    let types = TypeRegistry::with_builtins();
    let dynamic_inputs = inputs
        .iter()
        .map(|(name, ty)| Parameter::new(*name, types.parse(ty, false).unwrap()))
        .collect();
    let in_out_def = InputOutputDefinition {
        dynamic_inputs,
        ..Default::default()
    };
    Arc::new(StepBlueprint::new(step_id, step_id, in_out_def, constructor))
}

/// A blueprint reading the tabular `data` input
pub fn data_step(step_id: &str, constructor: OperationConstructor) -> Arc<StepBlueprint> {
    blueprint(step_id, &[(DATA_KEY, "table[text]")], constructor)
}

pub fn texts(items: &[&str]) -> Value {
    Table::from_rows(
        vec!["text".to_string()],
        items.iter().map(|t| vec![json!(t)]).collect(),
    )
    .unwrap()
    .into_value()
}

pub fn runner() -> (PipelineRunner, Arc<InMemoryRunStorage>, Recorded) {
    let storage = Arc::new(InMemoryRunStorage::new());
    let runner = PipelineRunner::new(storage.clone(), LogLevel::Debug);
    let recorded = Recorded::attach(&runner);
    (runner, storage, recorded)
}

/// Run blueprints in order, one step per blueprint
pub async fn run_steps(
    runner: &PipelineRunner,
    run_id: &str,
    blueprints: Vec<Arc<StepBlueprint>>,
    input: Option<Value>,
) -> RunReport {
    run_steps_with_flag(runner, run_id, blueprints, input, Arc::new(AtomicBool::new(false))).await
}

pub async fn run_steps_with_flag(
    runner: &PipelineRunner,
    run_id: &str,
    blueprints: Vec<Arc<StepBlueprint>>,
    input: Option<Value>,
    cancelled: Arc<AtomicBool>,
) -> RunReport {
    let mut pipeline = Pipeline::new("test", "Test pipeline");
    let mut steps = Vec::new();
    for (i, blueprint) in blueprints.into_iter().enumerate() {
        let values = StepValues::new(format!("step-{}", i), blueprint.step_id.clone());
        pipeline = pipeline.with_step(values.clone());
        steps.push((blueprint, values));
    }
    runner.run(run_id, &pipeline, steps, input, cancelled).await
}
