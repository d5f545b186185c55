//! Operation contract and the registry of operation constructors

use crate::core::{Config, Payload, SchemaError, StepOutcome};
use crate::notify::Notifier;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// An initialized unit of work
///
/// Constructing an operation is its initialization: constructors receive
/// the step's ready [`Config`] and may load resources. `run` is then called
/// once with a partial view of the payload.
///
/// Expected data problems are reported by returning
/// [`StepOutcome::Failed`]; an `Err` (or a panic) signals an unexpected
/// failure. Both end the pipeline.
pub trait StepOperation: Send {
    fn run(&mut self, payload: &Payload, notifier: &dyn Notifier) -> anyhow::Result<StepOutcome>;
}

/// Builds an operation from its configuration
pub type OperationConstructor = Arc<
    dyn Fn(&Config, &dyn Notifier) -> anyhow::Result<Box<dyn StepOperation>> + Send + Sync,
>;

/// Wrap a closure as an [`OperationConstructor`]
pub fn constructor<F>(build: F) -> OperationConstructor
where
    F: Fn(&Config, &dyn Notifier) -> anyhow::Result<Box<dyn StepOperation>> + Send + Sync + 'static,
{
    Arc::new(build)
}

/// Step id to constructor mapping
#[derive(Clone, Default)]
pub struct OperationRegistry {
    constructors: HashMap<String, OperationConstructor>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor; re-registering a step id replaces it
    pub fn register<F>(&mut self, step_id: impl Into<String>, constructor: F)
    where
        F: Fn(&Config, &dyn Notifier) -> anyhow::Result<Box<dyn StepOperation>>
            + Send
            + Sync
            + 'static,
    {
        self.constructors
            .insert(step_id.into(), Arc::new(constructor));
    }

    /// Register an already wrapped constructor
    pub fn register_constructor(&mut self, step_id: impl Into<String>, constructor: OperationConstructor) {
        self.constructors.insert(step_id.into(), constructor);
    }

    pub fn get(&self, step_id: &str) -> Result<OperationConstructor, SchemaError> {
        self.constructors
            .get(step_id)
            .cloned()
            .ok_or_else(|| SchemaError::UnknownOperation(step_id.to_string()))
    }

    pub fn contains(&self, step_id: &str) -> bool {
        self.constructors.contains_key(step_id)
    }

    /// Registered step ids, sorted
    pub fn step_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

impl fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("step_ids", &self.step_ids())
            .finish()
    }
}
