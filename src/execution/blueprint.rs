//! Step blueprints: the seam between configuration and execution

use super::operation::{OperationConstructor, OperationRegistry};
use super::panic_message;
use crate::core::{
    Config, ConfigError, InputOutputDefinition, Payload, SchemaError, StepDefinition,
    StepOutcome, StepValues, TypeRegistry,
};
use crate::notify::Notifier;
use serde_json::{json, Map, Value};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, info};

/// Reusable, immutable definition of a step bound to its operation
pub struct StepBlueprint {
    pub step_id: String,
    pub name: String,
    pub description: String,
    pub information: String,
    pub tags: Vec<String>,
    pub in_out_def: InputOutputDefinition,
    constructor: OperationConstructor,
}

impl StepBlueprint {
    pub fn new(
        step_id: impl Into<String>,
        name: impl Into<String>,
        in_out_def: InputOutputDefinition,
        constructor: OperationConstructor,
    ) -> Self {
        Self {
            step_id: step_id.into(),
            name: name.into(),
            description: String::new(),
            information: String::new(),
            tags: Vec::new(),
            in_out_def,
            constructor,
        }
    }

    /// Build a blueprint from a definition, resolving types and the operation
    pub fn from_definition(
        definition: &StepDefinition,
        types: &TypeRegistry,
        operations: &OperationRegistry,
    ) -> Result<Self, SchemaError> {
        let constructor = operations.get(&definition.id)?;
        let in_out_def = definition.parse(types)?;
        Ok(Self {
            step_id: definition.id.clone(),
            name: definition.name.clone(),
            description: definition.description.clone(),
            information: definition.information.clone(),
            tags: definition.tags.clone(),
            in_out_def,
            constructor,
        })
    }

    /// Resolve the static configuration for one invocation
    ///
    /// Invalid and missing values are reported together.
    pub fn build_config(&self, values: &Map<String, Value>) -> Result<Config, ConfigError> {
        let mut config = Config::new(&self.in_out_def.static_inputs)?;
        let mut errors = match config.set_values(values) {
            Ok(()) => Vec::new(),
            Err(e) => e.errors,
        };
        if let Err(missing) = config.ensure_ready() {
            let extra: Vec<_> = missing
                .errors
                .into_iter()
                .filter(|m| !errors.iter().any(|e| e.path == m.path))
                .collect();
            errors.extend(extra);
        }

        if errors.is_empty() {
            Ok(config)
        } else {
            Err(ConfigError { errors })
        }
    }

    /// Run one configured invocation of this step against the payload
    ///
    /// No operation is constructed unless the configuration is complete, and
    /// the operation only sees the dynamic inputs this step declares.
    /// Configuration and construction problems are logged and reported as
    /// [`StepOutcome::Failed`]; errors raised by the operation's `run` are
    /// returned to the caller.
    pub fn run(
        &self,
        step: &StepValues,
        payload: &Payload,
        notifier: &dyn Notifier,
    ) -> anyhow::Result<StepOutcome> {
        info!("Running step {} ({})", self.step_id, step.unique_id);

        let config = match self.build_config(&step.values) {
            Ok(config) => config,
            Err(e) => {
                let mut lines = vec![format!(
                    "Step '{}' has missing or invalid parameters:",
                    self.name
                )];
                lines.extend(e.errors.iter().map(|field| format!("  {}", field)));
                notifier.log_lines(crate::notify::LogLevel::Error, lines);
                return Ok(StepOutcome::Failed);
            }
        };

        let constructed = catch_unwind(AssertUnwindSafe(|| (self.constructor)(&config, notifier)));
        let mut operation = match constructed {
            Ok(Ok(operation)) => operation,
            Ok(Err(e)) => {
                notifier.error(&format!("Failed to initialize step '{}': {:?}", self.name, e));
                return Ok(StepOutcome::Failed);
            }
            Err(panic) => {
                notifier.error(&format!(
                    "Failed to initialize step '{}': panicked: {}",
                    self.name,
                    panic_message(panic.as_ref())
                ));
                return Ok(StepOutcome::Failed);
            }
        };
        debug!("Initialized operation for step {}", self.step_id);

        let view = match payload.partial_view(&self.in_out_def.dynamic_inputs) {
            Ok(view) => view,
            Err(e) => {
                notifier.error(&format!("Invalid input for step '{}': {}", self.name, e));
                return Ok(StepOutcome::Failed);
            }
        };

        operation.run(&view, notifier)
    }

    /// Description handed to frontends
    pub fn to_transfer(&self) -> Value {
        json!({
            "stepId": self.step_id,
            "name": self.name,
            "description": self.description,
            "information": self.information,
            "tags": self.tags,
            "inOutDef": serde_json::to_value(&self.in_out_def).unwrap_or(Value::Null),
        })
    }
}

impl fmt::Debug for StepBlueprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepBlueprint")
            .field("step_id", &self.step_id)
            .field("name", &self.name)
            .field("static_inputs", &self.in_out_def.static_inputs.len())
            .field("dynamic_inputs", &self.in_out_def.dynamic_inputs.len())
            .field("outputs", &self.in_out_def.outputs.len())
            .finish()
    }
}
