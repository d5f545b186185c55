//! Pipeline documents

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::Path;

/// One step's saved configuration within a pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepValues {
    /// Identifies this occurrence of the step within the pipeline
    pub unique_id: String,

    /// Blueprint the step is an instance of
    pub step_id: String,

    /// Raw static parameter values, possibly nested for complex parameters
    #[serde(default)]
    pub values: Map<String, Value>,
}

impl StepValues {
    pub fn new(unique_id: impl Into<String>, step_id: impl Into<String>) -> Self {
        Self {
            unique_id: unique_id.into(),
            step_id: step_id.into(),
            values: Map::new(),
        }
    }

    pub fn with_value(mut self, name: impl Into<String>, value: Value) -> Self {
        self.values.insert(name.into(), value);
        self
    }
}

/// An ordered list of configured steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pipeline {
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub information: String,

    #[serde(default)]
    pub steps: Vec<StepValues>,

    #[serde(default)]
    pub tags: Vec<String>,
}

impl Pipeline {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            information: String::new(),
            steps: Vec::new(),
            tags: Vec::new(),
        }
    }

    pub fn with_step(mut self, step: StepValues) -> Self {
        self.steps.push(step);
        self
    }

    /// Load a pipeline from a YAML or JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse a pipeline from YAML (JSON is accepted as well)
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let pipeline: Pipeline = serde_yaml::from_str(yaml)?;
        pipeline.validate()?;
        Ok(pipeline)
    }

    /// Check structural rules that do not need the step catalog
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            anyhow::bail!("Pipeline id must not be empty");
        }

        let mut seen_ids = HashSet::new();
        for step in &self.steps {
            if !seen_ids.insert(&step.unique_id) {
                anyhow::bail!("Duplicate step uniqueId: {}", step.unique_id);
            }
        }
        Ok(())
    }

    /// Step ids in execution order
    pub fn step_ids(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.step_id.as_str()).collect()
    }
}
