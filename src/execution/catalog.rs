//! The set of step blueprints available to pipelines

use super::blueprint::StepBlueprint;
use super::operation::OperationRegistry;
use crate::core::{CatalogDocument, Pipeline, SchemaError, StepValues, TypeRegistry};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Blueprints keyed by step id, in load order
#[derive(Debug, Default)]
pub struct BlueprintCatalog {
    blueprints: Vec<Arc<StepBlueprint>>,
    index: HashMap<String, usize>,
}

impl BlueprintCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_document(
        document: &CatalogDocument,
        types: &TypeRegistry,
        operations: &OperationRegistry,
    ) -> Result<Self, SchemaError> {
        let mut catalog = Self::new();
        for definition in &document.steps {
            catalog.insert(StepBlueprint::from_definition(definition, types, operations)?)?;
        }
        info!("Loaded {} step blueprint(s)", catalog.len());
        Ok(catalog)
    }

    pub fn from_yaml(
        yaml: &str,
        types: &TypeRegistry,
        operations: &OperationRegistry,
    ) -> Result<Self, SchemaError> {
        Self::from_document(&CatalogDocument::from_yaml(yaml)?, types, operations)
    }

    pub fn from_file<P: AsRef<Path>>(
        path: P,
        types: &TypeRegistry,
        operations: &OperationRegistry,
    ) -> Result<Self, SchemaError> {
        Self::from_document(&CatalogDocument::from_file(path)?, types, operations)
    }

    /// Add a blueprint; step ids must be unique
    pub fn insert(&mut self, blueprint: StepBlueprint) -> Result<(), SchemaError> {
        self.insert_shared(Arc::new(blueprint))
    }

    fn insert_shared(&mut self, blueprint: Arc<StepBlueprint>) -> Result<(), SchemaError> {
        if self.index.contains_key(&blueprint.step_id) {
            return Err(SchemaError::DuplicateStep(blueprint.step_id.clone()));
        }
        self.index
            .insert(blueprint.step_id.clone(), self.blueprints.len());
        self.blueprints.push(blueprint);
        Ok(())
    }

    /// Merge another catalog into this one
    pub fn extend(&mut self, other: BlueprintCatalog) -> Result<(), SchemaError> {
        for blueprint in other.blueprints {
            self.insert_shared(blueprint)?;
        }
        Ok(())
    }

    pub fn get(&self, step_id: &str) -> Option<Arc<StepBlueprint>> {
        self.index
            .get(step_id)
            .map(|&i| self.blueprints[i].clone())
    }

    pub fn blueprints(&self) -> impl Iterator<Item = &Arc<StepBlueprint>> {
        self.blueprints.iter()
    }

    pub fn len(&self) -> usize {
        self.blueprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blueprints.is_empty()
    }

    /// Pair every step of a pipeline with its blueprint
    pub fn resolve(
        &self,
        pipeline: &Pipeline,
    ) -> Result<Vec<(Arc<StepBlueprint>, StepValues)>, SchemaError> {
        pipeline
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| {
                self.get(&step.step_id)
                    .map(|blueprint| (blueprint, step.clone()))
                    .ok_or_else(|| SchemaError::UnknownStep {
                        pipeline: pipeline.id.clone(),
                        index,
                        step_id: step.step_id.clone(),
                    })
            })
            .collect()
    }

    /// Check that every step of a pipeline exists and is fully configured
    ///
    /// Returns one message per problem; an empty list means the pipeline
    /// can run.
    pub fn validate(&self, pipeline: &Pipeline) -> Vec<String> {
        let mut problems = Vec::new();
        for (index, step) in pipeline.steps.iter().enumerate() {
            let Some(blueprint) = self.get(&step.step_id) else {
                problems.push(format!(
                    "Step {} ({}): unknown step id '{}'",
                    index, step.unique_id, step.step_id
                ));
                continue;
            };
            if let Err(e) = blueprint.build_config(&step.values) {
                problems.extend(e.errors.iter().map(|field| {
                    format!("Step {} ({}): {}", index, step.unique_id, field)
                }));
            }
        }
        problems
    }
}
