//! Step definition documents and the parameter parser
//!
//! A catalog document lists step definitions. Each definition declares its
//! static parameters, dynamic inputs and outputs as mappings from parameter
//! name to either a type expression or a detailed parameter mapping.

use crate::core::params::{InputOutputDefinition, Parameter};
use crate::core::picker::Picker;
use crate::core::types::{ParamType, TypeError, TypeRegistry, COMPLEX};
use serde::Deserialize;
use serde_json::{Map, Value};
use serde_yaml::{Mapping, Value as YamlValue};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Type name of a list of nested parameter groups
pub const COMPLEX_LIST: &str = "complex_list";

/// Keys of a parameter mapping that are not child definitions
const RESERVED_KEYS: [&str; 4] = ["type", "description", "default", "input"];

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Failed to read step definitions: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid step definition document: {0}")]
    Document(#[from] serde_yaml::Error),

    #[error("Parameter '{path}': {source}")]
    Type {
        path: String,
        #[source]
        source: TypeError,
    },

    #[error("Parameter '{path}': {message}")]
    Invalid { path: String, message: String },

    #[error("No registered operation found for Step Id {0}. Register an operation for it before loading its definition.")]
    UnknownOperation(String),

    #[error("Duplicate step id: {0}")]
    DuplicateStep(String),

    #[error("Step {index} of pipeline '{pipeline}' references unknown step id '{step_id}'")]
    UnknownStep {
        pipeline: String,
        index: usize,
        step_id: String,
    },
}

/// A document holding step definitions
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogDocument {
    pub steps: Vec<StepDefinition>,
}

impl CatalogDocument {
    pub fn from_yaml(yaml: &str) -> Result<Self, SchemaError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SchemaError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }
}

/// Declarative definition of one step
#[derive(Debug, Clone, Deserialize)]
pub struct StepDefinition {
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub information: String,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Static parameters, configured by the user
    #[serde(default)]
    pub parameters: Mapping,

    /// Dynamic inputs read from the payload
    #[serde(default)]
    pub inputs: Mapping,

    /// Outputs written to the payload
    #[serde(default)]
    pub outputs: Mapping,
}

impl StepDefinition {
    /// Resolve every declared parameter against the registry
    ///
    /// Static parameters are strict-typed and always carry a picker; dynamic
    /// inputs and outputs may name types the registry does not know yet.
    pub fn parse(&self, registry: &TypeRegistry) -> Result<InputOutputDefinition, SchemaError> {
        let statics = ParameterParser::new(registry, true);
        let dynamics = ParameterParser::new(registry, false);
        Ok(InputOutputDefinition {
            static_inputs: statics.parse_parameters(&self.parameters, "")?,
            dynamic_inputs: dynamics.parse_parameters(&self.inputs, "")?,
            outputs: dynamics.parse_parameters(&self.outputs, "")?,
        })
    }
}

/// Turns parameter definitions into [`Parameter`]s
pub struct ParameterParser<'a> {
    registry: &'a TypeRegistry,
    enforce_static: bool,
}

impl<'a> ParameterParser<'a> {
    pub fn new(registry: &'a TypeRegistry, enforce_static: bool) -> Self {
        Self {
            registry,
            enforce_static,
        }
    }

    /// Parse a mapping of definitions, keeping declaration order
    pub fn parse_parameters(
        &self,
        definitions: &Mapping,
        prefix: &str,
    ) -> Result<Vec<Parameter>, SchemaError> {
        let mut parameters = Vec::with_capacity(definitions.len());
        for (key, definition) in definitions {
            let name = key.as_str().ok_or_else(|| SchemaError::Invalid {
                path: prefix.to_string(),
                message: format!("parameter names must be strings, got {:?}", key),
            })?;
            parameters.push(self.parse_parameter(name, definition, prefix)?);
        }
        Ok(parameters)
    }

    pub fn parse_parameter(
        &self,
        name: &str,
        definition: &YamlValue,
        prefix: &str,
    ) -> Result<Parameter, SchemaError> {
        let path = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", prefix, name)
        };

        match definition {
            YamlValue::String(expression) => {
                let ty = self.resolve(expression, &path)?;
                self.finish(Parameter::new(name, ty), None, &path)
            }
            YamlValue::Mapping(mapping) => self.parse_mapping(name, mapping, &path),
            other => Err(SchemaError::Invalid {
                path,
                message: format!("expected a type name or a mapping, got {:?}", other),
            }),
        }
    }

    fn parse_mapping(
        &self,
        name: &str,
        mapping: &Mapping,
        path: &str,
    ) -> Result<Parameter, SchemaError> {
        let type_name = mapping
            .get("type")
            .and_then(YamlValue::as_str)
            .ok_or_else(|| SchemaError::Invalid {
                path: path.to_string(),
                message: "missing 'type'".to_string(),
            })?;
        let description = mapping
            .get("description")
            .and_then(YamlValue::as_str)
            .unwrap_or_default()
            .to_string();
        let default = mapping.get("default").map(|v| to_json(v, path)).transpose()?;
        let input = mapping.get("input").map(|v| to_json(v, path)).transpose()?;

        let mut parameter = match type_name {
            COMPLEX => {
                let children = self.parse_parameters(&child_definitions(mapping), path)?;
                let mut parameter = Parameter::new(name, Arc::new(ParamType::complex(children)));
                if self.enforce_static {
                    parameter = parameter.with_picker(Picker::Complex);
                }
                parameter
            }
            COMPLEX_LIST => {
                let children = self.parse_parameters(&child_definitions(mapping), path)?;
                let inner = match children.as_slice() {
                    [single] => single.ty.clone(),
                    _ => Arc::new(ParamType::complex(children.clone())),
                };
                let parameter = Parameter::new(name, Arc::new(ParamType::list(inner)));
                let picker = complex_list_picker(input.as_ref(), children, path)?;
                parameter.with_picker(picker)
            }
            expression => {
                let ty = self.resolve(expression, path)?;
                self.finish(Parameter::new(name, ty), input.as_ref(), path)?
            }
        };

        if let Some(default) = default {
            if !parameter.is_complex() && !default.is_null() {
                parameter.ty.parse(&default).map_err(|source| SchemaError::Type {
                    path: format!("{} (default)", path),
                    source,
                })?;
            }
            parameter = parameter.with_default(default);
        }
        Ok(parameter.with_description(description))
    }

    fn resolve(&self, expression: &str, path: &str) -> Result<Arc<ParamType>, SchemaError> {
        self.registry
            .parse(expression, self.enforce_static)
            .map_err(|source| SchemaError::Type {
                path: path.to_string(),
                source,
            })
    }

    fn finish(
        &self,
        parameter: Parameter,
        input: Option<&Value>,
        path: &str,
    ) -> Result<Parameter, SchemaError> {
        let picker = match input {
            Some(descriptor) => Some(Picker::from_descriptor(descriptor).map_err(|message| {
                SchemaError::Invalid {
                    path: path.to_string(),
                    message,
                }
            })?),
            None if self.enforce_static => Some(Picker::default_for(&parameter.ty)),
            None => None,
        };
        Ok(match picker {
            Some(picker) => parameter.with_picker(picker),
            None => parameter,
        })
    }
}

fn complex_list_picker(
    input: Option<&Value>,
    children: Vec<Parameter>,
    path: &str,
) -> Result<Picker, SchemaError> {
    let mut descriptor = Map::new();
    if let Some(Value::Object(options)) = input {
        descriptor.extend(options.clone());
    }
    descriptor.insert("type".to_string(), Value::from(COMPLEX_LIST));

    let mut picker =
        Picker::from_descriptor(&Value::Object(descriptor)).map_err(|message| SchemaError::Invalid {
            path: path.to_string(),
            message,
        })?;
    if let Picker::ComplexList { inner, .. } = &mut picker {
        *inner = children;
    }
    Ok(picker)
}

fn child_definitions(mapping: &Mapping) -> Mapping {
    mapping
        .iter()
        .filter(|(key, _)| !key.as_str().is_some_and(|k| RESERVED_KEYS.contains(&k)))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn to_json(value: &YamlValue, path: &str) -> Result<Value, SchemaError> {
    serde_json::to_value(value).map_err(|e| SchemaError::Invalid {
        path: path.to_string(),
        message: e.to_string(),
    })
}
