//! Resolved step configuration
//!
//! A `Config` is built from a parameter schema and holds one [`Field`] per
//! parameter. Plain parameters become leaves holding a parsed value; complex
//! parameters become groups holding a nested `Config`.

use crate::core::params::Parameter;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;
use tracing::warn;

/// A problem with one configuration field, addressed by its dotted path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Aggregated configuration diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid configuration: {}", render(.errors))]
pub struct ConfigError {
    pub errors: Vec<FieldError>,
}

impl ConfigError {
    pub fn field(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            errors: vec![FieldError {
                path: path.into(),
                message: message.into(),
            }],
        }
    }

    /// Dotted paths of every offending field
    pub fn paths(&self) -> Vec<&str> {
        self.errors.iter().map(|e| e.path.as_str()).collect()
    }
}

fn render(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// One node of the configuration tree
#[derive(Debug, Clone)]
pub enum Field {
    Leaf {
        parameter: Parameter,
        value: Option<Value>,
    },
    Group {
        parameter: Parameter,
        config: Config,
    },
}

impl Field {
    pub fn parameter(&self) -> &Parameter {
        match self {
            Field::Leaf { parameter, .. } | Field::Group { parameter, .. } => parameter,
        }
    }
}

/// Borrowed result of a config lookup
#[derive(Debug, Clone, Copy)]
pub enum Entry<'a> {
    Value(&'a Value),
    Group(&'a Config),
}

/// Parameter values of one step, keyed by parameter name
#[derive(Debug, Clone, Default)]
pub struct Config {
    fields: Vec<(String, Field)>,
}

impl Config {
    /// Build a config from a schema, pre-parsing every default
    pub fn new(parameters: &[Parameter]) -> Result<Self, ConfigError> {
        let mut errors = Vec::new();
        let config = Self::build(parameters, "", &mut errors);
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(ConfigError { errors })
        }
    }

    fn build(parameters: &[Parameter], prefix: &str, errors: &mut Vec<FieldError>) -> Self {
        let mut fields = Vec::with_capacity(parameters.len());

        for parameter in parameters {
            let path = join(prefix, &parameter.name);
            let field = if parameter.is_complex() {
                let mut config = Self::build(parameter.ty.children(), &path, errors);
                if let Some(Value::Object(defaults)) = &parameter.default_value {
                    config.apply(defaults, &path, errors);
                }
                Field::Group {
                    parameter: parameter.clone(),
                    config,
                }
            } else {
                let value = match parameter.effective_default() {
                    Some(Value::Null) | None => None,
                    Some(default) => match parameter.ty.parse(&default) {
                        Ok(parsed) => Some(parsed),
                        Err(e) => {
                            errors.push(FieldError {
                                path: path.clone(),
                                message: format!("invalid default: {}", e),
                            });
                            None
                        }
                    },
                };
                Field::Leaf {
                    parameter: parameter.clone(),
                    value,
                }
            };
            fields.push((parameter.name.clone(), field));
        }

        Self { fields }
    }

    /// Apply a (possibly nested) map of raw values
    ///
    /// Every key is attempted; all problems are reported together.
    pub fn set_values(&mut self, values: &Map<String, Value>) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        self.apply(values, "", &mut errors);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError { errors })
        }
    }

    /// Set a single value; `null` clears a leaf
    pub fn set(&mut self, name: &str, value: Value) -> Result<(), ConfigError> {
        let mut values = Map::new();
        values.insert(name.to_string(), value);
        self.set_values(&values)
    }

    fn apply(&mut self, values: &Map<String, Value>, prefix: &str, errors: &mut Vec<FieldError>) {
        for (name, raw) in values {
            let path = join(prefix, name);
            let Some(field) = self.field_mut(name) else {
                errors.push(FieldError {
                    path,
                    message: "unknown parameter".to_string(),
                });
                continue;
            };

            match field {
                Field::Group { config, .. } => match raw {
                    Value::Object(nested) => config.apply(nested, &path, errors),
                    Value::Null => {}
                    other => errors.push(FieldError {
                        path,
                        message: format!("expected a group of values, got {}", other),
                    }),
                },
                Field::Leaf { parameter, value } => {
                    if raw.is_null() {
                        *value = None;
                        continue;
                    }
                    match parameter.ty.parse(raw) {
                        Ok(parsed) => *value = Some(parsed),
                        Err(e) => errors.push(FieldError {
                            path,
                            message: e.to_string(),
                        }),
                    }
                }
            }
        }
    }

    /// Dotted paths of every leaf without a value, depth first
    pub fn missing_values(&self) -> Box<dyn Iterator<Item = String> + '_> {
        Box::new(self.fields.iter().flat_map(
            |(name, field)| -> Box<dyn Iterator<Item = String> + '_> {
                match field {
                    Field::Leaf { value: Some(_), .. } => Box::new(std::iter::empty()),
                    Field::Leaf { value: None, .. } => Box::new(std::iter::once(name.clone())),
                    Field::Group { config, .. } => Box::new(
                        config
                            .missing_values()
                            .map(move |path| format!("{}.{}", name, path)),
                    ),
                }
            },
        ))
    }

    pub fn is_ready(&self) -> bool {
        self.missing_values().next().is_none()
    }

    /// Fail with one diagnostic listing every missing path
    pub fn ensure_ready(&self) -> Result<(), ConfigError> {
        let errors: Vec<FieldError> = self
            .missing_values()
            .map(|path| FieldError {
                path,
                message: "missing value".to_string(),
            })
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError { errors })
        }
    }

    pub fn get(&self, name: &str) -> Option<Entry<'_>> {
        match self.field(name)? {
            Field::Leaf { value, .. } => value.as_ref().map(Entry::Value),
            Field::Group { config, .. } => Some(Entry::Group(config)),
        }
    }

    /// Parsed value of a leaf
    pub fn value(&self, name: &str) -> Option<&Value> {
        match self.get(name)? {
            Entry::Value(value) => Some(value),
            Entry::Group(_) => None,
        }
    }

    /// Nested config of a complex field
    pub fn group(&self, name: &str) -> Option<&Config> {
        match self.get(name)? {
            Entry::Group(config) => Some(config),
            Entry::Value(_) => None,
        }
    }

    /// Typed value of a leaf, or `default` when it is absent
    pub fn get_or<T: DeserializeOwned>(&self, name: &str, default: T) -> T {
        match self.value(name) {
            Some(value) => match serde_json::from_value(value.clone()) {
                Ok(typed) => typed,
                Err(e) => {
                    warn!("Config value '{}' has an unexpected shape: {}", name, e);
                    default
                }
            },
            None => default,
        }
    }

    /// Typed value of a leaf that must be present
    pub fn require<T: DeserializeOwned>(&self, name: &str) -> Result<T, ConfigError> {
        let value = self
            .value(name)
            .ok_or_else(|| ConfigError::field(name, "missing value"))?;
        serde_json::from_value(value.clone()).map_err(|e| ConfigError::field(name, e.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Current values as a nested object; unset leaves are omitted
    pub fn to_value(&self) -> Value {
        let mut out = Map::new();
        for (name, field) in &self.fields {
            match field {
                Field::Leaf { value: Some(v), .. } => {
                    out.insert(name.clone(), v.clone());
                }
                Field::Leaf { value: None, .. } => {}
                Field::Group { config, .. } => {
                    out.insert(name.clone(), config.to_value());
                }
            }
        }
        Value::Object(out)
    }

    fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, f)| f)
    }

    fn field_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.fields.iter_mut().find(|(n, _)| n == name).map(|(_, f)| f)
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}
