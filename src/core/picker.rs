//! UI picker descriptors attached to static parameters
//!
//! Pickers carry no execution semantics; they are parsed from step
//! definitions and handed back to the frontend unchanged.

use crate::core::params::Parameter;
use crate::core::types::ParamType;
use serde_json::{json, Map, Value};

/// Default maximum number of entries in a complex list
pub const DEFAULT_MAX_LENGTH: usize = 50;

/// Default entry label format for complex lists
pub const DEFAULT_ENTRY_FORMAT: &str = "<value>";

/// How the frontend lets a user pick a parameter value
#[derive(Debug, Clone)]
pub enum Picker {
    TextField,
    Checkbox,
    List { possibilities: Vec<String> },
    Slider { min: f64, max: f64, step: f64 },
    Complex,
    ComplexList {
        max_length: usize,
        entry_format: String,
        inner: Vec<Parameter>,
    },
    /// A picker this engine does not know, kept verbatim
    Custom { name: String, values: Map<String, Value> },
}

impl Picker {
    pub fn name(&self) -> &str {
        match self {
            Picker::TextField => "text_field",
            Picker::Checkbox => "checkbox",
            Picker::List { .. } => "list",
            Picker::Slider { .. } => "slider",
            Picker::Complex => "complex",
            Picker::ComplexList { .. } => "complex_list",
            Picker::Custom { name, .. } => name,
        }
    }

    /// Picker-specific options
    pub fn values(&self) -> Map<String, Value> {
        let value = match self {
            Picker::TextField | Picker::Checkbox | Picker::Complex => json!({}),
            Picker::List { possibilities } => json!({ "possibilities": possibilities }),
            Picker::Slider { min, max, step } => json!({ "min": min, "max": max, "step": step }),
            Picker::ComplexList {
                max_length,
                entry_format,
                ..
            } => json!({ "max_length": max_length, "entry_format": entry_format }),
            Picker::Custom { values, .. } => Value::Object(values.clone()),
        };
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    /// Picker used when a static parameter does not name one
    pub fn default_for(ty: &ParamType) -> Picker {
        if ty.is_complex() {
            Picker::Complex
        } else if ty.name() == "bool" {
            Picker::Checkbox
        } else {
            Picker::TextField
        }
    }

    /// Nested parameters shown by complex pickers
    pub fn nested<'a>(&'a self, ty: &'a ParamType) -> &'a [Parameter] {
        match self {
            Picker::Complex => ty.children(),
            Picker::ComplexList { inner, .. } => inner,
            _ => &[],
        }
    }

    /// Parse a descriptor: either a picker name or a mapping with a `type` key
    pub fn from_descriptor(descriptor: &Value) -> Result<Picker, String> {
        match descriptor {
            Value::String(name) => Self::from_parts(name, &Map::new()),
            Value::Object(obj) => {
                let name = obj
                    .get("type")
                    .and_then(Value::as_str)
                    .ok_or_else(|| format!("picker descriptor has no 'type': {}", descriptor))?;
                let mut options = obj.clone();
                options.remove("type");
                Self::from_parts(name, &options)
            }
            other => Err(format!("cannot parse picker from {}", other)),
        }
    }

    fn from_parts(name: &str, options: &Map<String, Value>) -> Result<Picker, String> {
        let number = |key: &str| -> Result<f64, String> {
            options
                .get(key)
                .and_then(Value::as_f64)
                .ok_or_else(|| format!("{} picker needs a numeric '{}'", name, key))
        };

        match name {
            "text_field" => Ok(Picker::TextField),
            "checkbox" => Ok(Picker::Checkbox),
            "complex" => Ok(Picker::Complex),
            "list" => {
                let possibilities = options
                    .get("possibilities")
                    .and_then(Value::as_array)
                    .ok_or_else(|| "list picker needs 'possibilities'".to_string())?
                    .iter()
                    .map(|p| match p {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect();
                Ok(Picker::List { possibilities })
            }
            "slider" => Ok(Picker::Slider {
                min: number("min")?,
                max: number("max")?,
                step: number("step")?,
            }),
            "complex_list" => Ok(Picker::ComplexList {
                max_length: options
                    .get("max_length")
                    .and_then(Value::as_u64)
                    .map(|n| n as usize)
                    .unwrap_or(DEFAULT_MAX_LENGTH),
                entry_format: options
                    .get("entry_format")
                    .and_then(Value::as_str)
                    .unwrap_or(DEFAULT_ENTRY_FORMAT)
                    .to_string(),
                inner: Vec::new(),
            }),
            other => Ok(Picker::Custom {
                name: other.to_string(),
                values: options.clone(),
            }),
        }
    }
}
