//! Parameter declarations

use crate::core::picker::Picker;
use crate::core::types::ParamType;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde_json::{json, Value};
use std::sync::Arc;

/// A named, typed configuration or data slot
///
/// A parameter carrying a picker is a *static* parameter: its value is
/// chosen by the user when configuring a step. Parameters without a picker
/// describe data flowing through the payload.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub ty: Arc<ParamType>,
    pub description: String,
    pub default_value: Option<Value>,
    pub picker: Option<Picker>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, ty: Arc<ParamType>) -> Self {
        Self {
            name: name.into(),
            ty,
            description: String::new(),
            default_value: None,
            picker: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn with_picker(mut self, picker: Picker) -> Self {
        self.picker = Some(picker);
        self
    }

    pub fn is_static(&self) -> bool {
        self.picker.is_some()
    }

    pub fn is_complex(&self) -> bool {
        self.ty.is_complex()
    }

    /// The declared default, falling back to the type's default
    pub fn effective_default(&self) -> Option<Value> {
        match &self.default_value {
            Some(Value::Null) | None => self.ty.default_value().cloned(),
            Some(v) => Some(v.clone()),
        }
    }
}

impl Serialize for Parameter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Parameter", 5)?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field("type", self.ty.name())?;
        state.serialize_field("description", &self.description)?;
        state.serialize_field("defaultValue", &self.effective_default())?;

        let picker = self.picker.as_ref().map(|picker| {
            let mut obj = json!({
                "name": picker.name(),
                "outputType": self.ty.name(),
                "values": picker.values(),
            });
            let nested = picker.nested(&self.ty);
            if !nested.is_empty() {
                obj["parameters"] = serde_json::to_value(nested).unwrap_or(Value::Null);
            }
            obj
        });
        state.serialize_field("picker", &picker)?;
        state.end()
    }
}

/// Parameters a step declares, split by how they are supplied
#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputOutputDefinition {
    /// Chosen by the user when configuring the step
    pub static_inputs: Vec<Parameter>,
    /// Read from the payload at run time
    pub dynamic_inputs: Vec<Parameter>,
    /// Written to the payload at run time
    pub outputs: Vec<Parameter>,
}

impl InputOutputDefinition {
    pub fn dynamic_input(&self, name: &str) -> Option<&Parameter> {
        self.dynamic_inputs.iter().find(|p| p.name == name)
    }
}
