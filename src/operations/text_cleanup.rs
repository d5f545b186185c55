//! Text normalization applied item by item

use crate::core::{Config, Payload};
use crate::execution::SingleValueOperation;
use crate::notify::Notifier;
use anyhow::bail;
use serde_json::Value;

pub const STEP_ID: &str = "text_cleanup";

#[derive(Debug, Clone)]
pub struct TextCleanup {
    input_column: String,
    output_column: String,
    lowercase: bool,
    ascii_only: bool,
    collapse_whitespace: bool,
}

impl TextCleanup {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let input_column: String = config.require("input column")?;
        let output_column: String = config.get_or("output column", String::new());
        Ok(Self {
            output_column: if output_column.trim().is_empty() {
                input_column.clone()
            } else {
                output_column
            },
            input_column,
            lowercase: config.get_or("lowercase", true),
            ascii_only: config.get_or("remove non-ascii", true),
            collapse_whitespace: config.get_or("collapse whitespace", true),
        })
    }

    pub fn clean(&self, text: &str) -> String {
        let mut cleaned = String::with_capacity(text.len());
        for c in text.chars() {
            if self.ascii_only && !c.is_ascii() {
                continue;
            }
            if self.lowercase {
                cleaned.extend(c.to_lowercase());
            } else {
                cleaned.push(c);
            }
        }

        if self.collapse_whitespace {
            cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
        } else {
            cleaned
        }
    }
}

impl SingleValueOperation for TextCleanup {
    fn input_column(&self) -> &str {
        &self.input_column
    }

    fn output_column(&self) -> &str {
        &self.output_column
    }

    fn process_value(
        &self,
        _notifier: &dyn Notifier,
        _payload: &Payload,
        item: &Value,
    ) -> anyhow::Result<Value> {
        match item {
            Value::Null => Ok(Value::Null),
            Value::String(text) => Ok(Value::String(self.clean(text))),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            other => bail!("Expected text, found {}", other),
        }
    }
}
