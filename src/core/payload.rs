//! The data context threaded through a pipeline run
//!
//! A payload is either a root or a partial view of a parent. Views hold only
//! the keys their step declared; writes go through to every ancestor.
//! Visualizations live in one list shared by the whole family.

use crate::core::params::Parameter;
use crate::core::table::Table;
use crate::core::types::TypeError;
use crate::core::visualization::Visualization;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use thiserror::Error;

/// Key reserved for the shared visualization list
pub const VISUALIZATIONS: &str = "visualizations";

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("{0} is not in this partial view, but in parent. You might have forgotten to declare it as input.")]
    NotDeclared(String),

    #[error("{0} is not set on this payload")]
    Missing(String),

    #[error("'{0}' is reserved; use the visualization methods")]
    Reserved(String),

    #[error("Could not parse '{name}': {source}")]
    Parse {
        name: String,
        #[source]
        source: TypeError,
    },
}

struct PayloadInner {
    values: RwLock<HashMap<String, Value>>,
    parent: Option<Payload>,
    visualizations: Arc<Mutex<Vec<Visualization>>>,
}

/// Cheaply clonable handle to a payload or partial view
#[derive(Clone)]
pub struct Payload {
    inner: Arc<PayloadInner>,
}

impl Payload {
    /// Create an empty root payload
    pub fn new() -> Self {
        Self::from_values(HashMap::new())
    }

    /// Create a root payload holding the given values
    pub fn from_values(values: HashMap<String, Value>) -> Self {
        Self {
            inner: Arc::new(PayloadInner {
                values: RwLock::new(values),
                parent: None,
                visualizations: Arc::new(Mutex::new(Vec::new())),
            }),
        }
    }

    pub fn is_root(&self) -> bool {
        self.inner.parent.is_none()
    }

    /// Read a key held by this payload
    ///
    /// A key only visible on an ancestor is an error: steps must declare
    /// every input they read.
    pub fn get(&self, key: &str) -> Result<Value, PayloadError> {
        if key == VISUALIZATIONS {
            return Err(PayloadError::Reserved(key.to_string()));
        }
        if let Some(value) = self.local(key) {
            return Ok(value);
        }

        let mut ancestor = self.inner.parent.as_ref();
        while let Some(payload) = ancestor {
            if payload.local(key).is_some() {
                return Err(PayloadError::NotDeclared(key.to_string()));
            }
            ancestor = payload.inner.parent.as_ref();
        }
        Err(PayloadError::Missing(key.to_string()))
    }

    /// Write a key here and on every ancestor
    pub fn set(&self, key: &str, value: Value) -> Result<(), PayloadError> {
        if key == VISUALIZATIONS {
            return Err(PayloadError::Reserved(key.to_string()));
        }
        if let Some(parent) = &self.inner.parent {
            parent.set(key, value.clone())?;
        }
        write(&self.inner.values).insert(key.to_string(), value);
        Ok(())
    }

    /// Read a key as a table
    pub fn get_table(&self, key: &str) -> Result<Table, PayloadError> {
        let value = self.get(key)?;
        Table::from_value(&value).map_err(|source| PayloadError::Parse {
            name: key.to_string(),
            source,
        })
    }

    pub fn set_table(&self, key: &str, table: Table) -> Result<(), PayloadError> {
        self.set(key, table.into_value())
    }

    /// Whether this payload holds the key locally
    pub fn contains(&self, key: &str) -> bool {
        read(&self.inner.values).contains_key(key)
    }

    /// Locally held keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = read(&self.inner.values).keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Create a view restricted to the declared parameters
    ///
    /// Each declared value is parsed through its parameter's type now, so a
    /// bad upstream value fails here rather than inside the operation.
    /// Undeclared or absent keys without a default are not copied.
    pub fn partial_view(&self, declared: &[Parameter]) -> Result<Payload, PayloadError> {
        let mut values = HashMap::with_capacity(declared.len());

        for parameter in declared {
            let raw = match self.get(&parameter.name) {
                Ok(value) => Some(value),
                Err(PayloadError::Missing(_)) => parameter.effective_default(),
                Err(e) => return Err(e),
            };
            let Some(raw) = raw else { continue };

            let parsed = parameter
                .ty
                .parse(&raw)
                .map_err(|source| PayloadError::Parse {
                    name: parameter.name.clone(),
                    source,
                })?;
            values.insert(parameter.name.clone(), parsed);
        }

        Ok(Self {
            inner: Arc::new(PayloadInner {
                values: RwLock::new(values),
                parent: Some(self.clone()),
                visualizations: self.inner.visualizations.clone(),
            }),
        })
    }

    /// Append to the shared visualization list
    pub fn add_visualization(&self, visualization: Visualization) {
        self.inner
            .visualizations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(visualization);
    }

    /// Drain the shared visualization list
    pub fn pop_visualizations(&self) -> Vec<Visualization> {
        std::mem::take(
            &mut *self
                .inner
                .visualizations
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    fn local(&self, key: &str) -> Option<Value> {
        read(&self.inner.values).get(key).cloned()
    }
}

impl Default for Payload {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("keys", &self.keys())
            .field("root", &self.is_root())
            .finish()
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
