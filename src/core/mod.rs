//! Core domain models
//!
//! This module defines the typed parameter system, step configuration,
//! the payload threaded through a run, and the pipeline documents.

pub mod config;
pub mod params;
pub mod payload;
pub mod picker;
pub mod pipeline;
pub mod schema;
pub mod state;
pub mod table;
pub mod types;
pub mod visualization;

pub use config::{Config, ConfigError, Entry, Field, FieldError};
pub use params::{InputOutputDefinition, Parameter};
pub use payload::{Payload, PayloadError};
pub use picker::Picker;
pub use pipeline::{Pipeline, StepValues};
pub use schema::{CatalogDocument, SchemaError, StepDefinition};
pub use state::{RunState, RunStatus, StepOutcome, StepState};
pub use table::Table;
pub use types::{Compatibility, ParamType, TypeError, TypeRegistry};
pub use visualization::Visualization;
