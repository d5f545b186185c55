//! stepline - configurable step pipelines with item-parallel operations

pub mod cli;
pub mod core;
pub mod execution;
pub mod notify;
pub mod operations;
pub mod storage;

// Re-export commonly used types
pub use crate::core::{
    Config, Parameter, ParamType, Payload, Pipeline, RunStatus, StepOutcome, StepState,
    StepValues, Table, TypeRegistry, Visualization,
};
pub use crate::execution::{
    BlueprintCatalog, ItemOperation, ItemProcessor, OperationRegistry, PipelineRunner, RunApi,
    RunHandle, RunInput, SingleValueOperation, StepBlueprint, StepOperation,
};
pub use crate::notify::{LogLevel, Notifier, RunEvent};
pub use crate::storage::{FsRunStorage, InMemoryRunStorage, RunStorage};
