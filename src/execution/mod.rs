//! Pipeline execution engine

pub mod api;
pub mod blueprint;
pub mod catalog;
pub mod operation;
pub mod parallel;
pub mod runner;

pub use api::{RunApi, RunHandle, RunInput};
pub use blueprint::StepBlueprint;
pub use catalog::BlueprintCatalog;
pub use operation::{OperationConstructor, OperationRegistry, StepOperation};
pub use parallel::{
    ItemOperation, ItemProcessor, ItemReport, SingleValue, SingleValueOperation, DATA_KEY,
};
pub use runner::{PipelineRunner, RunReport, RunnerSettings};

use std::any::Any;

/// Best-effort text of a caught panic
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
