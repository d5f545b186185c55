//! Operations shipped with the engine

pub mod text_cleanup;
pub mod word_list_scan;

pub use text_cleanup::TextCleanup;
pub use word_list_scan::WordListScan;

use crate::execution::{ItemProcessor, OperationRegistry, SingleValue};
use crate::notify::Notifier;

/// Catalog document describing the built-in steps
pub const BUILTIN_STEPS: &str = include_str!("steps.yaml");

/// Register the constructors of all built-in steps
pub fn register_builtins(operations: &mut OperationRegistry) {
    operations.register(text_cleanup::STEP_ID, |config, notifier| {
        let operation = TextCleanup::from_config(config)?;
        notifier.info("Text cleanup initialized");
        Ok(Box::new(ItemProcessor::new(SingleValue(operation))))
    });

    operations.register(word_list_scan::STEP_ID, |config, notifier| {
        let operation = WordListScan::from_config(config, notifier)?;
        notifier.info(&format!(
            "Word list scan initialized with {} active list(s)",
            operation.list_names().len()
        ));
        Ok(Box::new(ItemProcessor::new(operation)))
    });
}
