//! Item-by-item processing of a table column
//!
//! [`ItemProcessor`] turns an [`ItemOperation`] into a [`StepOperation`].
//! Every item runs in isolation: an error or panic on one item is logged,
//! its outputs become nulls and the remaining items still run. Results are
//! written back to the table only after every item has finished.

use super::operation::StepOperation;
use super::panic_message;
use crate::core::{Payload, StepOutcome, StepState, Table};
use crate::notify::{ItemCounters, ItemNotifier, Notifier, ProgressGate};
use anyhow::Context;
use rayon::prelude::*;
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::debug;

/// Payload key holding the table processed by default
pub const DATA_KEY: &str = "data";

/// Work applied to each item of a column, producing one value per output column
pub trait ItemOperation: Send + Sync {
    /// Column whose values are the items
    fn input_column(&self) -> &str;

    /// Names of the columns written back, in the order `process_item` returns them
    fn output_columns(&self) -> Vec<String>;

    /// Process a single item
    ///
    /// Report progress with `Running` statuses only; the processor records
    /// each item's final state.
    fn process_item(
        &self,
        notifier: &dyn Notifier,
        payload: &Payload,
        item: &Value,
    ) -> anyhow::Result<Vec<Value>>;

    /// Payload key of the table to process
    fn data_key(&self) -> &str {
        DATA_KEY
    }

    /// Whether items may run concurrently
    fn parallel(&self) -> bool {
        true
    }

    /// Hook called once all items ran, before the table is written back
    fn after_items(
        &mut self,
        _table: &Table,
        _payload: &Payload,
        _notifier: &dyn Notifier,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Work producing exactly one value per item
pub trait SingleValueOperation: Send + Sync {
    fn input_column(&self) -> &str;

    fn output_column(&self) -> &str;

    fn process_value(
        &self,
        notifier: &dyn Notifier,
        payload: &Payload,
        item: &Value,
    ) -> anyhow::Result<Value>;

    fn data_key(&self) -> &str {
        DATA_KEY
    }
}

/// Adapts a [`SingleValueOperation`] to the [`ItemOperation`] contract
pub struct SingleValue<O>(pub O);

impl<O: SingleValueOperation> ItemOperation for SingleValue<O> {
    fn input_column(&self) -> &str {
        self.0.input_column()
    }

    fn output_columns(&self) -> Vec<String> {
        vec![self.0.output_column().to_string()]
    }

    fn process_item(
        &self,
        notifier: &dyn Notifier,
        payload: &Payload,
        item: &Value,
    ) -> anyhow::Result<Vec<Value>> {
        Ok(vec![self.0.process_value(notifier, payload, item)?])
    }

    fn data_key(&self) -> &str {
        self.0.data_key()
    }
}

/// Tally of one processing pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Items not started because the run was cancelled
    pub skipped: usize,
}

impl ItemReport {
    pub fn outcome(&self) -> StepOutcome {
        if self.failed == 0 && self.skipped == 0 {
            StepOutcome::Success
        } else {
            StepOutcome::Failed
        }
    }
}

/// Runs an [`ItemOperation`] over every item of its input column
pub struct ItemProcessor<O> {
    operation: O,
}

impl<O: ItemOperation> ItemProcessor<O> {
    pub fn new(operation: O) -> Self {
        Self { operation }
    }

    pub fn operation(&self) -> &O {
        &self.operation
    }

    /// Process every item and write the outputs back into the payload
    pub fn process(&mut self, payload: &Payload, notifier: &dyn Notifier) -> anyhow::Result<ItemReport> {
        let key = self.operation.data_key().to_string();
        let mut table = payload
            .get_table(&key)
            .with_context(|| format!("Cannot read '{}' from the payload", key))?;

        let input_column = self.operation.input_column().to_string();
        let items = table
            .column(&input_column)
            .with_context(|| format!("Column '{}' not found in '{}'", input_column, key))?;
        let outputs = self.operation.output_columns();

        let total = items.len();
        let counters = ItemCounters::default();
        let gate = ProgressGate::new();
        debug!("Processing {} item(s) of column '{}'", total, input_column);

        let operation = &self.operation;
        let run_item = |index: usize| -> Option<Vec<Value>> {
            if notifier.is_cancelled() {
                return None;
            }
            let item_notifier = ItemNotifier::new(notifier, index, total, &counters, &gate);
            Some(process_one(operation, &item_notifier, payload, &items[index], outputs.len()))
        };

        // Results come back in index order whichever thread ran the item
        let results: Vec<Option<Vec<Value>>> = if !self.operation.parallel() {
            (0..total).map(&run_item).collect()
        } else {
            match notifier.worker_threads() {
                Some(threads) => {
                    let pool = rayon::ThreadPoolBuilder::new()
                        .num_threads(threads)
                        .thread_name(|i| format!("stepline-item-{}", i))
                        .build()
                        .context("Failed to build the item worker pool")?;
                    pool.install(|| (0..total).into_par_iter().map(&run_item).collect())
                }
                None => (0..total).into_par_iter().map(&run_item).collect(),
            }
        };

        let skipped = results.iter().filter(|r| r.is_none()).count();
        let results: Vec<Vec<Value>> = results
            .into_iter()
            .map(|r| r.unwrap_or_else(|| vec![Value::Null; outputs.len()]))
            .collect();

        for (column, name) in outputs.iter().enumerate() {
            let values = results
                .iter()
                .map(|row| row.get(column).cloned().unwrap_or(Value::Null))
                .collect();
            table.set_column(name, values)?;
        }

        self.operation.after_items(&table, payload, notifier)?;
        payload.set_table(&key, table)?;

        Ok(ItemReport {
            total,
            succeeded: counters.succeeded(),
            failed: counters.failed(),
            skipped,
        })
    }
}

impl<O: ItemOperation> StepOperation for ItemProcessor<O> {
    fn run(&mut self, payload: &Payload, notifier: &dyn Notifier) -> anyhow::Result<StepOutcome> {
        let report = self.process(payload, notifier)?;

        if report.skipped > 0 {
            notifier.warn(&format!(
                "Cancelled: {} of {} item(s) were not processed.",
                report.skipped, report.total
            ));
        }
        if report.failed > 0 {
            notifier.warn(&format!(
                "{} of {} failed. Data may be incomplete.",
                report.failed, report.total
            ));
        }
        Ok(report.outcome())
    }
}

fn process_one<O: ItemOperation>(
    operation: &O,
    notifier: &ItemNotifier<'_>,
    payload: &Payload,
    item: &Value,
    arity: usize,
) -> Vec<Value> {
    let result = catch_unwind(AssertUnwindSafe(|| {
        operation.process_item(notifier, payload, item)
    }));

    let failure = match result {
        Ok(Ok(values)) if values.len() == arity => {
            notifier.send_status(StepState::Success, 100.0);
            return values;
        }
        Ok(Ok(values)) => format!(
            "Operation returned {} value(s) but declares {} output column(s)",
            values.len(),
            arity
        ),
        Ok(Err(e)) => format!("{:?}", e),
        Err(panic) => format!("Panicked: {}", panic_message(panic.as_ref())),
    };

    notifier.error(&failure);
    notifier.send_status(StepState::Failed, 100.0);
    vec![Value::Null; arity]
}
