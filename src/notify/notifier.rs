//! Notifier implementations

use super::{LogLevel, LogManager, NotificationDomain, Notifier, StatusManager, StepStatus};
use crate::core::StepState;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Notifier bound to one step of one run
///
/// Immutable once built: moving to the next step creates a new notifier
/// through [`RunNotifier::for_step`] sharing the same managers and flag.
#[derive(Clone)]
pub struct RunNotifier {
    logs: Arc<LogManager>,
    statuses: Arc<StatusManager>,
    domain: NotificationDomain,
    cancelled: Arc<AtomicBool>,
    worker_threads: Option<usize>,
}

impl RunNotifier {
    pub fn new(
        logs: Arc<LogManager>,
        statuses: Arc<StatusManager>,
        domain: NotificationDomain,
    ) -> Self {
        Self::with_cancellation(logs, statuses, domain, Arc::new(AtomicBool::new(false)))
    }

    pub fn with_cancellation(
        logs: Arc<LogManager>,
        statuses: Arc<StatusManager>,
        domain: NotificationDomain,
        cancelled: Arc<AtomicBool>,
    ) -> Self {
        Self {
            logs,
            statuses,
            domain,
            cancelled,
            worker_threads: None,
        }
    }

    /// Limit item work of every step to `threads` worker threads
    pub fn with_worker_threads(mut self, threads: Option<usize>) -> Self {
        self.worker_threads = threads;
        self
    }

    /// Notifier for another step of the same run
    pub fn for_step(&self, step_index: usize) -> Self {
        Self {
            domain: self.domain.at_step(step_index),
            ..self.clone()
        }
    }

    pub fn domain(&self) -> &NotificationDomain {
        &self.domain
    }
}

impl Notifier for RunNotifier {
    fn log_lines(&self, level: LogLevel, messages: Vec<String>) {
        self.logs.log(&self.domain, level, messages);
    }

    fn send_status(&self, state: StepState, progress: f64) {
        self.statuses
            .send_status(StepStatus::new(&self.domain, state, progress));
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn worker_threads(&self) -> Option<usize> {
        self.worker_threads
    }
}

/// Success and failure tallies shared by all item notifiers of a step
#[derive(Debug, Default)]
pub struct ItemCounters {
    succeeded: AtomicUsize,
    failed: AtomicUsize,
}

impl ItemCounters {
    pub fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }
}

/// Forwards only progress values above the highest one seen so far
///
/// Items may finish out of order; the gate keeps the progress a parent
/// observer sees non-decreasing.
#[derive(Debug, Default)]
pub struct ProgressGate {
    highest: Mutex<f64>,
}

impl ProgressGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `forward` with `progress` if it does not move backwards
    pub fn advance<F: FnOnce(f64)>(&self, progress: f64, forward: F) {
        let mut highest = self.highest.lock().unwrap_or_else(PoisonError::into_inner);
        if progress >= *highest {
            *highest = progress;
            // Forward while holding the lock so observers see the same order.
            forward(progress);
        }
    }

    pub fn highest(&self) -> f64 {
        *self.highest.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Notifier handed to the work on a single item
///
/// Log lines are prefixed with the item's position. Status updates count
/// towards the shared tallies and are rescaled so that the parent sees
/// progress across the whole collection.
pub struct ItemNotifier<'a> {
    parent: &'a dyn Notifier,
    index: usize,
    total: usize,
    counters: &'a ItemCounters,
    gate: &'a ProgressGate,
}

impl<'a> ItemNotifier<'a> {
    pub fn new(
        parent: &'a dyn Notifier,
        index: usize,
        total: usize,
        counters: &'a ItemCounters,
        gate: &'a ProgressGate,
    ) -> Self {
        Self {
            parent,
            index,
            total,
            counters,
            gate,
        }
    }

    /// Progress of the whole collection given this item's own progress
    pub fn relative_progress(&self, item_progress: f64) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        let item_progress = item_progress.clamp(0.0, 100.0);
        (100.0 * self.index as f64 + item_progress) / self.total as f64
    }
}

impl Notifier for ItemNotifier<'_> {
    fn log_lines(&self, level: LogLevel, messages: Vec<String>) {
        let prefix = format!("Item {}/{}: ", self.index + 1, self.total);
        self.parent.log_lines(
            level,
            messages.into_iter().map(|m| format!("{}{}", prefix, m)).collect(),
        );
    }

    fn send_status(&self, state: StepState, progress: f64) {
        match state {
            StepState::Success => self.counters.record_success(),
            StepState::Failed => self.counters.record_failure(),
            StepState::NotStarted | StepState::Running => {}
        }
        let relative = self.relative_progress(progress);
        self.gate
            .advance(relative, |p| self.parent.send_status(StepState::Running, p));
    }

    fn is_cancelled(&self) -> bool {
        self.parent.is_cancelled()
    }

    fn worker_threads(&self) -> Option<usize> {
        self.parent.worker_threads()
    }
}
