//! Log and status notifications
//!
//! Operations report through a [`Notifier`]. A run notifier addresses every
//! event to a [`NotificationDomain`] and hands it to two multiplexers, one
//! for log batches and one for status updates, which fan out to every
//! registered channel.

pub mod frontend;
pub mod multiplexer;
pub mod notifier;

pub use frontend::{EventChannel, EventHandler, EventSink, FRONTEND_CHANNEL};
pub use multiplexer::{Channel, LogManager, Multiplexer, StatusManager, CONSOLE_CHANNEL};
pub use notifier::{ItemCounters, ItemNotifier, ProgressGate, RunNotifier};

use crate::core::StepState;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Severity of a log message
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        };
        f.write_str(name)
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("Unknown log level: {}", other)),
        }
    }
}

/// Address of one step execution
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationDomain {
    pub run_id: String,
    pub pipeline_id: String,
    pub step_index: usize,
}

impl NotificationDomain {
    pub fn new(run_id: impl Into<String>, pipeline_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            pipeline_id: pipeline_id.into(),
            step_index: 0,
        }
    }

    /// The same run, addressed to another step
    pub fn at_step(&self, step_index: usize) -> Self {
        Self {
            step_index,
            ..self.clone()
        }
    }
}

/// Log lines emitted together at one level
#[derive(Debug, Clone, PartialEq)]
pub struct LogBatch {
    pub domain: NotificationDomain,
    pub level: LogLevel,
    pub messages: Vec<String>,
}

/// Progress of one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepStatus {
    pub run_id: String,
    pub pipeline_id: String,
    pub step_index: usize,
    pub state: StepState,
    pub progress: f64,
}

impl StepStatus {
    pub fn new(domain: &NotificationDomain, state: StepState, progress: f64) -> Self {
        Self {
            run_id: domain.run_id.clone(),
            pipeline_id: domain.pipeline_id.clone(),
            step_index: domain.step_index,
            state,
            progress,
        }
    }
}

/// Log lines of one step, as delivered to observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepLogUpdate {
    pub run_id: String,
    pub pipeline_id: String,
    pub step_index: usize,
    pub level: LogLevel,
    pub logs: Vec<String>,
}

impl From<&LogBatch> for StepLogUpdate {
    fn from(batch: &LogBatch) -> Self {
        Self {
            run_id: batch.domain.run_id.clone(),
            pipeline_id: batch.domain.pipeline_id.clone(),
            step_index: batch.domain.step_index,
            level: batch.level,
            logs: batch.messages.clone(),
        }
    }
}

/// Everything an observer of a run can receive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum RunEvent {
    Log(StepLogUpdate),
    Status(StepStatus),
}

/// Sink for an operation's logs and progress
///
/// Implementations are shared across item workers, so they must be
/// `Send + Sync`.
pub trait Notifier: Send + Sync {
    fn log_lines(&self, level: LogLevel, messages: Vec<String>);

    fn send_status(&self, state: StepState, progress: f64);

    /// Whether the run has been asked to stop
    fn is_cancelled(&self) -> bool {
        false
    }

    /// Threads item work may use; `None` leaves the choice to the processor
    fn worker_threads(&self) -> Option<usize> {
        None
    }

    /// Log a message; embedded newlines split it into lines
    fn log(&self, level: LogLevel, message: &str) {
        self.log_lines(level, message.split('\n').map(str::to_string).collect());
    }

    fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    fn warn(&self, message: &str) {
        self.log(LogLevel::Warning, message);
    }

    fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }
}
