//! Fan-out of notifications to named channels

use super::{LogBatch, LogLevel, NotificationDomain, StepStatus};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, error, info, warn};

/// Name of the channel every multiplexer starts with
pub const CONSOLE_CHANNEL: &str = "console";

/// A destination for notifications of type `T`
pub trait Channel<T>: Send + Sync {
    fn handle(&self, item: &T);
}

impl<T, F> Channel<T> for F
where
    F: Fn(&T) + Send + Sync,
{
    fn handle(&self, item: &T) {
        self(item)
    }
}

/// Named set of channels receiving every multiplexed item
pub struct Multiplexer<T> {
    channels: RwLock<BTreeMap<String, Arc<dyn Channel<T>>>>,
}

impl<T> Multiplexer<T> {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register a channel, replacing any channel with the same name
    pub fn set_channel(&self, name: impl Into<String>, channel: Arc<dyn Channel<T>>) {
        self.channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), channel);
    }

    pub fn remove_channel(&self, name: &str) -> Option<Arc<dyn Channel<T>>> {
        self.channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn multiplex(&self, item: &T) {
        // Snapshot so channels may register channels without deadlocking.
        let channels: Vec<Arc<dyn Channel<T>>> = self
            .channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for channel in channels {
            channel.handle(item);
        }
    }
}

impl<T> Default for Multiplexer<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes log batches through `tracing`
pub struct ConsoleLogChannel;

impl Channel<LogBatch> for ConsoleLogChannel {
    fn handle(&self, batch: &LogBatch) {
        let run = batch.domain.run_id.as_str();
        let step = batch.domain.step_index;
        for message in &batch.messages {
            match batch.level {
                LogLevel::Debug => debug!(run, step, "{}", message),
                LogLevel::Info => info!(run, step, "{}", message),
                LogLevel::Warning => warn!(run, step, "{}", message),
                LogLevel::Error => error!(run, step, "{}", message),
            }
        }
    }
}

/// Writes status updates through `tracing`
pub struct ConsoleStatusChannel;

impl Channel<StepStatus> for ConsoleStatusChannel {
    fn handle(&self, status: &StepStatus) {
        debug!(
            run = status.run_id.as_str(),
            step = status.step_index,
            "Status {:?} ({:.1}%)",
            status.state,
            status.progress
        );
    }
}

/// Log multiplexer with a minimum severity
///
/// Messages below the minimum are dropped before any channel sees them.
pub struct LogManager {
    min_level: LogLevel,
    channels: Multiplexer<LogBatch>,
}

impl LogManager {
    pub fn new(min_level: LogLevel) -> Self {
        let channels = Multiplexer::new();
        channels.set_channel(CONSOLE_CHANNEL, Arc::new(ConsoleLogChannel));
        Self {
            min_level,
            channels,
        }
    }

    pub fn min_level(&self) -> LogLevel {
        self.min_level
    }

    pub fn channels(&self) -> &Multiplexer<LogBatch> {
        &self.channels
    }

    pub fn log(&self, domain: &NotificationDomain, level: LogLevel, messages: Vec<String>) {
        if level < self.min_level || messages.is_empty() {
            return;
        }
        self.channels.multiplex(&LogBatch {
            domain: domain.clone(),
            level,
            messages,
        });
    }
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new(LogLevel::Debug)
    }
}

/// Status multiplexer
pub struct StatusManager {
    channels: Multiplexer<StepStatus>,
}

impl StatusManager {
    pub fn new() -> Self {
        let channels = Multiplexer::new();
        channels.set_channel(CONSOLE_CHANNEL, Arc::new(ConsoleStatusChannel));
        Self { channels }
    }

    pub fn channels(&self) -> &Multiplexer<StepStatus> {
        &self.channels
    }

    pub fn send_status(&self, status: StepStatus) {
        self.channels.multiplex(&status);
    }
}

impl Default for StatusManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recording() -> (Arc<Mutex<Vec<LogBatch>>>, Arc<dyn Channel<LogBatch>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let channel: Arc<dyn Channel<LogBatch>> =
            Arc::new(move |batch: &LogBatch| sink.lock().unwrap().push(batch.clone()));
        (seen, channel)
    }

    #[test]
    fn test_console_channel_is_present() {
        let logs = LogManager::default();
        assert_eq!(logs.channels().channel_names(), vec![CONSOLE_CHANNEL]);
        let statuses = StatusManager::new();
        assert_eq!(statuses.channels().channel_names(), vec![CONSOLE_CHANNEL]);
    }

    #[test]
    fn test_every_channel_receives_each_batch() {
        let logs = LogManager::new(LogLevel::Debug);
        let (first, a) = recording();
        let (second, b) = recording();
        logs.channels().set_channel("a", a);
        logs.channels().set_channel("b", b);

        let domain = NotificationDomain::new("r", "p");
        logs.log(&domain, LogLevel::Info, vec!["hello".to_string()]);

        assert_eq!(first.lock().unwrap().len(), 1);
        assert_eq!(second.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_messages_below_minimum_are_dropped() {
        let logs = LogManager::new(LogLevel::Warning);
        let (seen, channel) = recording();
        logs.channels().set_channel("rec", channel);

        let domain = NotificationDomain::new("r", "p");
        logs.log(&domain, LogLevel::Info, vec!["quiet".to_string()]);
        logs.log(&domain, LogLevel::Error, vec!["loud".to_string()]);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].messages, vec!["loud"]);
    }

    #[test]
    fn test_replacing_a_channel() {
        let logs = LogManager::new(LogLevel::Debug);
        let (old, a) = recording();
        let (new, b) = recording();
        logs.channels().set_channel("frontend", a);
        logs.channels().set_channel("frontend", b);

        logs.log(&NotificationDomain::new("r", "p"), LogLevel::Info, vec!["x".to_string()]);
        assert!(old.lock().unwrap().is_empty());
        assert_eq!(new.lock().unwrap().len(), 1);
    }
}
