//! Delivery of run events to an external observer

use super::multiplexer::Channel;
use super::{LogBatch, RunEvent, StepLogUpdate, StepStatus};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Name under which the observer channel is registered
pub const FRONTEND_CHANNEL: &str = "frontend";

/// Callback receiving run events
pub type EventHandler = Arc<dyn Fn(RunEvent) + Send + Sync>;

/// Where an [`EventChannel`] delivers events
#[derive(Clone)]
pub enum EventSink {
    Callback(EventHandler),
    Sender(mpsc::UnboundedSender<RunEvent>),
}

impl EventSink {
    pub fn callback<F>(handler: F) -> Self
    where
        F: Fn(RunEvent) + Send + Sync + 'static,
    {
        EventSink::Callback(Arc::new(handler))
    }

    fn deliver(&self, event: RunEvent) {
        match self {
            EventSink::Callback(handler) => handler(event),
            EventSink::Sender(sender) => {
                if sender.send(event).is_err() {
                    debug!("Event receiver dropped; discarding event");
                }
            }
        }
    }
}

/// Channel turning log batches and status updates into [`RunEvent`]s
///
/// The same instance can be registered on both multiplexers.
#[derive(Clone)]
pub struct EventChannel {
    sink: EventSink,
}

impl EventChannel {
    pub fn new(sink: EventSink) -> Self {
        Self { sink }
    }
}

impl Channel<LogBatch> for EventChannel {
    fn handle(&self, batch: &LogBatch) {
        self.sink.deliver(RunEvent::Log(StepLogUpdate::from(batch)));
    }
}

impl Channel<StepStatus> for EventChannel {
    fn handle(&self, status: &StepStatus) {
        self.sink.deliver(RunEvent::Status(status.clone()));
    }
}
