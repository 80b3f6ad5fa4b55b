use tokio::sync::mpsc;

use crate::logger;
use crate::models::StatusEvent;

/// Receiver of progress and terminal status events
///
/// Called on the operation's own task; implementations must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &StatusEvent);
}

/// Discards every event
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &StatusEvent) {}
}

/// Writes events to the debug log
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: &StatusEvent) {
        if let Ok(json) = serde_json::to_string(event) {
            logger::log_debug(&json, Some("status"), None);
        }
    }
}

/// Forwards events to a tokio channel
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<StatusEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StatusEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: &StatusEvent) {
        // Receiver gone means nobody is listening any more
        let _ = self.tx.send(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PluginStatus;

    #[test]
    fn test_channel_sink_forwards_and_tolerates_closed_receiver() {
        let (sink, mut rx) = ChannelSink::new();
        sink.emit(&StatusEvent::new("OzStrips", PluginStatus::Checking));
        assert_eq!(rx.try_recv().unwrap().status, PluginStatus::Checking);

        drop(rx);
        sink.emit(&StatusEvent::new("OzStrips", PluginStatus::Done));
    }
}
