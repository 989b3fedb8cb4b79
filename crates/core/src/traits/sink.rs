//! Outbound message delivery

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::protocol::OutboundMessage;
use crate::Result;

/// Send primitive for one client connection
///
/// A failed send is fatal for the request being processed.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, message: OutboundMessage) -> Result<()>;
}

/// Sink that keeps every message in memory
///
/// Used by tests and by callers that want the whole exchange at once.
#[derive(Debug, Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<OutboundMessage>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything sent so far
    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.messages.lock().clone()
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
    }
}

#[async_trait]
impl MessageSink for RecordingSink {
    async fn send(&self, message: OutboundMessage) -> Result<()> {
        self.messages.lock().push(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MessageStatus;

    #[tokio::test]
    async fn test_recording_sink_keeps_order() {
        let sink = RecordingSink::new();
        sink.send(OutboundMessage::typing("r")).await.unwrap();
        sink.send(OutboundMessage::completed("r", "done")).await.unwrap();

        let sent = sink.messages();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].status, MessageStatus::Istyping);
        assert_eq!(sent[1].msg, "done");
    }
}
