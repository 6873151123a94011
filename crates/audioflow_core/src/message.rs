//! Stream Notifications
//!
//! Events flow from the stream's tasks to whoever holds the subscription.
//! `Closed` and `Finished` are emitted at most once per stream.

use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::error::StreamError;

/// Notifications emitted by a stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Hardware streaming began
    Started,

    /// A capture buffer was delivered to the stream's read queue
    DataAvailable {
        bytes: usize,
        /// Engine-clock time of the buffer's first sample, in seconds
        timestamp: Option<f64>,
    },

    /// An error occurred; whether it ended the stream depends on its source
    Error(StreamError),

    /// Upstream ended and the stream shut down after writing everything
    Finished,

    /// Every direction of the stream is closed
    Closed,
}

impl StreamEvent {
    /// Create an error event from a stream error
    pub fn error(err: impl Into<StreamError>) -> Self {
        StreamEvent::Error(err.into())
    }
}

/// Sending half, owned by the stream
#[derive(Debug, Clone)]
pub(crate) struct EventSink {
    sender: Sender<StreamEvent>,
}

impl EventSink {
    pub(crate) fn emit(&self, event: StreamEvent) {
        // Nobody listening is fine
        let _ = self.sender.send(event);
    }
}

/// Receiving half, handed to the application
#[derive(Debug, Clone)]
pub struct StreamEvents {
    receiver: Receiver<StreamEvent>,
}

impl StreamEvents {
    /// Get next event (non-blocking)
    pub fn poll_event(&self) -> Option<StreamEvent> {
        self.receiver.try_recv().ok()
    }

    /// Get next event (blocking)
    pub fn wait_event(&self) -> Option<StreamEvent> {
        self.receiver.recv().ok()
    }

    /// Get next event, giving up after `timeout`
    pub fn wait_event_timeout(&self, timeout: Duration) -> Option<StreamEvent> {
        self.receiver.recv_timeout(timeout).ok()
    }

    /// Take every event queued so far
    pub fn drain(&self) -> Vec<StreamEvent> {
        self.receiver.try_iter().collect()
    }

    /// Underlying receiver, for `select!` with other crossbeam channels
    pub fn receiver(&self) -> &Receiver<StreamEvent> {
        &self.receiver
    }
}

pub(crate) fn event_channel() -> (EventSink, StreamEvents) {
    let (sender, receiver) = unbounded();
    (EventSink { sender }, StreamEvents { receiver })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;

    #[test]
    fn test_events_are_delivered_in_order() {
        let (sink, events) = event_channel();
        sink.emit(StreamEvent::Started);
        sink.emit(StreamEvent::DataAvailable {
            bytes: 128,
            timestamp: Some(0.25),
        });

        assert_eq!(events.poll_event(), Some(StreamEvent::Started));
        assert_eq!(
            events.poll_event(),
            Some(StreamEvent::DataAvailable {
                bytes: 128,
                timestamp: Some(0.25)
            })
        );
        assert_eq!(events.poll_event(), None);
    }

    #[test]
    fn test_error_event() {
        let event = StreamEvent::error(EngineError::Hardware("xrun".into()));
        if let StreamEvent::Error(StreamError::Engine(EngineError::Hardware(message))) = event {
            assert_eq!(message, "xrun");
        } else {
            panic!("Should be Error variant");
        }
    }

    #[test]
    fn test_emit_without_subscriber() {
        let (sink, events) = event_channel();
        drop(events);
        sink.emit(StreamEvent::Closed);
    }

    #[test]
    fn test_wait_event_timeout_and_drain() {
        let (sink, events) = event_channel();
        assert_eq!(events.wait_event_timeout(Duration::from_millis(5)), None);

        sink.emit(StreamEvent::Finished);
        sink.emit(StreamEvent::Closed);
        assert_eq!(events.drain(), vec![StreamEvent::Finished, StreamEvent::Closed]);
        assert!(events.drain().is_empty());
    }
}
