//! Capture-only stream

use std::sync::Arc;

use futures::stream::{self, Stream};

use crate::bridge::Bridge;
use crate::buffer::AudioBuffer;
use crate::capture::CaptureHalf;
use crate::config::StreamConfig;
use crate::engine::{AudioEngine, QuitMode};
use crate::error::StreamResult;
use crate::message::StreamEvents;
use crate::state::StreamState;

/// Pull-based stream of captured audio
///
/// Buffers are delivered in engine order. `read()` returns `None` once the
/// engine reports end of input or the stream has been shut down.
pub struct ReadableAudioStream<E: AudioEngine> {
    bridge: Arc<Bridge<E>>,
    capture: Arc<CaptureHalf>,
    events: StreamEvents,
}

impl<E: AudioEngine> ReadableAudioStream<E> {
    pub(crate) fn new(bridge: Arc<Bridge<E>>, capture: Arc<CaptureHalf>, events: StreamEvents) -> Self {
        Self {
            bridge,
            capture,
            events,
        }
    }

    pub fn config(&self) -> &StreamConfig {
        self.capture.config()
    }

    /// Begin capturing; a second call is a no-op
    pub fn start(&self) -> StreamResult<()> {
        self.bridge.start()
    }

    /// Next captured buffer, an error, or `None` at end of stream
    pub async fn read(&self) -> Option<StreamResult<AudioBuffer>> {
        self.capture.read().await
    }

    /// Stop capturing, delivering the in-flight buffer
    pub async fn quit(&self) -> StreamResult<()> {
        self.bridge.shutdown(QuitMode::Wait).await
    }

    /// Stop capturing now, discarding anything not yet read
    pub async fn abort(&self) -> StreamResult<()> {
        self.bridge.shutdown(QuitMode::Abort).await
    }

    pub fn quit_then<F>(&self, on_complete: F)
    where
        F: FnOnce(StreamResult<()>) + Send + 'static,
    {
        self.bridge.shutdown_then(QuitMode::Wait, on_complete);
    }

    pub fn abort_then<F>(&self, on_complete: F)
    where
        F: FnOnce(StreamResult<()>) + Send + 'static,
    {
        self.bridge.shutdown_then(QuitMode::Abort, on_complete);
    }

    pub fn state(&self) -> StreamState {
        self.capture.state().current()
    }

    pub fn events(&self) -> &StreamEvents {
        &self.events
    }

    /// Consume the stream as a `futures::Stream` of buffers
    pub fn into_stream(self) -> impl Stream<Item = StreamResult<AudioBuffer>> + Send {
        stream::unfold(self, |readable| async move {
            let next = readable.read().await?;
            Some((next, readable))
        })
    }
}
