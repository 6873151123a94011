//! Playback-only stream

use std::sync::Arc;

use bytes::Bytes;

use crate::bridge::Bridge;
use crate::config::StreamConfig;
use crate::engine::{AudioEngine, QuitMode};
use crate::error::StreamResult;
use crate::message::StreamEvents;
use crate::playback::{PlaybackHalf, WriteAck};
use crate::state::StreamState;

/// Push-based sink for audio to play
///
/// Chunks are handed to the engine strictly in write order, one at a time.
/// `write()` waits while `high_water_mark` bytes are queued.
pub struct WritableAudioStream<E: AudioEngine> {
    bridge: Arc<Bridge<E>>,
    playback: Arc<PlaybackHalf>,
    events: StreamEvents,
}

impl<E: AudioEngine> WritableAudioStream<E> {
    pub(crate) fn new(
        bridge: Arc<Bridge<E>>,
        playback: Arc<PlaybackHalf>,
        events: StreamEvents,
    ) -> Self {
        Self {
            bridge,
            playback,
            events,
        }
    }

    pub fn config(&self) -> &StreamConfig {
        self.playback.config()
    }

    /// Begin playback; chunks written before this are held until then
    pub fn start(&self) -> StreamResult<()> {
        self.bridge.start()
    }

    /// Queue a chunk for playback
    ///
    /// The returned [`WriteAck`] resolves once the engine accepted the chunk.
    pub async fn write(&self, chunk: impl Into<Bytes>) -> StreamResult<WriteAck> {
        self.playback.write(chunk.into()).await
    }

    /// Queue a chunk and wait for the engine to accept it
    pub async fn write_all(&self, chunk: impl Into<Bytes>) -> StreamResult<()> {
        self.write(chunk).await?.await
    }

    /// No more chunks: play what is queued, quit, then emit `Finished`
    pub async fn end(&self) -> StreamResult<()> {
        self.bridge.finish().await
    }

    /// Stop playback after queued chunks have drained
    pub async fn quit(&self) -> StreamResult<()> {
        self.bridge.shutdown(QuitMode::Wait).await
    }

    /// Stop playback now; queued chunks are rejected with `Closed`
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
        self.playback.state().current()
    }

    /// Bytes written but not yet handed to the engine
    pub fn buffered(&self) -> usize {
        self.playback.buffered()
    }

    pub fn events(&self) -> &StreamEvents {
        &self.events
    }
}
