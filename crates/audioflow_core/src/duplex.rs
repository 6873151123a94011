//! Full-duplex stream
//!
//! Capture and playback share one engine. Each direction keeps its own state;
//! the stream is `Closed` once both are. Ending the write side quits both
//! directions, while end of input from the engine only closes the read side.

use std::sync::Arc;

use bytes::Bytes;

use crate::bridge::Bridge;
use crate::buffer::AudioBuffer;
use crate::capture::CaptureHalf;
use crate::config::StreamConfig;
use crate::engine::{AudioEngine, QuitMode};
use crate::error::StreamResult;
use crate::message::StreamEvents;
use crate::pipe::pipe;
use crate::playback::{PlaybackHalf, WriteAck};
use crate::state::StreamState;

pub struct DuplexAudioStream<E: AudioEngine> {
    bridge: Arc<Bridge<E>>,
    capture: Arc<CaptureHalf>,
    playback: Arc<PlaybackHalf>,
    events: StreamEvents,
}

impl<E: AudioEngine> DuplexAudioStream<E> {
    pub(crate) fn new(
        bridge: Arc<Bridge<E>>,
        capture: Arc<CaptureHalf>,
        playback: Arc<PlaybackHalf>,
        events: StreamEvents,
    ) -> Self {
        Self {
            bridge,
            capture,
            playback,
            events,
        }
    }

    pub fn input_config(&self) -> &StreamConfig {
        self.capture.config()
    }

    pub fn output_config(&self) -> &StreamConfig {
        self.playback.config()
    }

    /// Start both directions with a single engine start
    pub fn start(&self) -> StreamResult<()> {
        self.bridge.start()
    }

    pub async fn read(&self) -> Option<StreamResult<AudioBuffer>> {
        self.capture.read().await
    }

    pub async fn write(&self, chunk: impl Into<Bytes>) -> StreamResult<WriteAck> {
        self.playback.write(chunk.into()).await
    }

    pub async fn write_all(&self, chunk: impl Into<Bytes>) -> StreamResult<()> {
        self.write(chunk).await?.await
    }

    /// Finish the write side; both directions quit afterwards
    pub async fn end(&self) -> StreamResult<()> {
        self.bridge.finish().await
    }

    pub async fn quit(&self) -> StreamResult<()> {
        self.bridge.shutdown(QuitMode::Wait).await
    }

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

    /// Combined state; `Closed` only once both directions are closed
    pub fn state(&self) -> StreamState {
        self.bridge.state()
    }

    pub fn input_state(&self) -> StreamState {
        self.capture.state().current()
    }

    pub fn output_state(&self) -> StreamState {
        self.playback.state().current()
    }

    pub fn buffered(&self) -> usize {
        self.playback.buffered()
    }

    pub fn events(&self) -> &StreamEvents {
        &self.events
    }

    /// Play everything this stream captures until the read side ends
    ///
    /// Returns the number of bytes looped back.
    pub async fn loopback(&self) -> StreamResult<u64> {
        pipe(self, self).await
    }
}
