//! Audio Engine Contract
//!
//! The engine owns the hardware callback, device buffers and timing. The
//! stream layer only sees these four operations; everything behind them
//! (native callback loop, ring buffers, driver integration) belongs to the
//! engine implementation.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::buffer::AudioBuffer;
use crate::error::{EngineError, EngineResult};

/// Outcome of one engine read
#[derive(Debug, Clone, PartialEq)]
pub enum ReadResult {
    Buffer(AudioBuffer),
    /// End of input (device closed or engine stopped)
    Finished,
    Error(EngineError),
}

/// Outcome of submitting one buffer for playback
pub type WriteOutcome = Result<(), EngineError>;

/// How the engine stops streaming
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuitMode {
    /// Drain pending I/O first
    Wait,
    /// Discard pending I/O and stop now
    Abort,
}

/// Asynchronous hardware audio I/O provider
///
/// Read and write may be called concurrently with each other (duplex); the
/// stream layer never has more than one read or more than one write
/// outstanding.
#[async_trait]
pub trait AudioEngine: Send + Sync + 'static {
    /// Request up to `size` bytes of captured audio
    async fn read(&self, size: usize) -> ReadResult;

    /// Submit a buffer for playback; resolves once the engine accepted it
    async fn write(&self, buffer: Bytes) -> WriteOutcome;

    /// Begin hardware streaming (synchronous trigger)
    fn start(&self) -> EngineResult<()>;

    /// Stop streaming, draining or discarding pending I/O
    ///
    /// With `QuitMode::Wait` a write that is already outstanding still
    /// completes with its real outcome; only writes issued after the quit
    /// may be refused. `QuitMode::Abort` may fail it.
    async fn quit(&self, mode: QuitMode) -> EngineResult<()>;
}

#[async_trait]
impl<E: AudioEngine + ?Sized> AudioEngine for Arc<E> {
    async fn read(&self, size: usize) -> ReadResult {
        (**self).read(size).await
    }

    async fn write(&self, buffer: Bytes) -> WriteOutcome {
        (**self).write(buffer).await
    }

    fn start(&self) -> EngineResult<()> {
        (**self).start()
    }

    async fn quit(&self, mode: QuitMode) -> EngineResult<()> {
        (**self).quit(mode).await
    }
}

#[async_trait]
impl AudioEngine for Box<dyn AudioEngine> {
    async fn read(&self, size: usize) -> ReadResult {
        (**self).read(size).await
    }

    async fn write(&self, buffer: Bytes) -> WriteOutcome {
        (**self).write(buffer).await
    }

    fn start(&self) -> EngineResult<()> {
        (**self).start()
    }

    async fn quit(&self, mode: QuitMode) -> EngineResult<()> {
        (**self).quit(mode).await
    }
}
