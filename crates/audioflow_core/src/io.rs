//! Stream Factory
//!
//! [`open_with`] validates the options, builds the engine and returns the
//! stream kind the options call for: input only, output only, or both.

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::bridge::Bridge;
use crate::buffer::AudioBuffer;
use crate::config::AudioOptions;
use crate::duplex::DuplexAudioStream;
use crate::engine::AudioEngine;
use crate::error::{EngineResult, StreamError, StreamResult};
use crate::message::{event_channel, StreamEvents};
use crate::pipe::{AudioReader, AudioWriter};
use crate::playback::WriteAck;
use crate::readable::ReadableAudioStream;
use crate::state::StreamState;
use crate::writable::WritableAudioStream;

/// A stream opened by [`open_with`]
pub enum AudioIo<E: AudioEngine> {
    Readable(ReadableAudioStream<E>),
    Writable(WritableAudioStream<E>),
    Duplex(DuplexAudioStream<E>),
}

impl<E: AudioEngine> AudioIo<E> {
    pub fn kind(&self) -> &'static str {
        match self {
            AudioIo::Readable(_) => "readable",
            AudioIo::Writable(_) => "writable",
            AudioIo::Duplex(_) => "duplex",
        }
    }

    pub fn start(&self) -> StreamResult<()> {
        match self {
            AudioIo::Readable(stream) => stream.start(),
            AudioIo::Writable(stream) => stream.start(),
            AudioIo::Duplex(stream) => stream.start(),
        }
    }

    pub async fn quit(&self) -> StreamResult<()> {
        match self {
            AudioIo::Readable(stream) => stream.quit().await,
            AudioIo::Writable(stream) => stream.quit().await,
            AudioIo::Duplex(stream) => stream.quit().await,
        }
    }

    pub async fn abort(&self) -> StreamResult<()> {
        match self {
            AudioIo::Readable(stream) => stream.abort().await,
            AudioIo::Writable(stream) => stream.abort().await,
            AudioIo::Duplex(stream) => stream.abort().await,
        }
    }

    pub fn state(&self) -> StreamState {
        match self {
            AudioIo::Readable(stream) => stream.state(),
            AudioIo::Writable(stream) => stream.state(),
            AudioIo::Duplex(stream) => stream.state(),
        }
    }

    pub fn events(&self) -> &StreamEvents {
        match self {
            AudioIo::Readable(stream) => stream.events(),
            AudioIo::Writable(stream) => stream.events(),
            AudioIo::Duplex(stream) => stream.events(),
        }
    }

    pub fn into_readable(self) -> Option<ReadableAudioStream<E>> {
        match self {
            AudioIo::Readable(stream) => Some(stream),
            _ => None,
        }
    }

    pub fn into_writable(self) -> Option<WritableAudioStream<E>> {
        match self {
            AudioIo::Writable(stream) => Some(stream),
            _ => None,
        }
    }

    pub fn into_duplex(self) -> Option<DuplexAudioStream<E>> {
        match self {
            AudioIo::Duplex(stream) => Some(stream),
            _ => None,
        }
    }
}

/// Open a stream on an engine produced by `build_engine`
///
/// Options are validated first; an invalid configuration fails with
/// `StreamError::Configuration` before the engine is built.
pub fn open_with<E, F>(options: AudioOptions, build_engine: F) -> StreamResult<AudioIo<E>>
where
    E: AudioEngine,
    F: FnOnce(&AudioOptions) -> EngineResult<E>,
{
    options.validate()?;
    let engine = build_engine(&options)?;

    let (sink, events) = event_channel();
    let bridge = Bridge::new(engine, &options, sink);
    let io = match (bridge.capture().cloned(), bridge.playback().cloned()) {
        (Some(capture), Some(playback)) => {
            AudioIo::Duplex(DuplexAudioStream::new(bridge, capture, playback, events))
        }
        (Some(capture), None) => {
            AudioIo::Readable(ReadableAudioStream::new(bridge, capture, events))
        }
        (None, Some(playback)) => {
            AudioIo::Writable(WritableAudioStream::new(bridge, playback, events))
        }
        (None, None) => {
            return Err(StreamError::config("no input or output options given"));
        }
    };

    debug!(kind = io.kind(), "Opened audio stream");
    Ok(io)
}

#[async_trait]
impl<E: AudioEngine> AudioReader for ReadableAudioStream<E> {
    async fn read(&self) -> Option<StreamResult<AudioBuffer>> {
        ReadableAudioStream::read(self).await
    }
}

#[async_trait]
impl<E: AudioEngine> AudioWriter for WritableAudioStream<E> {
    async fn write(&self, chunk: Bytes) -> StreamResult<WriteAck> {
        WritableAudioStream::write(self, chunk).await
    }

    async fn end(&self) -> StreamResult<()> {
        WritableAudioStream::end(self).await
    }
}

#[async_trait]
impl<E: AudioEngine> AudioReader for DuplexAudioStream<E> {
    async fn read(&self) -> Option<StreamResult<AudioBuffer>> {
        DuplexAudioStream::read(self).await
    }
}

#[async_trait]
impl<E: AudioEngine> AudioWriter for DuplexAudioStream<E> {
    async fn write(&self, chunk: Bytes) -> StreamResult<WriteAck> {
        DuplexAudioStream::write(self, chunk).await
    }

    async fn end(&self) -> StreamResult<()> {
        DuplexAudioStream::end(self).await
    }
}
