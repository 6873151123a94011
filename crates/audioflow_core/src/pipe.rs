//! Piping between streams
//!
//! [`AudioReader`] and [`AudioWriter`] are the pull and push halves the
//! streams share, so any capture source can feed any playback sink.

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::buffer::AudioBuffer;
use crate::error::StreamResult;
use crate::playback::WriteAck;

/// Source of captured audio buffers
#[async_trait]
pub trait AudioReader: Send + Sync {
    /// Next buffer, an error, or `None` at end of stream
    async fn read(&self) -> Option<StreamResult<AudioBuffer>>;
}

/// Sink for audio to play
#[async_trait]
pub trait AudioWriter: Send + Sync {
    async fn write(&self, chunk: Bytes) -> StreamResult<WriteAck>;

    /// Signal that no more chunks will follow
    async fn end(&self) -> StreamResult<()>;
}

/// Copy every buffer from `reader` into `writer`, then end the writer
///
/// Backpressure flows through `writer.write()`, so a slow sink slows the
/// reader down. Returns the number of bytes copied.
pub async fn pipe<R, W>(reader: &R, writer: &W) -> StreamResult<u64>
where
    R: AudioReader + ?Sized,
    W: AudioWriter + ?Sized,
{
    let mut copied = 0u64;
    while let Some(next) = reader.read().await {
        let buffer = next?;
        copied += buffer.len() as u64;
        // Per-chunk failures surface as Error events on the writer
        drop(writer.write(buffer.into_bytes()).await?);
    }
    writer.end().await?;
    debug!(bytes = copied, "Pipe reached end of input");
    Ok(copied)
}
