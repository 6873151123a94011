//! Playback Direction Adapter
//!
//! Chunks accepted by `write()` wait in a byte-counted queue; a drain task
//! submits them to the engine one at a time and pulls the next chunk only
//! after the engine acknowledged the previous one. Each chunk's outcome is
//! reported through its [`WriteAck`].

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::bridge::Bridge;
use crate::channel::FlowControlledChannel;
use crate::config::StreamConfig;
use crate::engine::AudioEngine;
use crate::error::{StreamError, StreamResult};
use crate::message::{EventSink, StreamEvent};
use crate::state::{Direction, DirectionState};

/// Acknowledgment of one written chunk
///
/// Resolves to the engine's outcome for that chunk, or `StreamError::Closed`
/// if the stream shut down before the chunk was played.
#[must_use = "dropping a WriteAck ignores the engine's outcome for that chunk"]
#[derive(Debug)]
pub struct WriteAck {
    rx: oneshot::Receiver<StreamResult<()>>,
}

impl WriteAck {
    fn resolved(outcome: StreamResult<()>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(outcome);
        Self { rx }
    }
}

impl Future for WriteAck {
    type Output = StreamResult<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(StreamError::Closed)))
    }
}

pub(crate) struct PendingWrite {
    chunk: Bytes,
    ack: oneshot::Sender<StreamResult<()>>,
}

impl PendingWrite {
    fn resolve(self, outcome: StreamResult<()>) {
        // The writer may have dropped its WriteAck
        let _ = self.ack.send(outcome);
    }
}

pub(crate) struct PlaybackHalf {
    config: StreamConfig,
    state: Arc<DirectionState>,
    channel: Arc<FlowControlledChannel<PendingWrite>>,
    drain: Mutex<Option<JoinHandle<()>>>,
}

impl PlaybackHalf {
    pub(crate) fn new(config: StreamConfig) -> Self {
        let channel = Arc::new(FlowControlledChannel::new(config.high_water_mark));
        Self {
            config,
            state: Arc::new(DirectionState::new(Direction::Output)),
            channel,
            drain: Mutex::new(None),
        }
    }

    pub(crate) fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub(crate) fn state(&self) -> &DirectionState {
        &self.state
    }

    /// Bytes accepted but not yet handed to the engine
    pub(crate) fn buffered(&self) -> usize {
        self.channel.buffered()
    }

    /// Queue a chunk, waiting while `high_water_mark` bytes are pending
    pub(crate) async fn write(&self, chunk: Bytes) -> StreamResult<WriteAck> {
        let state = self.state.current();
        if state.is_shutting_down() || state.is_closed() {
            return Err(StreamError::protocol("write() after quit/abort"));
        }
        if self.channel.is_ended() {
            return Err(StreamError::protocol("write() after end()"));
        }
        if chunk.is_empty() {
            return Ok(WriteAck::resolved(Ok(())));
        }

        if !self.channel.ready().await {
            return Err(StreamError::protocol("stream stopped accepting writes"));
        }
        let (ack, rx) = oneshot::channel();
        let len = chunk.len();
        if !self.channel.push(PendingWrite { chunk, ack }, len) {
            return Err(StreamError::protocol("stream stopped accepting writes"));
        }
        Ok(WriteAck { rx })
    }

    pub(crate) fn spawn<E: AudioEngine>(
        &self,
        engine: Arc<E>,
        events: EventSink,
        bridge: Weak<Bridge<E>>,
    ) {
        let drain = PlaybackDrain {
            engine,
            state: Arc::clone(&self.state),
            channel: Arc::clone(&self.channel),
            events,
            bridge,
            close_on_error: self.config.close_on_error,
        };
        *self.drain.lock() = Some(tokio::spawn(drain.run()));
    }

    pub(crate) fn take_task(&self) -> Option<JoinHandle<()>> {
        self.drain.lock().take()
    }

    /// No more chunks will be accepted; queued ones are still written
    pub(crate) fn end(&self) {
        self.channel.end();
    }

    /// Stop accepting chunks and reject those not yet submitted
    pub(crate) fn reject_pending(&self) {
        self.channel.end();
        let rejected = self.channel.clear();
        if !rejected.is_empty() {
            debug!(count = rejected.len(), "Rejected unsubmitted playback chunks");
        }
        for pending in rejected {
            pending.resolve(Err(StreamError::Closed));
        }
    }

    /// Cancel the drain task; an outstanding write is dropped with it
    pub(crate) fn cancel(&self) {
        if let Some(task) = self.take_task() {
            task.abort();
        }
    }

    /// Immediate stop: drop the in-flight write and every queued chunk
    pub(crate) fn abort(&self) {
        self.cancel();
        self.reject_pending();
    }
}

struct PlaybackDrain<E: AudioEngine> {
    engine: Arc<E>,
    state: Arc<DirectionState>,
    channel: Arc<FlowControlledChannel<PendingWrite>>,
    events: EventSink,
    bridge: Weak<Bridge<E>>,
    close_on_error: bool,
}

impl<E: AudioEngine> PlaybackDrain<E> {
    async fn run(self) {
        while let Some(Ok(pending)) = self.channel.pull().await {
            if !self.state.is_running() {
                pending.resolve(Err(StreamError::Closed));
                continue;
            }

            let PendingWrite { chunk, ack } = pending;
            let outcome = self.engine.write(chunk).await;
            if self.state.discards_results() {
                let _ = ack.send(Err(StreamError::Closed));
                break;
            }

            match outcome {
                Ok(()) => {
                    let _ = ack.send(Ok(()));
                }
                Err(err) => {
                    warn!("Playback write failed: {}", err);
                    let err = StreamError::from(err);
                    let _ = ack.send(Err(err.clone()));
                    self.events.emit(StreamEvent::Error(err));
                    if self.close_on_error {
                        if let Some(bridge) = self.bridge.upgrade() {
                            tokio::spawn(bridge.destroy(Direction::Output));
                        }
                        break;
                    }
                }
            }
        }
        trace!("Playback drain stopped");
    }
}
