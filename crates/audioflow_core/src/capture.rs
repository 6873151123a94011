//! Capture Direction Adapter
//!
//! Turns engine reads into a pull-based byte stream. One pump task per
//! stream issues `engine.read(high_water_mark)` whenever the read queue has
//! demand, so at most one read is ever outstanding and a slow consumer
//! defers the next read instead of losing data.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::bridge::Bridge;
use crate::buffer::AudioBuffer;
use crate::channel::FlowControlledChannel;
use crate::config::StreamConfig;
use crate::engine::{AudioEngine, ReadResult};
use crate::error::{StreamError, StreamResult};
use crate::message::{EventSink, StreamEvent};
use crate::state::{Direction, DirectionState};

pub(crate) struct CaptureHalf {
    config: StreamConfig,
    state: Arc<DirectionState>,
    channel: Arc<FlowControlledChannel<AudioBuffer>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl CaptureHalf {
    pub(crate) fn new(config: StreamConfig) -> Self {
        let channel = Arc::new(FlowControlledChannel::new(config.high_water_mark));
        Self {
            config,
            state: Arc::new(DirectionState::new(Direction::Input)),
            channel,
            pump: Mutex::new(None),
        }
    }

    pub(crate) fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub(crate) fn state(&self) -> &DirectionState {
        &self.state
    }

    pub(crate) fn channel(&self) -> &FlowControlledChannel<AudioBuffer> {
        &self.channel
    }

    pub(crate) async fn read(&self) -> Option<StreamResult<AudioBuffer>> {
        self.channel.pull().await
    }

    pub(crate) fn spawn<E: AudioEngine>(
        &self,
        engine: Arc<E>,
        events: EventSink,
        bridge: Weak<Bridge<E>>,
    ) {
        let pump = CapturePump {
            engine,
            state: Arc::clone(&self.state),
            channel: Arc::clone(&self.channel),
            events,
            bridge,
            read_size: self.config.high_water_mark,
        };
        *self.pump.lock() = Some(tokio::spawn(pump.run()));
    }

    pub(crate) fn take_task(&self) -> Option<JoinHandle<()>> {
        self.pump.lock().take()
    }

    /// Cancel the pump; an outstanding read is dropped with it
    pub(crate) fn cancel(&self) {
        if let Some(task) = self.take_task() {
            task.abort();
        }
    }

    /// Immediate stop: cancel the outstanding read and drop unread buffers
    pub(crate) fn abort(&self) {
        self.cancel();
        let discarded = self.channel.clear();
        if !discarded.is_empty() {
            debug!(count = discarded.len(), "Discarded unread capture buffers");
        }
        self.channel.end();
    }
}

struct CapturePump<E: AudioEngine> {
    engine: Arc<E>,
    state: Arc<DirectionState>,
    channel: Arc<FlowControlledChannel<AudioBuffer>>,
    events: EventSink,
    bridge: Weak<Bridge<E>>,
    read_size: usize,
}

impl<E: AudioEngine> CapturePump<E> {
    async fn run(self) {
        while self.channel.ready().await {
            if !self.state.is_running() {
                break;
            }

            match self.engine.read(self.read_size).await {
                ReadResult::Buffer(buffer) => {
                    if self.state.discards_results() {
                        trace!(bytes = buffer.len(), "Dropping capture buffer after abort");
                        break;
                    }
                    let len = buffer.len();
                    self.events.emit(StreamEvent::DataAvailable {
                        bytes: len,
                        timestamp: buffer.timestamp(),
                    });
                    self.channel.push(buffer, len);
                }
                ReadResult::Finished => {
                    debug!("Capture reached end of input");
                    self.channel.end();
                    if self.state.close_if_running() {
                        if let Some(bridge) = self.bridge.upgrade() {
                            bridge.emit_closed_once();
                        }
                    }
                    break;
                }
                ReadResult::Error(err) => {
                    warn!("Capture read failed: {}", err);
                    let err = StreamError::from(err);
                    self.channel.fail(err.clone());
                    self.events.emit(StreamEvent::Error(err));
                    if let Some(bridge) = self.bridge.upgrade() {
                        tokio::spawn(bridge.destroy(Direction::Input));
                    }
                    break;
                }
            }
        }
        trace!("Capture pump stopped");
    }
}
