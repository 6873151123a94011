//! Stream Core
//!
//! Owns the engine and the direction halves of one stream and drives their
//! shared lifecycle: starting the engine once, the single shutdown sequence
//! (`quit` drains, `abort` discards) and the one-time `Closed` notification.
//! The readable, writable and duplex streams are thin handles around it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::capture::CaptureHalf;
use crate::config::AudioOptions;
use crate::engine::{AudioEngine, QuitMode};
use crate::error::{StreamError, StreamResult};
use crate::message::{EventSink, StreamEvent};
use crate::playback::PlaybackHalf;
use crate::state::{Direction, DirectionState, StreamState};

pub(crate) struct Bridge<E: AudioEngine> {
    engine: Arc<E>,
    capture: Option<Arc<CaptureHalf>>,
    playback: Option<Arc<PlaybackHalf>>,
    events: EventSink,
    quit_timeout: Duration,
    started: AtomicBool,
    shutdown_started: AtomicBool,
    finishing: AtomicBool,
    finished_emitted: AtomicBool,
    closed_emitted: AtomicBool,
}

impl<E: AudioEngine> Bridge<E> {
    pub(crate) fn new(engine: E, options: &AudioOptions, events: EventSink) -> Arc<Self> {
        Arc::new(Self {
            engine: Arc::new(engine),
            capture: options.input.clone().map(|config| Arc::new(CaptureHalf::new(config))),
            playback: options
                .output
                .clone()
                .map(|config| Arc::new(PlaybackHalf::new(config))),
            events,
            quit_timeout: options.quit_timeout(),
            started: AtomicBool::new(false),
            shutdown_started: AtomicBool::new(false),
            finishing: AtomicBool::new(false),
            finished_emitted: AtomicBool::new(false),
            closed_emitted: AtomicBool::new(false),
        })
    }

    pub(crate) fn capture(&self) -> Option<&Arc<CaptureHalf>> {
        self.capture.as_ref()
    }

    pub(crate) fn playback(&self) -> Option<&Arc<PlaybackHalf>> {
        self.playback.as_ref()
    }

    fn states(&self) -> impl Iterator<Item = &DirectionState> {
        self.capture
            .iter()
            .map(|half| half.state())
            .chain(self.playback.iter().map(|half| half.state()))
    }

    /// Aggregate state: `Closed` only once every direction is closed
    pub(crate) fn state(&self) -> StreamState {
        let mut aggregate = StreamState::Closed;
        for current in self.states().map(DirectionState::current) {
            if current.is_running() || current.is_shutting_down() {
                return current;
            }
            if current == StreamState::Idle {
                aggregate = current;
            }
        }
        aggregate
    }

    pub(crate) fn is_shutting_down(&self) -> bool {
        self.shutdown_started.load(Ordering::SeqCst)
    }

    /// Begin hardware streaming and spawn the direction tasks
    pub(crate) fn start(self: &Arc<Self>) -> StreamResult<()> {
        if self.is_shutting_down() {
            return Err(StreamError::protocol("start() after quit/abort"));
        }
        if Handle::try_current().is_err() {
            return Err(StreamError::protocol(
                "start() must be called from within a tokio runtime",
            ));
        }
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("Stream already started");
            return Ok(());
        }

        for state in self.states() {
            state.start();
        }

        if let Err(err) = self.engine.start() {
            warn!("Engine failed to start: {}", err);
            self.shutdown_started.store(true, Ordering::SeqCst);
            let err = StreamError::from(err);
            self.events.emit(StreamEvent::Error(err.clone()));
            self.end_channels();
            self.close_all();
            return Err(err);
        }

        info!(
            input = self.capture.is_some(),
            output = self.playback.is_some(),
            "Audio stream started"
        );
        self.events.emit(StreamEvent::Started);

        let bridge = Arc::downgrade(self);
        if let Some(capture) = &self.capture {
            capture.spawn(Arc::clone(&self.engine), self.events.clone(), bridge.clone());
        }
        if let Some(playback) = &self.playback {
            playback.spawn(Arc::clone(&self.engine), self.events.clone(), bridge);
        }
        Ok(())
    }

    /// Run the stream's single shutdown sequence
    ///
    /// A concurrent second call waits for the first to close the stream.
    pub(crate) async fn shutdown(&self, mode: QuitMode) -> StreamResult<()> {
        if self.shutdown_started.swap(true, Ordering::SeqCst) {
            debug!(?mode, "Shutdown already in progress");
            self.closed().await;
            return Ok(());
        }

        let mut live = false;
        for state in self.states() {
            live |= state.begin_shutdown(mode);
        }
        if !live {
            // Every direction already reached end of input on its own
            self.end_channels();
            self.emit_closed_once();
            return Ok(());
        }

        info!(?mode, "Shutting down audio stream");
        let result = match mode {
            QuitMode::Abort => self.abort_sequence().await,
            QuitMode::Wait => self.drain_sequence().await,
        };
        if let Err(err) = &result {
            warn!("Audio stream shutdown failed: {}", err);
            self.events.emit(StreamEvent::Error(err.clone()));
        }

        self.close_all();
        result
    }

    /// Abort after a fatal error in one direction
    pub(crate) async fn destroy(self: Arc<Self>, direction: Direction) {
        debug!(?direction, "Destroying stream after error");
        // A failing engine quit is reported through the event sink
        let _ = self.shutdown(QuitMode::Abort).await;
    }

    async fn abort_sequence(&self) -> StreamResult<()> {
        if let Some(capture) = &self.capture {
            capture.abort();
        }
        if let Some(playback) = &self.playback {
            playback.abort();
        }

        let result = match tokio::time::timeout(
            self.quit_timeout,
            self.engine.quit(QuitMode::Abort),
        )
        .await
        {
            Ok(quit) => quit.map_err(StreamError::from),
            Err(_) => Err(StreamError::ShutdownTimeout(self.quit_timeout)),
        };
        self.end_channels();
        result
    }

    async fn drain_sequence(&self) -> StreamResult<()> {
        let mut tasks = Vec::new();
        if let Some(capture) = &self.capture {
            capture.channel().halt();
            tasks.extend(capture.take_task());
        }
        if let Some(playback) = &self.playback {
            playback.reject_pending();
            tasks.extend(playback.take_task());
        }
        let abort_handles: Vec<_> = tasks.iter().map(|task| task.abort_handle()).collect();

        let drained = async {
            let (quit, _) = tokio::join!(self.engine.quit(QuitMode::Wait), join_all(tasks));
            quit
        };
        let result = match tokio::time::timeout(self.quit_timeout, drained).await {
            Ok(quit) => quit.map_err(StreamError::from),
            Err(_) => {
                warn!(timeout = ?self.quit_timeout, "Engine did not drain in time");
                for handle in abort_handles {
                    handle.abort();
                }
                Err(StreamError::ShutdownTimeout(self.quit_timeout))
            }
        };
        self.end_channels();
        result
    }

    fn end_channels(&self) {
        if let Some(capture) = &self.capture {
            capture.channel().end();
        }
        if let Some(playback) = &self.playback {
            playback.reject_pending();
        }
    }

    fn close_all(&self) {
        for state in self.states() {
            if state.close() {
                debug!(direction = ?state.direction(), "Direction closed");
            }
        }
        self.emit_closed_once();
    }

    /// Emit `Closed` the first time every direction is closed
    pub(crate) fn emit_closed_once(&self) {
        if !self.states().all(|state| state.current().is_closed()) {
            return;
        }
        if !self.closed_emitted.swap(true, Ordering::SeqCst) {
            info!("Audio stream closed");
            self.events.emit(StreamEvent::Closed);
        }
    }

    /// Resolve once every direction is closed
    pub(crate) async fn closed(&self) {
        for state in self.states() {
            state.closed().await;
        }
    }

    /// Upstream ended: write what is queued, quit, then report `Finished`
    pub(crate) async fn finish(&self) -> StreamResult<()> {
        let Some(playback) = self.playback() else {
            return Err(StreamError::protocol("end() on a stream without output"));
        };
        if self.is_shutting_down() || self.finishing.swap(true, Ordering::SeqCst) {
            self.closed().await;
            return Ok(());
        }

        debug!(buffered = playback.buffered(), "Finishing playback");
        playback.end();
        if let Some(drain) = playback.take_task() {
            let _ = drain.await;
        }
        if self.is_shutting_down() {
            // Destroyed while draining; the error was already reported
            self.closed().await;
            return Ok(());
        }

        let result = self.shutdown(QuitMode::Wait).await;
        if !self.finished_emitted.swap(true, Ordering::SeqCst) {
            self.events.emit(StreamEvent::Finished);
        }
        result
    }

    /// Run a shutdown in the background and hand its outcome to `on_complete`
    pub(crate) fn shutdown_then<F>(self: &Arc<Self>, mode: QuitMode, on_complete: F)
    where
        F: FnOnce(StreamResult<()>) + Send + 'static,
    {
        match Handle::try_current() {
            Ok(runtime) => {
                let bridge = Arc::clone(self);
                runtime.spawn(async move {
                    on_complete(bridge.shutdown(mode).await);
                });
            }
            Err(_) => on_complete(Err(StreamError::protocol(
                "shutdown requires a tokio runtime",
            ))),
        }
    }
}

impl<E: AudioEngine> Drop for Bridge<E> {
    fn drop(&mut self) {
        if let Some(capture) = &self.capture {
            capture.cancel();
        }
        if let Some(playback) = &self.playback {
            playback.cancel();
        }
    }
}
