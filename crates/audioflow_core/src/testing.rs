//! Scripted engines for unit tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{watch, Notify};

use crate::buffer::AudioBuffer;
use crate::config::{AudioOptions, StreamConfig};
use crate::engine::{AudioEngine, QuitMode, ReadResult, WriteOutcome};
use crate::error::{EngineError, EngineResult};
use crate::message::{StreamEvent, StreamEvents};

/// Tracks how many calls of one kind overlap
#[derive(Default)]
pub(crate) struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlight {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Engine that replays scripted read results and write outcomes
///
/// Once the read script runs out, reads stay pending until `quit`, then
/// report `Finished`. Writes succeed unless an outcome was scripted.
pub(crate) struct ScriptedEngine {
    reads: Mutex<VecDeque<ReadResult>>,
    write_outcomes: Mutex<VecDeque<WriteOutcome>>,
    written: Mutex<Vec<Bytes>>,
    calls: Mutex<Vec<String>>,
    start_error: Option<EngineError>,
    quit_error: Option<EngineError>,
    hang_on_quit: bool,
    write_delay: Option<Duration>,
    hold_writes: bool,
    quit: watch::Sender<bool>,
    pub(crate) reads_in_flight: InFlight,
    pub(crate) writes_in_flight: InFlight,
}

impl ScriptedEngine {
    pub(crate) fn new() -> Self {
        let (quit, _) = watch::channel(false);
        Self {
            reads: Mutex::new(VecDeque::new()),
            write_outcomes: Mutex::new(VecDeque::new()),
            written: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            start_error: None,
            quit_error: None,
            hang_on_quit: false,
            write_delay: None,
            hold_writes: false,
            quit,
            reads_in_flight: InFlight::default(),
            writes_in_flight: InFlight::default(),
        }
    }

    pub(crate) fn with_reads(self, reads: impl IntoIterator<Item = ReadResult>) -> Self {
        self.reads.lock().extend(reads);
        self
    }

    pub(crate) fn with_write_outcomes(
        self,
        outcomes: impl IntoIterator<Item = WriteOutcome>,
    ) -> Self {
        self.write_outcomes.lock().extend(outcomes);
        self
    }

    pub(crate) fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    /// Writes stay pending until the engine is told to quit
    pub(crate) fn holding_writes(mut self) -> Self {
        self.hold_writes = true;
        self
    }

    pub(crate) fn failing_start(mut self, err: EngineError) -> Self {
        self.start_error = Some(err);
        self
    }

    /// `quit` releases pending calls, then reports `err`
    pub(crate) fn failing_quit(mut self, err: EngineError) -> Self {
        self.quit_error = Some(err);
        self
    }

    /// `quit` never confirms and pending calls are never released
    pub(crate) fn hanging_quit(mut self) -> Self {
        self.hang_on_quit = true;
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub(crate) fn written(&self) -> Vec<Bytes> {
        self.written.lock().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().push(call.into());
    }

    async fn quit_requested(&self) {
        let mut rx = self.quit.subscribe();
        let _ = rx.wait_for(|quit| *quit).await;
    }
}

#[async_trait]
impl AudioEngine for ScriptedEngine {
    async fn read(&self, size: usize) -> ReadResult {
        self.record(format!("read({size})"));
        self.reads_in_flight.enter();
        let next = self.reads.lock().pop_front();
        let result = match next {
            Some(result) => {
                tokio::task::yield_now().await;
                result
            }
            None => {
                self.quit_requested().await;
                ReadResult::Finished
            }
        };
        self.reads_in_flight.exit();
        result
    }

    async fn write(&self, buffer: Bytes) -> WriteOutcome {
        self.record(format!("write({})", buffer.len()));
        self.writes_in_flight.enter();
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
        if self.hold_writes {
            self.quit_requested().await;
        }
        let outcome = self.write_outcomes.lock().pop_front().unwrap_or(Ok(()));
        if outcome.is_ok() {
            self.written.lock().push(buffer);
        }
        self.writes_in_flight.exit();
        outcome
    }

    fn start(&self) -> EngineResult<()> {
        self.record("start");
        match &self.start_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn quit(&self, mode: QuitMode) -> EngineResult<()> {
        self.record(format!("quit({mode:?})"));
        if self.hang_on_quit {
            std::future::pending::<()>().await;
        }
        self.quit.send_replace(true);
        match &self.quit_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// Engine that plays back into its own capture side
///
/// With a queue limit, writes wait for room the way a device ring makes
/// them wait. A graceful quit still admits the write that is waiting.
pub(crate) struct PassthroughEngine {
    queue: Mutex<VecDeque<Bytes>>,
    max_queue: usize,
    changed: Notify,
    quit: watch::Sender<Option<QuitMode>>,
}

impl PassthroughEngine {
    pub(crate) fn new() -> Self {
        let (quit, _) = watch::channel(None);
        Self {
            queue: Mutex::new(VecDeque::new()),
            max_queue: usize::MAX,
            changed: Notify::new(),
            quit,
        }
    }

    pub(crate) fn with_max_queue(mut self, max_queue: usize) -> Self {
        self.max_queue = max_queue;
        self
    }

    pub(crate) fn queued(&self) -> usize {
        self.queue.lock().len()
    }
}

#[async_trait]
impl AudioEngine for PassthroughEngine {
    async fn read(&self, _size: usize) -> ReadResult {
        let mut quit = self.quit.subscribe();
        loop {
            let notified = self.changed.notified();
            let next = self.queue.lock().pop_front();
            if let Some(chunk) = next {
                self.changed.notify_waiters();
                return ReadResult::Buffer(AudioBuffer::new(chunk));
            }
            if quit.borrow_and_update().is_some() {
                return ReadResult::Finished;
            }
            tokio::select! {
                _ = notified => {}
                _ = quit.changed() => {}
            }
        }
    }

    async fn write(&self, buffer: Bytes) -> WriteOutcome {
        let mut quit = self.quit.subscribe();
        if quit.borrow_and_update().is_some() {
            return Err(EngineError::NotRunning);
        }
        loop {
            let notified = self.changed.notified();
            let mode = *quit.borrow_and_update();
            {
                let mut queue = self.queue.lock();
                match mode {
                    Some(QuitMode::Abort) => return Err(EngineError::NotRunning),
                    Some(QuitMode::Wait) => {
                        queue.push_back(buffer);
                        break;
                    }
                    None if queue.len() < self.max_queue => {
                        queue.push_back(buffer);
                        break;
                    }
                    None => {}
                }
            }
            tokio::select! {
                _ = notified => {}
                _ = quit.changed() => {}
            }
        }
        self.changed.notify_waiters();
        Ok(())
    }

    fn start(&self) -> EngineResult<()> {
        Ok(())
    }

    async fn quit(&self, mode: QuitMode) -> EngineResult<()> {
        self.quit.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(mode);
            true
        });
        Ok(())
    }
}

/// Collect events until `wanted` shows up
pub(crate) async fn wait_for_event(events: &StreamEvents, wanted: &StreamEvent) -> Vec<StreamEvent> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    let mut seen = Vec::new();
    loop {
        while let Some(event) = events.poll_event() {
            let done = &event == wanted;
            seen.push(event);
            if done {
                return seen;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {wanted:?}, saw {seen:?}"
        );
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

pub(crate) fn buffer(len: usize, fill: u8) -> ReadResult {
    ReadResult::Buffer(AudioBuffer::new(vec![fill; len]))
}

pub(crate) fn input_options() -> AudioOptions {
    AudioOptions::input(StreamConfig::default()).with_quit_timeout(Duration::from_secs(2))
}

pub(crate) fn output_options(close_on_error: bool) -> AudioOptions {
    let config = StreamConfig {
        close_on_error,
        ..StreamConfig::default()
    };
    AudioOptions::output(config).with_quit_timeout(Duration::from_secs(2))
}

pub(crate) fn duplex_options() -> AudioOptions {
    AudioOptions::duplex(StreamConfig::default(), StreamConfig::default())
        .with_quit_timeout(Duration::from_secs(2))
}
