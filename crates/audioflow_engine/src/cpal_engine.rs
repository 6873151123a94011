//! cpal-backed Audio Engine
//!
//! Native streams live on a dedicated engine thread (cpal streams are not
//! `Send` on every platform). The thread only builds, plays and drops them;
//! audio moves through lock-free byte rings that the async `read`/`write`
//! side drains and fills.
//!
//! ```text
//!  device ──callback──▶ rtrb ring ──read(size)──▶ capture pump
//!  device ◀─callback─── rtrb ring ◀─write(chunk)── playback drain
//!                ▲
//!   engine thread: build / play / stop   (crossbeam commands)
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use rtrb::{Consumer, Producer, RingBuffer};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use audioflow_core::{
    AudioBuffer, AudioEngine, AudioOptions, Direction, EngineError, EngineResult, QuitMode,
    ReadResult, SampleFormat, StreamConfig, WriteOutcome,
};

use crate::device::find_device;
use crate::ring::{pull_into, push_frames, put_bytes, take_frames, RingSignal};

/// Frames per hardware buffer assumed when the host picks the size
const DEFAULT_FRAMES_PER_BUFFER: usize = 1024;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

enum Command {
    Start { reply: Sender<EngineResult<()>> },
    Stop { reply: oneshot::Sender<()> },
    Shutdown,
}

/// Resolved native parameters for one direction
#[derive(Debug, Clone)]
struct DirectionPlan {
    device_id: i32,
    stream_config: cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    bytes_per_frame: usize,
    ring_capacity: usize,
}

impl DirectionPlan {
    fn new(config: &StreamConfig) -> EngineResult<Self> {
        let sample_format = cpal_format(config.sample_format)?;
        let (buffer_size, frames) = match config.frames_per_buffer {
            0 => (cpal::BufferSize::Default, DEFAULT_FRAMES_PER_BUFFER),
            frames => (cpal::BufferSize::Fixed(frames), frames as usize),
        };
        let bytes_per_frame = config.bytes_per_frame();

        Ok(Self {
            device_id: config.device_id,
            stream_config: cpal::StreamConfig {
                channels: config.channel_count,
                sample_rate: cpal::SampleRate(config.sample_rate),
                buffer_size,
            },
            sample_format,
            bytes_per_frame,
            ring_capacity: config.max_queue * frames * bytes_per_frame,
        })
    }
}

fn cpal_format(format: SampleFormat) -> EngineResult<cpal::SampleFormat> {
    match format {
        SampleFormat::Float32 => Ok(cpal::SampleFormat::F32),
        SampleFormat::Int8 => Ok(cpal::SampleFormat::I8),
        SampleFormat::Int16 => Ok(cpal::SampleFormat::I16),
        SampleFormat::Int32 => Ok(cpal::SampleFormat::I32),
        SampleFormat::Int24 => Err(EngineError::UnsupportedFormat(
            "packed 24-bit samples".to_string(),
        )),
    }
}

struct CaptureSide {
    consumer: Mutex<Consumer<u8>>,
    signal: Arc<RingSignal>,
    bytes_per_frame: usize,
    sample_rate: u32,
    frames_read: AtomicU64,
}

impl CaptureSide {
    async fn read(&self, size: usize) -> ReadResult {
        let overruns = self.signal.take_xruns();
        if overruns > 0 {
            warn!(overruns, "Capture ring overrun, frames dropped");
        }

        self.signal
            .wait_until(|| {
                if let Some(err) = self.signal.take_fault() {
                    return Some(ReadResult::Error(err));
                }
                let taken = take_frames(&mut self.consumer.lock(), size, self.bytes_per_frame);
                if let Some(bytes) = taken {
                    let frames = (bytes.len() / self.bytes_per_frame) as u64;
                    let first = self.frames_read.fetch_add(frames, Ordering::Relaxed);
                    let timestamp = first as f64 / f64::from(self.sample_rate);
                    return Some(ReadResult::Buffer(AudioBuffer::with_timestamp(bytes, timestamp)));
                }
                self.signal.is_closed().then_some(ReadResult::Finished)
            })
            .await
    }
}

struct PlaybackSide {
    producer: Mutex<Producer<u8>>,
    signal: Arc<RingSignal>,
    capacity: usize,
    /// Writes still copying their chunk into the ring
    writing: AtomicUsize,
}

/// Counts one outstanding write, also when its future is dropped
struct WriteInFlight<'a>(&'a PlaybackSide);

impl<'a> WriteInFlight<'a> {
    fn enter(side: &'a PlaybackSide) -> Self {
        side.writing.fetch_add(1, Ordering::SeqCst);
        Self(side)
    }
}

impl Drop for WriteInFlight<'_> {
    fn drop(&mut self) {
        self.0.writing.fetch_sub(1, Ordering::SeqCst);
        self.0.signal.wake();
    }
}

impl PlaybackSide {
    fn new(producer: Producer<u8>, signal: Arc<RingSignal>, capacity: usize) -> Self {
        Self {
            producer: Mutex::new(producer),
            signal,
            capacity,
            writing: AtomicUsize::new(0),
        }
    }

    async fn write(&self, buffer: Bytes) -> WriteOutcome {
        if self.signal.is_closed() {
            return Err(EngineError::NotRunning);
        }
        let _in_flight = WriteInFlight::enter(self);
        let underruns = self.signal.take_xruns();
        if underruns > 0 {
            debug!(underruns, "Playback ring underrun, silence inserted");
        }

        let mut offset = 0;
        self.signal
            .wait_until(|| {
                if let Some(err) = self.signal.take_fault() {
                    return Some(Err(err));
                }
                if self.signal.is_closed() {
                    return Some(Err(EngineError::NotRunning));
                }
                offset += put_bytes(&mut self.producer.lock(), &buffer[offset..]);
                (offset == buffer.len()).then_some(Ok(()))
            })
            .await
    }

    /// Resolve once every outstanding write is in the ring and the device
    /// consumed all of it
    async fn drained(&self) {
        self.signal
            .wait_until(|| {
                if self.signal.is_closed() {
                    return Some(());
                }
                let writing = self.writing.load(Ordering::SeqCst) > 0;
                let empty = self.producer.lock().slots() == self.capacity;
                (!writing && empty).then_some(())
            })
            .await
    }
}

/// What the engine thread needs to build the native streams
struct ThreadSetup {
    capture: Option<(DirectionPlan, Producer<u8>, Arc<RingSignal>)>,
    playback: Option<(DirectionPlan, Consumer<u8>, Arc<RingSignal>)>,
}

/// Audio engine over the host's native devices
pub struct CpalEngine {
    capture: Option<CaptureSide>,
    playback: Option<PlaybackSide>,
    command_sender: Sender<Command>,
    engine_thread: Option<JoinHandle<()>>,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl CpalEngine {
    /// Open the configured devices; streams stay paused until `start()`
    pub fn new(options: &AudioOptions) -> EngineResult<Self> {
        let input = options.input.as_ref().map(DirectionPlan::new).transpose()?;
        let output = options.output.as_ref().map(DirectionPlan::new).transpose()?;

        let mut setup = ThreadSetup {
            capture: None,
            playback: None,
        };

        let capture = input.map(|plan| {
            let (producer, consumer) = RingBuffer::<u8>::new(plan.ring_capacity);
            let signal = RingSignal::new();
            let side = CaptureSide {
                consumer: Mutex::new(consumer),
                signal: Arc::clone(&signal),
                bytes_per_frame: plan.bytes_per_frame,
                sample_rate: plan.stream_config.sample_rate.0,
                frames_read: AtomicU64::new(0),
            };
            setup.capture = Some((plan, producer, signal));
            side
        });

        let playback = output.map(|plan| {
            let (producer, consumer) = RingBuffer::<u8>::new(plan.ring_capacity);
            let signal = RingSignal::new();
            let side = PlaybackSide::new(producer, Arc::clone(&signal), plan.ring_capacity);
            setup.playback = Some((plan, consumer, signal));
            side
        });

        let (command_sender, command_receiver) = bounded::<Command>(8);
        let (ready_sender, ready_receiver) = bounded::<EngineResult<()>>(1);

        let engine_thread = thread::Builder::new()
            .name("audioflow-engine".into())
            .spawn(move || Self::engine_thread_main(setup, command_receiver, ready_sender))
            .map_err(|e| EngineError::StreamBuildError(e.to_string()))?;

        let ready = ready_receiver
            .recv()
            .map_err(|_| EngineError::ChannelRecvError)
            .and_then(|built| built);
        if let Err(err) = ready {
            let _ = engine_thread.join();
            return Err(err);
        }

        info!(
            input = capture.is_some(),
            output = playback.is_some(),
            "Audio engine ready"
        );

        Ok(Self {
            capture,
            playback,
            command_sender,
            engine_thread: Some(engine_thread),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        })
    }

    fn send_command(&self, command: Command) -> EngineResult<()> {
        self.command_sender
            .send(command)
            .map_err(|_| EngineError::ChannelSendError)
    }

    fn close_signals(&self) {
        if let Some(capture) = &self.capture {
            capture.signal.close();
        }
        if let Some(playback) = &self.playback {
            playback.signal.close();
        }
    }

    /// Engine thread main loop
    fn engine_thread_main(
        setup: ThreadSetup,
        commands: Receiver<Command>,
        ready: Sender<EngineResult<()>>,
    ) {
        let mut streams = match Self::build_streams(setup) {
            Ok(streams) => {
                let _ = ready.send(Ok(()));
                Some(streams)
            }
            Err(err) => {
                warn!("Failed to build audio streams: {}", err);
                let _ = ready.send(Err(err));
                return;
            }
        };
        debug!("Engine thread started");

        while let Ok(command) = commands.recv() {
            match command {
                Command::Start { reply } => {
                    let result = match &streams {
                        Some(streams) => streams.iter().try_for_each(|stream| {
                            stream
                                .play()
                                .map_err(|e| EngineError::StreamPlayError(e.to_string()))
                        }),
                        None => Err(EngineError::NotRunning),
                    };
                    let _ = reply.send(result);
                }
                Command::Stop { reply } => {
                    if let Some(active) = streams.take() {
                        for stream in &active {
                            if let Err(e) = stream.pause() {
                                debug!("Pause before drop failed: {}", e);
                            }
                        }
                        drop(active);
                        debug!("Native streams released");
                    }
                    let _ = reply.send(());
                }
                Command::Shutdown => break,
            }
        }

        debug!("Engine thread exiting");
    }

    fn build_streams(setup: ThreadSetup) -> EngineResult<Vec<cpal::Stream>> {
        let mut streams = Vec::new();

        if let Some((plan, mut producer, signal)) = setup.capture {
            let device = find_device(plan.device_id, Direction::Input)?;
            let bytes_per_frame = plan.bytes_per_frame;
            let err_signal = Arc::clone(&signal);

            let stream = device
                .build_input_stream_raw(
                    &plan.stream_config,
                    plan.sample_format,
                    move |data: &cpal::Data, _: &cpal::InputCallbackInfo| {
                        // Real-time audio callback - no allocations; the wakeup
                        // only takes tokio's short waiter-list lock
                        let bytes = data.bytes();
                        if push_frames(&mut producer, bytes, bytes_per_frame) < bytes.len() {
                            signal.count_xrun();
                        }
                        signal.wake();
                    },
                    move |err| err_signal.report_fault(err.to_string()),
                    None,
                )
                .map_err(|e| EngineError::StreamBuildError(e.to_string()))?;
            streams.push(stream);
        }

        if let Some((plan, mut consumer, signal)) = setup.playback {
            let device = find_device(plan.device_id, Direction::Output)?;
            let err_signal = Arc::clone(&signal);

            let stream = device
                .build_output_stream_raw(
                    &plan.stream_config,
                    plan.sample_format,
                    move |data: &mut cpal::Data, _: &cpal::OutputCallbackInfo| {
                        let out = data.bytes_mut();
                        let played = pull_into(&mut consumer, out);
                        if played > 0 && played < out.len() {
                            signal.count_xrun();
                        }
                        signal.wake();
                    },
                    move |err| err_signal.report_fault(err.to_string()),
                    None,
                )
                .map_err(|e| EngineError::StreamBuildError(e.to_string()))?;
            streams.push(stream);
        }

        Ok(streams)
    }
}

#[async_trait]
impl AudioEngine for CpalEngine {
    async fn read(&self, size: usize) -> ReadResult {
        match &self.capture {
            Some(capture) => capture.read(size).await,
            None => ReadResult::Error(EngineError::NotRunning),
        }
    }

    async fn write(&self, buffer: Bytes) -> WriteOutcome {
        match &self.playback {
            Some(playback) => playback.write(buffer).await,
            None => Err(EngineError::NotRunning),
        }
    }

    /// Plays the native streams on the engine thread
    ///
    /// Blocks the caller until the thread confirms, for at most
    /// `COMMAND_TIMEOUT`. When called from a tokio worker that worker is
    /// held for that long; hosts usually confirm within milliseconds.
    fn start(&self) -> EngineResult<()> {
        let (reply, response) = bounded(1);
        self.send_command(Command::Start { reply })?;
        let result = response
            .recv_timeout(COMMAND_TIMEOUT)
            .map_err(|_| EngineError::ChannelRecvError)?;
        if result.is_ok() {
            self.started.store(true, Ordering::SeqCst);
            info!("Audio engine started");
        }
        result
    }

    async fn quit(&self, mode: QuitMode) -> EngineResult<()> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if mode == QuitMode::Wait && self.started.load(Ordering::SeqCst) {
            if let Some(playback) = &self.playback {
                playback.drained().await;
            }
        }

        let (reply, stopped) = oneshot::channel();
        let result = match self.send_command(Command::Stop { reply }) {
            Ok(()) => stopped.await.map_err(|_| EngineError::ChannelRecvError),
            Err(err) => Err(err),
        };
        // Pending reads still see what the ring holds, then Finished
        self.close_signals();
        info!(?mode, "Audio engine stopped");
        result
    }
}

impl Drop for CpalEngine {
    fn drop(&mut self) {
        self.close_signals();
        let _ = self.command_sender.send(Command::Shutdown);

        if let Some(handle) = self.engine_thread.take() {
            let _ = handle.join();
        }
    }
}
