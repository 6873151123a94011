//! Stream and Options Configuration

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{StreamError, StreamResult};

/// Device id selecting the host's default device
pub const DEFAULT_DEVICE: i32 = -1;

/// Sample encoding moved through the stream (never converted)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleFormat {
    Float32,
    Int8,
    Int16,
    Int24,
    Int32,
}

impl SampleFormat {
    /// Size of a single sample in bytes (Int24 is packed)
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::Int8 => 1,
            SampleFormat::Int16 => 2,
            SampleFormat::Int24 => 3,
            SampleFormat::Float32 | SampleFormat::Int32 => 4,
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SampleFormat::Float32 => "float32",
            SampleFormat::Int8 => "int8",
            SampleFormat::Int16 => "int16",
            SampleFormat::Int24 => "int24",
            SampleFormat::Int32 => "int32",
        };
        f.write_str(name)
    }
}

impl FromStr for SampleFormat {
    type Err = StreamError;

    /// Accepts names (`float32`, `int16`), short forms (`f32`, `i16`) and
    /// the numeric codes `1` (float) and `8`, `16`, `24`, `32` (integer).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "float32" | "f32" | "float" | "1" => Ok(SampleFormat::Float32),
            "int8" | "i8" | "8" => Ok(SampleFormat::Int8),
            "int16" | "i16" | "16" => Ok(SampleFormat::Int16),
            "int24" | "i24" | "24" => Ok(SampleFormat::Int24),
            "int32" | "i32" | "32" => Ok(SampleFormat::Int32),
            other => Err(StreamError::config(format!("Unknown sample format: {other}"))),
        }
    }
}

/// Per-direction stream configuration
///
/// Immutable once a stream has been built from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StreamConfig {
    /// Hardware device index from `get_devices`, or -1 for the default device
    pub device_id: i32,

    /// Sample rate in Hz (e.g., 44100, 48000, 96000)
    pub sample_rate: u32,

    /// Number of interleaved channels
    pub channel_count: u16,

    pub sample_format: SampleFormat,

    /// Bound on native buffers queued inside the engine
    pub max_queue: usize,

    /// Fixed hardware buffer size in frames, 0 lets the engine choose
    pub frames_per_buffer: u32,

    /// Bytes buffered by the stream before backpressure engages
    #[serde(alias = "highwaterMark")]
    pub high_water_mark: usize,

    /// Whether a hardware error on a write closes the stream
    pub close_on_error: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            device_id: DEFAULT_DEVICE,
            sample_rate: 48000,
            channel_count: 2,
            sample_format: SampleFormat::Float32,
            max_queue: 2,
            frames_per_buffer: 0,
            high_water_mark: 16384,
            close_on_error: true,
        }
    }
}

impl StreamConfig {
    /// Bytes per interleaved frame
    pub fn bytes_per_frame(&self) -> usize {
        self.sample_format.bytes_per_sample() * self.channel_count as usize
    }

    /// Latency of one hardware buffer in milliseconds, if the size is fixed
    pub fn buffer_latency_ms(&self) -> Option<f32> {
        if self.frames_per_buffer == 0 || self.sample_rate == 0 {
            return None;
        }
        Some((self.frames_per_buffer as f32 / self.sample_rate as f32) * 1000.0)
    }

    /// Validate configuration
    pub fn validate(&self) -> StreamResult<()> {
        if self.device_id < DEFAULT_DEVICE {
            return Err(StreamError::config(format!(
                "Invalid device id: {}",
                self.device_id
            )));
        }
        if self.sample_rate == 0 {
            return Err(StreamError::config("Sample rate must be positive"));
        }
        if self.channel_count == 0 {
            return Err(StreamError::config("Channel count must be positive"));
        }
        if self.max_queue == 0 {
            return Err(StreamError::config("maxQueue must be positive"));
        }
        if self.high_water_mark == 0 {
            return Err(StreamError::config("highWaterMark must be positive"));
        }
        Ok(())
    }
}

/// Combined options for one stream: input, output or both
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AudioOptions {
    #[serde(rename = "inOptions")]
    pub input: Option<StreamConfig>,

    #[serde(rename = "outOptions")]
    pub output: Option<StreamConfig>,

    /// Upper bound on a graceful quit before it is reported as timed out
    pub quit_timeout_ms: u64,
}

impl Default for AudioOptions {
    fn default() -> Self {
        Self {
            input: None,
            output: None,
            quit_timeout_ms: 5000,
        }
    }
}

impl AudioOptions {
    /// Capture-only options
    pub fn input(config: StreamConfig) -> Self {
        Self {
            input: Some(config),
            ..Default::default()
        }
    }

    /// Playback-only options
    pub fn output(config: StreamConfig) -> Self {
        Self {
            output: Some(config),
            ..Default::default()
        }
    }

    /// Simultaneous capture and playback over one engine
    pub fn duplex(input: StreamConfig, output: StreamConfig) -> Self {
        Self {
            input: Some(input),
            output: Some(output),
            ..Default::default()
        }
    }

    pub fn with_quit_timeout(mut self, timeout: Duration) -> Self {
        self.quit_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn quit_timeout(&self) -> Duration {
        Duration::from_millis(self.quit_timeout_ms)
    }

    /// Parse options from their JSON form
    pub fn from_json(json: &str) -> StreamResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| StreamError::config(format!("Invalid options JSON: {e}")))
    }

    /// Validate configuration
    pub fn validate(&self) -> StreamResult<()> {
        if self.input.is_none() && self.output.is_none() {
            return Err(StreamError::config(
                "Neither input nor output options were provided",
            ));
        }
        if let Some(input) = &self.input {
            input.validate()?;
        }
        if let Some(output) = &self.output {
            output.validate()?;
        }
        Ok(())
    }
}
